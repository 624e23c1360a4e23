//! Client requests and snapshot replies carried over the WebSocket.
//!
//! Job events travel as serialized [`wmpro_events::JobEvent`]s; this module
//! only covers the request/reply half of the protocol.

use serde::{Deserialize, Serialize};
use wmpro_core::job::{JobRecord, QueueStats};
use wmpro_core::job_events::{
    MSG_TYPE_ACTIVE_JOBS, MSG_TYPE_ERROR, MSG_TYPE_PONG, MSG_TYPE_QUEUE_STATS,
    MSG_TYPE_SUBSCRIBED, MSG_TYPE_UPLOAD_JOBS,
};
use wmpro_core::types::{JobId, UploadGroupId};

/// A message sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Receive job events only for this job (plus any earlier subscriptions).
    #[serde(rename_all = "camelCase")]
    SubscribeJob { job_id: JobId },
    /// Receive every job event again.
    SubscribeAll,
    GetQueueStats,
    GetActiveJobs,
    #[serde(rename_all = "camelCase")]
    GetJobsByUpload { upload_group_id: UploadGroupId },
    Ping,
}

/// A reply addressed to the connection that asked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    QueueStats(QueueStats),
    ActiveJobs {
        jobs: Vec<JobRecord>,
    },
    #[serde(rename_all = "camelCase")]
    UploadJobs {
        upload_group_id: UploadGroupId,
        jobs: Vec<JobRecord>,
    },
    /// `jobId` is absent after `subscribe_all`.
    #[serde(rename_all = "camelCase")]
    Subscribed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<JobId>,
    },
    Pong,
    Error {
        message: String,
    },
}

impl ServerMessage {
    /// The `type` discriminator this message serializes with.
    pub fn message_type(&self) -> &'static str {
        match self {
            ServerMessage::QueueStats(_) => MSG_TYPE_QUEUE_STATS,
            ServerMessage::ActiveJobs { .. } => MSG_TYPE_ACTIVE_JOBS,
            ServerMessage::UploadJobs { .. } => MSG_TYPE_UPLOAD_JOBS,
            ServerMessage::Subscribed { .. } => MSG_TYPE_SUBSCRIBED,
            ServerMessage::Pong => MSG_TYPE_PONG,
            ServerMessage::Error { .. } => MSG_TYPE_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    // -----------------------------------------------------------------------
    // Client messages
    // -----------------------------------------------------------------------

    #[test]
    fn parses_every_client_request() {
        let cases = [
            (
                json!({ "type": "subscribe_job", "jobId": "j1" }),
                ClientMessage::SubscribeJob { job_id: "j1".into() },
            ),
            (json!({ "type": "subscribe_all" }), ClientMessage::SubscribeAll),
            (json!({ "type": "get_queue_stats" }), ClientMessage::GetQueueStats),
            (json!({ "type": "get_active_jobs" }), ClientMessage::GetActiveJobs),
            (
                json!({ "type": "get_jobs_by_upload", "uploadGroupId": "u1" }),
                ClientMessage::GetJobsByUpload {
                    upload_group_id: "u1".into(),
                },
            ),
            (json!({ "type": "ping" }), ClientMessage::Ping),
        ];
        for (raw, expected) in cases {
            let parsed: ClientMessage = serde_json::from_value(raw).unwrap();
            assert_eq!(parsed, expected);
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = serde_json::from_value::<ClientMessage>(json!({ "type": "reboot" }));
        assert!(result.is_err());
    }

    // -----------------------------------------------------------------------
    // Server messages
    // -----------------------------------------------------------------------

    #[test]
    fn queue_stats_fields_sit_beside_the_type() {
        let message = ServerMessage::QueueStats(QueueStats {
            waiting: 3,
            active: 2,
            completed: 0,
            failed: 0,
            total: 5,
        });
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "queue_stats",
                "waiting": 3,
                "active": 2,
                "completed": 0,
                "failed": 0,
                "total": 5,
            })
        );
    }

    #[test]
    fn message_type_matches_serialized_tag() {
        let messages = [
            ServerMessage::QueueStats(QueueStats::default()),
            ServerMessage::ActiveJobs { jobs: vec![] },
            ServerMessage::UploadJobs {
                upload_group_id: "u1".into(),
                jobs: vec![],
            },
            ServerMessage::Subscribed {
                job_id: Some("j1".into()),
            },
            ServerMessage::Pong,
            ServerMessage::Error {
                message: "nope".into(),
            },
        ];
        for message in messages {
            let value = serde_json::to_value(&message).unwrap();
            assert_eq!(value["type"], message.message_type());
        }
    }

    #[test]
    fn subscribe_all_ack_omits_job_id() {
        let value = serde_json::to_value(ServerMessage::Subscribed { job_id: None }).unwrap();
        assert_eq!(value, json!({ "type": "subscribed" }));
    }
}
