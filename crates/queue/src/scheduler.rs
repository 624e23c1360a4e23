//! Per-type worker slots and waiting queues.
//!
//! Each job type has a fixed number of slots. Waiting ids are ordered by
//! priority (higher first), then by push order. The scheduler only tracks
//! ids; record state lives in the job store.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};

use tokio::sync::Mutex;
use wmpro_core::job::JobType;
use wmpro_core::types::JobId;

use crate::config::ConcurrencyLimits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: Reverse<i32>,
    seq: u64,
}

struct ClassState {
    capacity: usize,
    running: HashSet<JobId>,
    waiting: BTreeMap<QueueKey, JobId>,
    keys: HashMap<JobId, QueueKey>,
}

impl ClassState {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            running: HashSet::new(),
            waiting: BTreeMap::new(),
            keys: HashMap::new(),
        }
    }
}

struct SchedulerState {
    classes: HashMap<JobType, ClassState>,
    next_seq: u64,
}

/// Point-in-time view of one job type's slots and queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSnapshot {
    pub capacity: usize,
    pub running: usize,
    /// Waiting ids in dispatch order.
    pub waiting: Vec<JobId>,
}

/// Concurrency gate shared by the submission and completion paths.
pub struct ClassScheduler {
    state: Mutex<SchedulerState>,
}

impl ClassScheduler {
    pub fn new(limits: ConcurrencyLimits) -> Self {
        let classes = JobType::ALL
            .into_iter()
            .map(|job_type| (job_type, ClassState::new(limits.for_type(job_type))))
            .collect();
        Self {
            state: Mutex::new(SchedulerState {
                classes,
                next_seq: 0,
            }),
        }
    }

    /// Queue `id` for a slot. Returns `false` if it is already queued or running.
    pub async fn push(&self, job_type: JobType, id: &str, priority: i32) -> bool {
        let mut state = self.state.lock().await;
        let seq = state.next_seq;
        let Some(class) = state.classes.get_mut(&job_type) else {
            return false;
        };
        if class.keys.contains_key(id) || class.running.contains(id) {
            return false;
        }
        let key = QueueKey {
            priority: Reverse(priority),
            seq,
        };
        class.waiting.insert(key, id.to_string());
        class.keys.insert(id.to_string(), key);
        state.next_seq += 1;
        true
    }

    /// Occupy a free slot with the head of the queue.
    ///
    /// Returns `None` when every slot is taken or nothing is waiting.
    pub async fn claim_next(&self, job_type: JobType) -> Option<JobId> {
        let mut state = self.state.lock().await;
        let class = state.classes.get_mut(&job_type)?;
        if class.running.len() >= class.capacity {
            return None;
        }
        let (_, id) = class.waiting.pop_first()?;
        class.keys.remove(&id);
        class.running.insert(id.clone());
        Some(id)
    }

    /// Free the slot held by `id`. A second release for the same claim is a
    /// no-op returning `false`.
    pub async fn release(&self, job_type: JobType, id: &str) -> bool {
        let mut state = self.state.lock().await;
        state
            .classes
            .get_mut(&job_type)
            .is_some_and(|class| class.running.remove(id))
    }

    /// Drop `id` from whichever waiting queue holds it. Running slots are
    /// left alone; they are freed by [`release`](Self::release).
    pub async fn forget(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        for class in state.classes.values_mut() {
            if let Some(key) = class.keys.remove(id) {
                class.waiting.remove(&key);
                return true;
            }
        }
        false
    }

    /// Whether an attempt for `id` still occupies a slot of any type.
    pub async fn holds_slot(&self, id: &str) -> bool {
        let state = self.state.lock().await;
        state.classes.values().any(|class| class.running.contains(id))
    }

    pub async fn snapshot(&self, job_type: JobType) -> ClassSnapshot {
        let state = self.state.lock().await;
        match state.classes.get(&job_type) {
            Some(class) => ClassSnapshot {
                capacity: class.capacity,
                running: class.running.len(),
                waiting: class.waiting.values().cloned().collect(),
            },
            None => ClassSnapshot {
                capacity: 0,
                running: 0,
                waiting: Vec::new(),
            },
        }
    }
}
