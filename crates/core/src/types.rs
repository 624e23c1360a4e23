/// Job identifiers are opaque strings: caller-supplied or a generated UUID.
pub type JobId = String;

/// Upload groups are a query grouping, not a stored entity.
pub type UploadGroupId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
