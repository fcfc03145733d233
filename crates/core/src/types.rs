/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Jobs and projects are identified by random UUIDs.
pub type JobId = uuid::Uuid;

/// Project identifier, same representation as [`JobId`] but kept as a
/// separate alias so signatures document which resource they refer to.
pub type ProjectId = uuid::Uuid;
