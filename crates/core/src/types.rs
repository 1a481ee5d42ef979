/// Opaque job identifier, assigned at submission.
pub type JobId = uuid::Uuid;

/// External correlation key supplied by the client (one live job per session).
pub type SessionId = String;

/// All wall-clock timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
