/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Block indices and counts are stored as PostgreSQL INTEGER.
pub type BlockIndex = i32;
