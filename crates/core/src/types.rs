use crate::error::CoreError;

/// All primary keys are UUIDs. Rows created by this service use v7 so they
/// sort by creation time.
pub type DbId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh time-ordered id.
pub fn new_id() -> DbId {
    uuid::Uuid::now_v7()
}

/// Parse an id received from the outside world.
///
/// Malformed input is a validation failure, never a "not found".
pub fn parse_id(raw: &str) -> Result<DbId, CoreError> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Validation(format!("'{raw}' is not a valid id")))
}
