//! Classification of database failures.
//!
//! Callers must be able to tell a missing row from a lost race from a broken
//! schema. Only [`StoreError::Transient`] may be retried silently.

/// PostgreSQL SQLSTATE for unique constraint violations.
pub const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL SQLSTATE for exclusion constraint violations.
pub const EXCLUSION_VIOLATION: &str = "23P01";

/// SQLSTATEs that indicate contention rather than a broken request.
const TRANSIENT_CODES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The row the caller asked for does not exist.
    #[error("row not found")]
    NotFound,

    /// Contention or connectivity; the same call may succeed if repeated.
    #[error("transient database error: {0}")]
    Transient(#[source] sqlx::Error),

    /// Anything else: schema violations, bad SQL, misconfiguration.
    #[error("database error: {0}")]
    Fatal(#[source] sqlx::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            StoreError::NotFound
        } else if is_transient(&err) {
            StoreError::Transient(err)
        } else {
            StoreError::Fatal(err)
        }
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| TRANSIENT_CODES.contains(&&*code)),
        _ => false,
    }
}

/// Whether `err` is a unique-constraint violation, optionally on a specific
/// named constraint.
///
/// Unique violations are how the store reports lost claim races, so callers
/// that use a constraint as an exclusivity token check for them explicitly.
pub fn is_unique_violation(err: &sqlx::Error, constraint: Option<&str>) -> bool {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            match constraint {
                Some(name) => db_err.constraint() == Some(name),
                None => true,
            }
        }
        _ => false,
    }
}
