//! Classification of PostgreSQL failures into store errors.
//!
//! Every `DbErr` leaving this crate goes through [`classify`] so that
//! serialization failures, deadlocks and lock timeouts surface as the
//! transient `StoreError` variants the engine retries on.

use sea_orm::{DbErr, RuntimeErr};
use tally_core::ledger::StoreError;

/// `serialization_failure`
pub const SERIALIZATION_FAILURE: &str = "40001";
/// `deadlock_detected`
pub const DEADLOCK_DETECTED: &str = "40P01";
/// `lock_not_available`, raised when `lock_timeout` expires.
pub const LOCK_NOT_AVAILABLE: &str = "55P03";
/// `query_canceled`
pub const QUERY_CANCELED: &str = "57014";
/// `unique_violation`
pub const UNIQUE_VIOLATION: &str = "23505";
/// `foreign_key_violation`
pub const FOREIGN_KEY_VIOLATION: &str = "23503";
/// `check_violation`
pub const CHECK_VIOLATION: &str = "23514";
/// `numeric_value_out_of_range`
pub const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// Partial unique index guarding one active account per owner and currency.
pub const ACTIVE_ACCOUNT_INDEX: &str = "uq_accounts_owner_currency_active";
/// Check constraint keeping balances non-negative.
pub const BALANCE_NON_NEGATIVE: &str = "chk_accounts_balance_non_negative";

/// What went wrong, as far as the ledger cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgFailure {
    /// Serialization failure or deadlock; the transaction may be retried.
    Conflict,
    /// Row lock not granted in time.
    LockTimeout,
    /// Unique constraint violated.
    UniqueViolation(Option<String>),
    /// Referenced row missing.
    ForeignKeyViolation(Option<String>),
    /// Check constraint violated.
    CheckViolation(Option<String>),
    /// Value exceeds the column precision.
    NumericOutOfRange,
    /// Connection or pool failure.
    Unavailable,
    /// Anything else.
    Other,
}

/// Classifies a SQLSTATE code and the constraint it names.
#[must_use]
pub fn classify_code(code: &str, constraint: Option<&str>) -> PgFailure {
    let constraint = constraint.map(str::to_string);
    match code {
        SERIALIZATION_FAILURE | DEADLOCK_DETECTED => PgFailure::Conflict,
        LOCK_NOT_AVAILABLE | QUERY_CANCELED => PgFailure::LockTimeout,
        UNIQUE_VIOLATION => PgFailure::UniqueViolation(constraint),
        FOREIGN_KEY_VIOLATION => PgFailure::ForeignKeyViolation(constraint),
        CHECK_VIOLATION => PgFailure::CheckViolation(constraint),
        NUMERIC_OUT_OF_RANGE => PgFailure::NumericOutOfRange,
        // Class 08: connection exception
        code if code.starts_with("08") => PgFailure::Unavailable,
        _ => PgFailure::Other,
    }
}

fn classify_sqlx(err: &sqlx::Error) -> PgFailure {
    match err {
        sqlx::Error::Database(db) => match db.code() {
            Some(code) => classify_code(&code, db.constraint()),
            None => PgFailure::Other,
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => PgFailure::Unavailable,
        _ => PgFailure::Other,
    }
}

/// Classifies a `SeaORM` error.
#[must_use]
pub fn classify(err: &DbErr) -> PgFailure {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(inner)) | DbErr::Query(RuntimeErr::SqlxError(inner)) => {
            classify_sqlx(inner)
        }
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => PgFailure::Unavailable,
        _ => PgFailure::Other,
    }
}

/// Converts a `SeaORM` error into the generic store error for its class.
///
/// Call sites that expect a specific constraint violation match on
/// [`classify`] first and fall back to this.
#[must_use]
pub fn into_store_error(err: DbErr) -> StoreError {
    let message = err.to_string();
    match classify(&err) {
        PgFailure::Conflict | PgFailure::UniqueViolation(_) => StoreError::Conflict(message),
        PgFailure::LockTimeout => StoreError::LockTimeout(message),
        PgFailure::Unavailable => StoreError::Unavailable(message),
        PgFailure::ForeignKeyViolation(_)
        | PgFailure::CheckViolation(_)
        | PgFailure::NumericOutOfRange
        | PgFailure::Other => StoreError::Corrupt(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use sea_orm::ConnAcquireErr;

    #[rstest]
    #[case(SERIALIZATION_FAILURE, PgFailure::Conflict)]
    #[case(DEADLOCK_DETECTED, PgFailure::Conflict)]
    #[case(LOCK_NOT_AVAILABLE, PgFailure::LockTimeout)]
    #[case(QUERY_CANCELED, PgFailure::LockTimeout)]
    #[case(NUMERIC_OUT_OF_RANGE, PgFailure::NumericOutOfRange)]
    #[case("08006", PgFailure::Unavailable)]
    #[case("42P01", PgFailure::Other)]
    fn test_classify_code(#[case] code: &str, #[case] expected: PgFailure) {
        assert_eq!(classify_code(code, None), expected);
    }

    #[test]
    fn test_constraint_name_is_kept() {
        assert_eq!(
            classify_code(UNIQUE_VIOLATION, Some(ACTIVE_ACCOUNT_INDEX)),
            PgFailure::UniqueViolation(Some(ACTIVE_ACCOUNT_INDEX.to_string()))
        );
        assert_eq!(
            classify_code(CHECK_VIOLATION, Some(BALANCE_NON_NEGATIVE)),
            PgFailure::CheckViolation(Some(BALANCE_NON_NEGATIVE.to_string()))
        );
        assert_eq!(
            classify_code(FOREIGN_KEY_VIOLATION, None),
            PgFailure::ForeignKeyViolation(None)
        );
    }

    #[test]
    fn test_connection_errors_are_unavailable() {
        let err = DbErr::Conn(RuntimeErr::Internal("connection refused".to_string()));
        assert_eq!(classify(&err), PgFailure::Unavailable);
        assert!(matches!(into_store_error(err), StoreError::Unavailable(_)));

        let err = DbErr::ConnectionAcquire(ConnAcquireErr::Timeout);
        assert!(matches!(into_store_error(err), StoreError::Unavailable(_)));
    }

    #[test]
    fn test_unknown_errors_are_corrupt() {
        let err = DbErr::Custom("boom".to_string());
        assert_eq!(classify(&err), PgFailure::Other);
        assert!(matches!(into_store_error(err), StoreError::Corrupt(_)));

        let err = DbErr::Query(RuntimeErr::Internal("bad row".to_string()));
        assert!(matches!(into_store_error(err), StoreError::Corrupt(_)));
    }
}
