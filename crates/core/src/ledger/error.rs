//! Ledger error types.
//!
//! Every error carries enough detail to act on: which account or transfer,
//! and which constraint was violated. [`ErrorKind`] groups them by how a
//! caller should react.

use std::time::Duration;

use rust_decimal::Decimal;
use tally_shared::AppError;
use tally_shared::types::{AccountId, CurrencyCode, OwnerId, TransferId};
use thiserror::Error;

use super::state::TransferStatus;
use super::store::StoreError;

/// How a caller should react to a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller error; fix the request, do not retry.
    Validation,
    /// Business rule refused the operation; do not retry.
    BusinessRule,
    /// Transient; the whole operation may be retried.
    Retryable,
    /// Store unavailable or corrupted.
    Fatal,
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// Amount is zero or negative.
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    /// Amount has more fractional digits than the ledger stores.
    #[error("Amount {amount} has more than {max_scale} decimal places")]
    AmountPrecision {
        /// Offending amount.
        amount: Decimal,
        /// Maximum number of decimal places.
        max_scale: u32,
    },

    /// Amount exceeds what a balance column can hold.
    #[error("Amount {0} is out of range")]
    AmountOutOfRange(Decimal),

    /// Adjustment of zero.
    #[error("Adjustment amount cannot be zero")]
    ZeroAdjustment,

    /// Reversals and adjustments need a non-blank reason.
    #[error("A reason is required")]
    ReasonRequired,

    /// Request currency differs from an account's currency.
    #[error("Currency mismatch on account {account_id}: account is {expected}, request is {actual}")]
    CurrencyMismatch {
        /// Account whose currency differs.
        account_id: AccountId,
        /// The account's currency.
        expected: CurrencyCode,
        /// The requested currency.
        actual: CurrencyCode,
    },

    /// Source and destination are the same account.
    #[error("Cannot transfer from account {0} to itself")]
    SameAccount(AccountId),

    /// Account is frozen or inactive.
    #[error("Account {0} is frozen or inactive")]
    AccountFrozen(AccountId),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Transfer not found.
    #[error("Transfer not found: {0}")]
    TransferNotFound(TransferId),

    /// Illegal state machine transition.
    #[error("Invalid transfer state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current status.
        from: TransferStatus,
        /// Requested status.
        to: TransferStatus,
    },

    /// Only completed transfers can be reversed.
    #[error("Transfer {transfer_id} is {status} and cannot be reversed")]
    NotReversible {
        /// Transfer that was targeted.
        transfer_id: TransferId,
        /// Its current status.
        status: TransferStatus,
    },

    /// Transfer has already been reversed.
    #[error("Transfer {0} has already been reversed")]
    AlreadyReversed(TransferId),

    /// Owner already holds an active account in this currency.
    #[error("Owner {owner_id} already has an active {currency} account")]
    DuplicateActiveAccount {
        /// Account owner.
        owner_id: OwnerId,
        /// Currency of the existing account.
        currency: CurrencyCode,
    },

    /// Account still holds funds.
    #[error("Account {account_id} still holds a balance of {balance}")]
    AccountNotEmpty {
        /// Account that was targeted.
        account_id: AccountId,
        /// Its balance.
        balance: Decimal,
    },

    /// Account is referenced by transfers or adjustments.
    #[error("Account {account_id} is referenced by {references} ledger records")]
    AccountReferenced {
        /// Account that was targeted.
        account_id: AccountId,
        /// Number of referencing records.
        references: u64,
    },

    // ========== Business Rule Errors ==========
    /// Source account cannot cover the transfer.
    #[error("Insufficient funds in account {account_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Debited account.
        account_id: AccountId,
        /// Its balance at the time of the attempt.
        balance: Decimal,
        /// Requested amount.
        requested: Decimal,
    },

    /// Destination account already spent the funds a reversal needs back.
    #[error(
        "Cannot reverse transfer {transfer_id}: account {account_id} holds {balance}, needs {required}"
    )]
    InsufficientFundsForReversal {
        /// Transfer being reversed.
        transfer_id: TransferId,
        /// Account that would be debited.
        account_id: AccountId,
        /// Its balance at the time of the attempt.
        balance: Decimal,
        /// Amount the reversal needs.
        required: Decimal,
    },

    /// Balance adjustment would make the balance negative.
    #[error("Adjustment of {delta} would make account {account_id} negative (balance {balance})")]
    WouldGoNegative {
        /// Adjusted account.
        account_id: AccountId,
        /// Its balance at the time of the attempt.
        balance: Decimal,
        /// Requested delta.
        delta: Decimal,
    },

    /// Balance would exceed the representable range.
    #[error("Balance of account {0} would overflow")]
    BalanceOverflow(AccountId),

    // ========== Transient Errors ==========
    /// Serialization failure, deadlock detection, or failed commit.
    #[error("Concurrent modification, retry the operation: {0}")]
    ConcurrencyConflict(String),

    /// A row lock was not granted in time.
    #[error("Timed out waiting for a row lock: {0}")]
    LockTimeout(String),

    /// The operation exceeded its deadline and was rolled back.
    #[error("Operation exceeded its {0:?} deadline and was rolled back")]
    Timeout(Duration),

    // ========== Fatal Errors ==========
    /// Store unavailable or returned corrupted data.
    #[error("Store error: {0}")]
    Store(String),
}

impl LedgerError {
    /// Classifies the error for callers.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NonPositiveAmount(_)
            | Self::AmountPrecision { .. }
            | Self::AmountOutOfRange(_)
            | Self::ZeroAdjustment
            | Self::ReasonRequired
            | Self::CurrencyMismatch { .. }
            | Self::SameAccount(_)
            | Self::AccountFrozen(_)
            | Self::AccountNotFound(_)
            | Self::TransferNotFound(_)
            | Self::InvalidStateTransition { .. }
            | Self::NotReversible { .. }
            | Self::AlreadyReversed(_)
            | Self::DuplicateActiveAccount { .. }
            | Self::AccountNotEmpty { .. }
            | Self::AccountReferenced { .. } => ErrorKind::Validation,
            Self::InsufficientFunds { .. }
            | Self::InsufficientFundsForReversal { .. }
            | Self::WouldGoNegative { .. }
            | Self::BalanceOverflow(_) => ErrorKind::BusinessRule,
            Self::ConcurrencyConflict(_) | Self::LockTimeout(_) | Self::Timeout(_) => {
                ErrorKind::Retryable
            }
            Self::Store(_) => ErrorKind::Fatal,
        }
    }

    /// Returns true if the whole operation may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Retryable)
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => Self::AccountNotFound(id),
            StoreError::TransferNotFound(id) => Self::TransferNotFound(id),
            StoreError::WouldGoNegative {
                account_id,
                balance,
                delta,
            } => Self::WouldGoNegative {
                account_id,
                balance,
                delta,
            },
            StoreError::BalanceOverflow(id) => Self::BalanceOverflow(id),
            StoreError::DuplicateActiveAccount { owner_id, currency } => {
                Self::DuplicateActiveAccount { owner_id, currency }
            }
            StoreError::Conflict(msg) => Self::ConcurrencyConflict(msg),
            StoreError::LockTimeout(msg) => Self::LockTimeout(msg),
            err @ (StoreError::RowNotLocked { .. }
            | StoreError::Corrupt(_)
            | StoreError::Unavailable(_)) => Self::Store(err.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match (&err, err.kind()) {
            (LedgerError::AccountNotFound(_) | LedgerError::TransferNotFound(_), _) => {
                Self::NotFound(message)
            }
            (LedgerError::DuplicateActiveAccount { .. }, _) => Self::Conflict(message),
            (_, ErrorKind::Validation) => Self::Validation(message),
            (_, ErrorKind::BusinessRule) => Self::BusinessRule(message),
            (_, ErrorKind::Retryable) => Self::Retryable(message),
            (_, ErrorKind::Fatal) => Self::Database(message),
        }
    }
}
