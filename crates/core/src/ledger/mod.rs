//! Ledger transfer engine.
//!
//! This module implements the monetary core:
//! - Account and transfer entities
//! - The transfer state machine (pending → completed/failed, completed → reversed)
//! - Pure invariant checks (currency, frozen accounts, amount well-formedness)
//! - Store traits with row-level locking reads, plus an in-memory store
//! - The transfer engine, reversal coordinator and account lifecycle
//! - Retry policy for transient failures
//! - `LedgerService`, the facade exposed to collaborators
//!
//! Every path that locks two accounts acquires them in ascending `AccountId`
//! order (see [`lock_order`]).

pub mod account;
pub mod adjustment;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod retry;
pub mod reversal;
pub mod service;
pub mod settings;
pub mod state;
pub mod store;
pub mod transfer;
pub mod validation;

#[cfg(test)]
mod state_props;
#[cfg(test)]
mod validation_props;

use chrono::{DateTime, SubsecRound, Utc};

pub use account::Account;
pub use adjustment::BalanceAdjustment;
pub use engine::{AdjustBalanceInput, CreateTransferInput, TransferEngine, lock_order};
pub use error::{ErrorKind, LedgerError};
pub use lifecycle::{AccountService, OpenAccountInput};
pub use memory::{MemoryLedgerStore, MemoryTx};
pub use retry::{RetryPolicy, retry};
pub use reversal::{ReversalCoordinator, ReverseTransferInput};
pub use service::LedgerService;
pub use settings::LedgerSettings;
pub use state::TransferStatus;
pub use store::{IsolationLevel, LedgerStore, LedgerTx, StoreError, TxOptions};
pub use transfer::Transfer;

/// Current time truncated to the microsecond precision of `TIMESTAMPTZ`.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
