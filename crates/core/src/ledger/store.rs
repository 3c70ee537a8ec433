//! Store traits the engine runs against.
//!
//! A [`LedgerStore`] is a cloneable handle to the persistent store. Every
//! mutating operation goes through a [`LedgerTx`], which maps onto exactly
//! one database transaction. Dropping a `LedgerTx` without calling
//! [`LedgerTx::commit`] rolls it back.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tally_shared::types::{AccountId, CurrencyCode, OwnerId, PageRequest, TransferId};
use thiserror::Error;
use uuid::Uuid;

use super::account::Account;
use super::adjustment::BalanceAdjustment;
use super::transfer::Transfer;

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// `READ COMMITTED`; correctness relies on locking reads alone.
    ReadCommitted,
    /// `REPEATABLE READ`.
    RepeatableRead,
    /// `SERIALIZABLE`.
    #[default]
    Serializable,
}

/// Options for a new transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    /// Isolation level.
    pub isolation: IsolationLevel,
    /// Maximum wait for a single row lock. `None` waits until the deadline.
    pub lock_timeout: Option<Duration>,
}

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Account row does not exist.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Transfer row does not exist.
    #[error("Transfer not found: {0}")]
    TransferNotFound(TransferId),

    /// Delta would take the balance below zero.
    #[error("Delta {delta} would make account {account_id} negative (balance {balance})")]
    WouldGoNegative {
        /// Target account.
        account_id: AccountId,
        /// Balance before the delta.
        balance: Decimal,
        /// Rejected delta.
        delta: Decimal,
    },

    /// Balance would exceed the representable range.
    #[error("Balance of account {0} would overflow")]
    BalanceOverflow(AccountId),

    /// A write was attempted on a row this transaction never locked.
    #[error("Row {id} in {table} was written without a prior locking read")]
    RowNotLocked {
        /// Table name.
        table: &'static str,
        /// Row id.
        id: Uuid,
    },

    /// Owner already holds an active account in this currency.
    #[error("Owner {owner_id} already has an active {currency} account")]
    DuplicateActiveAccount {
        /// Account owner.
        owner_id: OwnerId,
        /// Currency.
        currency: CurrencyCode,
    },

    /// Serialization failure or detected deadlock.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Row lock not granted within the lock timeout.
    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    /// Stored row could not be mapped to an entity.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Store cannot be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Handle to the persistent ledger store.
///
/// Plain reads see committed state only and take no locks.
#[async_trait]
pub trait LedgerStore: Clone + Send + Sync + 'static {
    /// Transaction type produced by [`LedgerStore::begin`].
    type Tx: LedgerTx;

    /// Starts a new transaction.
    async fn begin(&self, options: TxOptions) -> Result<Self::Tx, StoreError>;

    /// Reads an account without locking it.
    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError>;

    /// Reads a transfer without locking it.
    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, StoreError>;

    /// Lists all accounts of an owner, oldest first.
    async fn list_accounts_for_owner(&self, owner_id: OwnerId)
        -> Result<Vec<Account>, StoreError>;

    /// Lists one page of transfers touching an account, newest first,
    /// together with the total count.
    async fn list_transfers_for_account(
        &self,
        account_id: AccountId,
        page: &PageRequest,
    ) -> Result<(Vec<Transfer>, u64), StoreError>;

    /// Sums the balances of every account in a currency.
    async fn total_balance(&self, currency: CurrencyCode) -> Result<Decimal, StoreError>;

    /// Lists the adjustment audit trail of an account, oldest first.
    async fn list_adjustments(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<BalanceAdjustment>, StoreError>;
}

/// One store transaction, exclusively owned by one orchestration call.
#[async_trait]
pub trait LedgerTx: Send {
    /// Reads an account and takes an exclusive row lock on it until the
    /// transaction ends. Blocks while another transaction holds the lock.
    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, StoreError>;

    /// Adds `delta` to the balance of an account locked by this transaction.
    async fn apply_delta(&mut self, id: AccountId, delta: Decimal) -> Result<Account, StoreError>;

    /// Inserts a new account.
    async fn insert_account(&mut self, account: &Account) -> Result<(), StoreError>;

    /// Updates the flags of an account locked by this transaction.
    async fn update_account_flags(
        &mut self,
        id: AccountId,
        is_active: bool,
        is_frozen: bool,
    ) -> Result<Account, StoreError>;

    /// Deletes an account locked by this transaction.
    async fn delete_account(&mut self, id: AccountId) -> Result<(), StoreError>;

    /// Counts transfers and adjustments referencing an account.
    async fn count_account_references(&mut self, id: AccountId) -> Result<u64, StoreError>;

    /// Reads a transfer and takes an exclusive row lock on it.
    async fn get_transfer_for_update(&mut self, id: TransferId) -> Result<Transfer, StoreError>;

    /// Inserts a transfer.
    async fn insert_transfer(&mut self, transfer: &Transfer) -> Result<(), StoreError>;

    /// Overwrites the mutable fields of a transfer locked by this transaction.
    async fn update_transfer(&mut self, transfer: &Transfer) -> Result<(), StoreError>;

    /// Inserts an adjustment audit record.
    async fn insert_adjustment(&mut self, adjustment: &BalanceAdjustment)
        -> Result<(), StoreError>;

    /// Commits the transaction.
    async fn commit(self) -> Result<(), StoreError>;

    /// Rolls the transaction back.
    async fn rollback(self) -> Result<(), StoreError>;
}
