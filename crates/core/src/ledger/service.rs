//! Ledger service: the facade exposed to collaborators.
//!
//! HTTP handlers and admin tools call into the ledger only through this
//! type. It wires the engine, the reversal coordinator and the account
//! service to one store, and wraps `create_transfer` and `reverse_transfer`
//! in the retry policy.

use rust_decimal::Decimal;
use tally_shared::types::{AccountId, CurrencyCode, OwnerId, PageRequest, PageResponse, TransferId};

use super::account::Account;
use super::adjustment::BalanceAdjustment;
use super::engine::{AdjustBalanceInput, CreateTransferInput, TransferEngine};
use super::error::LedgerError;
use super::lifecycle::{AccountService, OpenAccountInput};
use super::retry::{RetryPolicy, retry};
use super::reversal::{ReversalCoordinator, ReverseTransferInput};
use super::settings::LedgerSettings;
use super::store::LedgerStore;
use super::transfer::Transfer;

/// Ledger facade.
///
/// The store handle is passed in explicitly; tests inject an isolated store
/// per test.
#[derive(Debug, Clone)]
pub struct LedgerService<S> {
    store: S,
    engine: TransferEngine<S>,
    reversals: ReversalCoordinator<S>,
    accounts: AccountService<S>,
    retry: RetryPolicy,
}

impl<S: LedgerStore> LedgerService<S> {
    /// Creates a new ledger service.
    #[must_use]
    pub fn new(store: S, settings: LedgerSettings) -> Self {
        Self {
            engine: TransferEngine::new(store.clone(), settings),
            reversals: ReversalCoordinator::new(store.clone(), settings),
            accounts: AccountService::new(store.clone(), settings),
            retry: settings.retry,
            store,
        }
    }

    /// Returns the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    // ========== Transfers ==========

    /// Creates a transfer, retrying transient failures.
    pub async fn create_transfer(&self, input: CreateTransferInput) -> Result<Transfer, LedgerError> {
        retry(&self.retry, || self.engine.create_transfer(input.clone())).await
    }

    /// Reverses a completed transfer, retrying transient failures.
    pub async fn reverse_transfer(
        &self,
        input: ReverseTransferInput,
    ) -> Result<Transfer, LedgerError> {
        retry(&self.retry, || self.reversals.reverse_transfer(input.clone())).await
    }

    /// Applies an administrative balance adjustment. Not retried.
    pub async fn adjust_balance(&self, input: AdjustBalanceInput) -> Result<Account, LedgerError> {
        self.engine.adjust_balance(input).await
    }

    /// Reads one transfer.
    pub async fn get_transfer(&self, id: TransferId) -> Result<Transfer, LedgerError> {
        Ok(self.store.get_transfer(id).await?)
    }

    /// Lists the transfers touching an account, newest first.
    pub async fn list_transfers(
        &self,
        account_id: AccountId,
        page: &PageRequest,
    ) -> Result<PageResponse<Transfer>, LedgerError> {
        self.store.get_account(account_id).await?;
        let (data, total) = self
            .store
            .list_transfers_for_account(account_id, page)
            .await?;
        Ok(PageResponse::new(data, page, total))
    }

    // ========== Accounts ==========

    /// Reads one account.
    pub async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.accounts.get_account(id).await
    }

    /// Lists all accounts of an owner.
    pub async fn list_accounts(&self, owner_id: OwnerId) -> Result<Vec<Account>, LedgerError> {
        self.accounts.list_accounts(owner_id).await
    }

    /// Opens an account.
    pub async fn open_account(&self, input: OpenAccountInput) -> Result<Account, LedgerError> {
        self.accounts.open_account(input).await
    }

    /// Freezes an account.
    pub async fn freeze_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.accounts.freeze_account(id).await
    }

    /// Unfreezes an account.
    pub async fn unfreeze_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.accounts.unfreeze_account(id).await
    }

    /// Deactivates an empty account.
    pub async fn deactivate_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.accounts.deactivate_account(id).await
    }

    /// Deletes an empty, unreferenced account.
    pub async fn close_account(&self, id: AccountId) -> Result<(), LedgerError> {
        self.accounts.close_account(id).await
    }

    // ========== Audits ==========

    /// Sum of all balances in a currency.
    pub async fn total_balance(&self, currency: CurrencyCode) -> Result<Decimal, LedgerError> {
        Ok(self.store.total_balance(currency).await?)
    }

    /// Adjustment audit trail of an account.
    pub async fn list_adjustments(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<BalanceAdjustment>, LedgerError> {
        Ok(self.store.list_adjustments(account_id).await?)
    }
}
