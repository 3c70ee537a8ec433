//! Transfer engine: creates transfers and applies administrative adjustments.
//!
//! Each call runs in exactly one store transaction:
//! 1. Lock both accounts in ascending id order ([`lock_order`])
//! 2. Validate the request against the locked snapshots
//! 3. Debit, credit, persist the `completed` transfer
//! 4. Commit, or roll back on any error
//!
//! The whole call runs under a deadline. Expiry drops the transaction, which
//! rolls it back.

use std::future::Future;
use std::time::Duration;

use rust_decimal::Decimal;
use tally_shared::types::{AccountId, AdjustmentId, CurrencyCode};
use tracing::{debug, error, info, warn};

use super::account::Account;
use super::adjustment::BalanceAdjustment;
use super::error::{ErrorKind, LedgerError};
use super::now;
use super::settings::LedgerSettings;
use super::store::{LedgerStore, LedgerTx, StoreError};
use super::transfer::Transfer;
use super::validation::{
    validate_adjustment, validate_amount, validate_reason, validate_transfer_request,
};

/// Input for creating a transfer.
#[derive(Debug, Clone)]
pub struct CreateTransferInput {
    /// Account to debit.
    pub from_account_id: AccountId,
    /// Account to credit.
    pub to_account_id: AccountId,
    /// Strictly positive amount.
    pub amount: Decimal,
    /// Currency of both accounts.
    pub currency: CurrencyCode,
    /// Free-form description.
    pub description: String,
    /// Overrides the configured deadline.
    pub deadline: Option<Duration>,
}

/// Input for an administrative balance adjustment.
#[derive(Debug, Clone)]
pub struct AdjustBalanceInput {
    /// Adjusted account.
    pub account_id: AccountId,
    /// Signed, non-zero amount.
    pub amount: Decimal,
    /// Mandatory justification, kept in the audit record.
    pub reason: String,
    /// Overrides the configured deadline.
    pub deadline: Option<Duration>,
}

/// Canonical lock order for two accounts: ascending id.
///
/// Every path that locks two accounts must lock them in this order, whatever
/// their debit or credit role.
#[must_use]
pub fn lock_order(a: AccountId, b: AccountId) -> [AccountId; 2] {
    if a <= b { [a, b] } else { [b, a] }
}

/// Runs `operation` under `deadline`; expiry becomes a retryable `Timeout`.
pub(crate) async fn with_deadline<T>(
    deadline: Duration,
    operation: impl Future<Output = Result<T, LedgerError>>,
) -> Result<T, LedgerError> {
    tokio::time::timeout(deadline, operation)
        .await
        .unwrap_or(Err(LedgerError::Timeout(deadline)))
}

/// Commits `tx`, or rolls it back and returns the body's error.
///
/// Commit failures surface as retryable `ConcurrencyConflict`; the
/// transaction is gone either way.
pub(crate) async fn finish<Tx: LedgerTx, T>(
    tx: Tx,
    outcome: Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    match outcome {
        Ok(value) => {
            tx.commit().await.map_err(commit_error)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed; transaction discarded");
            }
            if err.kind() == ErrorKind::Fatal {
                error!(error = %err, "Ledger operation failed with a store error");
            }
            Err(err)
        }
    }
}

fn commit_error(err: StoreError) -> LedgerError {
    match err {
        StoreError::Conflict(msg) | StoreError::LockTimeout(msg) | StoreError::Unavailable(msg) => {
            LedgerError::ConcurrencyConflict(format!("commit failed: {msg}"))
        }
        other => other.into(),
    }
}

/// Maps a failed debit of a transfer source.
fn debit_error(err: StoreError, requested: Decimal) -> LedgerError {
    match err {
        StoreError::WouldGoNegative {
            account_id,
            balance,
            ..
        } => LedgerError::InsufficientFunds {
            account_id,
            balance,
            requested,
        },
        other => other.into(),
    }
}

/// Returns true for rejections that are recorded as `failed` transfers.
const fn is_recordable(err: &LedgerError) -> bool {
    matches!(
        err,
        LedgerError::InsufficientFunds { .. }
            | LedgerError::CurrencyMismatch { .. }
            | LedgerError::AccountFrozen(_)
    )
}

/// Orchestrates transfers and adjustments against a [`LedgerStore`].
#[derive(Debug, Clone)]
pub struct TransferEngine<S> {
    store: S,
    settings: LedgerSettings,
}

impl<S: LedgerStore> TransferEngine<S> {
    /// Creates a new engine.
    #[must_use]
    pub const fn new(store: S, settings: LedgerSettings) -> Self {
        Self { store, settings }
    }

    /// Returns the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Moves `amount` from one account to another atomically.
    ///
    /// # Errors
    ///
    /// Validation errors, `InsufficientFunds`, or a retryable
    /// `ConcurrencyConflict` / `LockTimeout` / `Timeout`.
    pub async fn create_transfer(&self, input: CreateTransferInput) -> Result<Transfer, LedgerError> {
        if input.from_account_id == input.to_account_id {
            return Err(LedgerError::SameAccount(input.from_account_id));
        }
        validate_amount(input.amount)?;

        let deadline = input.deadline.unwrap_or(self.settings.transaction_timeout);
        let result = with_deadline(deadline, self.create_transfer_once(&input)).await;

        match &result {
            Ok(transfer) => info!(
                transfer_id = %transfer.id,
                from = %transfer.from_account_id,
                to = %transfer.to_account_id,
                amount = %transfer.amount,
                currency = %transfer.currency,
                "Transfer completed"
            ),
            Err(err) => {
                debug!(
                    from = %input.from_account_id,
                    to = %input.to_account_id,
                    amount = %input.amount,
                    error = %err,
                    "Transfer rejected"
                );
                if self.settings.record_failed_transfers && is_recordable(err) {
                    self.record_failed_transfer(&input, err).await;
                }
            }
        }
        result
    }

    async fn create_transfer_once(
        &self,
        input: &CreateTransferInput,
    ) -> Result<Transfer, LedgerError> {
        let mut tx = self.store.begin(self.settings.tx_options()).await?;
        let outcome = Self::transfer_in_tx(&mut tx, input).await;
        finish(tx, outcome).await
    }

    async fn transfer_in_tx(
        tx: &mut S::Tx,
        input: &CreateTransferInput,
    ) -> Result<Transfer, LedgerError> {
        let [first, second] = lock_order(input.from_account_id, input.to_account_id);
        let first = tx.get_account_for_update(first).await?;
        let second = tx.get_account_for_update(second).await?;
        let (from, to) = if first.id == input.from_account_id {
            (first, second)
        } else {
            (second, first)
        };

        validate_transfer_request(&from, &to, input.amount, input.currency)?;

        let mut transfer = Transfer::pending(
            from.id,
            to.id,
            input.amount,
            input.currency,
            input.description.clone(),
            now(),
        );

        tx.apply_delta(from.id, -input.amount)
            .await
            .map_err(|err| debit_error(err, input.amount))?;
        tx.apply_delta(to.id, input.amount).await?;

        transfer.complete()?;
        tx.insert_transfer(&transfer).await?;
        Ok(transfer)
    }

    /// Persists a `failed` transfer after a rejection, in its own
    /// transaction. Never touches balances and never masks the rejection.
    async fn record_failed_transfer(&self, input: &CreateTransferInput, reason: &LedgerError) {
        let mut transfer = Transfer::pending(
            input.from_account_id,
            input.to_account_id,
            input.amount,
            input.currency,
            input.description.clone(),
            now(),
        );
        let recorded = async {
            transfer.fail(reason.to_string())?;
            let mut tx = self.store.begin(self.settings.tx_options()).await?;
            let outcome = tx.insert_transfer(&transfer).await.map_err(LedgerError::from);
            finish(tx, outcome).await
        };

        let result = with_deadline(self.settings.transaction_timeout, recorded).await;
        match result {
            Ok(()) => info!(transfer_id = %transfer.id, reason = %reason, "Recorded failed transfer"),
            Err(err) => warn!(
                from = %input.from_account_id,
                to = %input.to_account_id,
                error = %err,
                "Could not record failed transfer"
            ),
        }
    }

    /// Applies a signed adjustment to one account, bypassing frozen and
    /// inactive gating, and writes a [`BalanceAdjustment`] audit record in
    /// the same transaction.
    ///
    /// # Errors
    ///
    /// `ZeroAdjustment`, `ReasonRequired`, amount errors, `AccountNotFound`,
    /// `WouldGoNegative`, or a retryable error.
    pub async fn adjust_balance(&self, input: AdjustBalanceInput) -> Result<Account, LedgerError> {
        validate_adjustment(input.amount)?;
        let reason = validate_reason(&input.reason)?;

        let deadline = input.deadline.unwrap_or(self.settings.transaction_timeout);
        let account = with_deadline(deadline, async {
            let mut tx = self.store.begin(self.settings.tx_options()).await?;
            let outcome = Self::adjust_in_tx(&mut tx, input.account_id, input.amount, reason).await;
            finish(tx, outcome).await
        })
        .await?;

        info!(
            account_id = %account.id,
            amount = %input.amount,
            balance = %account.balance,
            reason = %reason,
            "Balance adjusted"
        );
        Ok(account)
    }

    async fn adjust_in_tx(
        tx: &mut S::Tx,
        account_id: AccountId,
        amount: Decimal,
        reason: &str,
    ) -> Result<Account, LedgerError> {
        tx.get_account_for_update(account_id).await?;
        let account = tx.apply_delta(account_id, amount).await?;
        let adjustment = BalanceAdjustment {
            id: AdjustmentId::new(),
            account_id,
            amount,
            reason: reason.to_string(),
            balance_after: account.balance,
            created_at: now(),
        };
        tx.insert_adjustment(&adjustment).await?;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_order_is_ascending_and_symmetric() {
        let a = AccountId::new();
        let b = AccountId::new();
        let ordered = lock_order(a, b);
        assert!(ordered[0] < ordered[1]);
        assert_eq!(ordered, lock_order(b, a));
    }

    #[test]
    fn test_commit_errors_are_retryable() {
        assert!(commit_error(StoreError::Conflict("40001".into())).is_retryable());
        assert!(commit_error(StoreError::Unavailable("reset".into())).is_retryable());
        assert!(matches!(
            commit_error(StoreError::DuplicateActiveAccount {
                owner_id: tally_shared::types::OwnerId::new(),
                currency: CurrencyCode::USD,
            }),
            LedgerError::DuplicateActiveAccount { .. }
        ));
    }

    #[test]
    fn test_debit_error_becomes_insufficient_funds() {
        let account_id = AccountId::new();
        let err = debit_error(
            StoreError::WouldGoNegative {
                account_id,
                balance: Decimal::new(50000, 2),
                delta: Decimal::new(-60000, 2),
            },
            Decimal::new(60000, 2),
        );
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds { account_id: id, balance, requested }
                if id == account_id
                    && balance == Decimal::new(50000, 2)
                    && requested == Decimal::new(60000, 2)
        ));
    }

    #[test]
    fn test_only_request_rejections_are_recorded() {
        assert!(is_recordable(&LedgerError::AccountFrozen(AccountId::new())));
        assert!(!is_recordable(&LedgerError::ConcurrencyConflict(String::new())));
        assert!(!is_recordable(&LedgerError::AccountNotFound(AccountId::new())));
    }
}
