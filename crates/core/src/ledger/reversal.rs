//! Reversal coordinator.
//!
//! A reversal is the compensating movement of a completed transfer: the
//! destination is debited and the source credited by the original amount,
//! and the transfer moves to `reversed`, all in one transaction.
//!
//! Lock order is the same as for fresh transfers: both accounts ascending by
//! id, then the transfer row. The transfer is re-validated after its row lock
//! is held, so two concurrent reversals cannot both succeed.

use std::time::Duration;

use tally_shared::types::TransferId;
use tracing::{info, warn};

use super::engine::{finish, lock_order, with_deadline};
use super::error::LedgerError;
use super::now;
use super::settings::LedgerSettings;
use super::store::{LedgerStore, LedgerTx, StoreError};
use super::transfer::Transfer;
use super::validation::{validate_reason, validate_reversal};

/// Input for reversing a transfer.
#[derive(Debug, Clone)]
pub struct ReverseTransferInput {
    /// Transfer to reverse.
    pub transfer_id: TransferId,
    /// Mandatory justification.
    pub reason: String,
    /// Overrides the configured deadline.
    pub deadline: Option<Duration>,
}

/// Drives transfers from `completed` to `reversed`.
#[derive(Debug, Clone)]
pub struct ReversalCoordinator<S> {
    store: S,
    settings: LedgerSettings,
}

impl<S: LedgerStore> ReversalCoordinator<S> {
    /// Creates a new coordinator.
    #[must_use]
    pub const fn new(store: S, settings: LedgerSettings) -> Self {
        Self { store, settings }
    }

    /// Reverses a completed transfer.
    ///
    /// A second call for the same transfer fails fast with `AlreadyReversed`
    /// without locking anything. If the destination no longer holds the
    /// amount, the reversal fails with `InsufficientFundsForReversal` and the
    /// transfer stays `completed`.
    ///
    /// # Errors
    ///
    /// `ReasonRequired`, `TransferNotFound`, `AlreadyReversed`,
    /// `NotReversible`, `InsufficientFundsForReversal`, or a retryable error.
    pub async fn reverse_transfer(
        &self,
        input: ReverseTransferInput,
    ) -> Result<Transfer, LedgerError> {
        let reason = validate_reason(&input.reason)?;

        let snapshot = self.store.get_transfer(input.transfer_id).await?;
        validate_reversal(&snapshot)?;

        let deadline = input.deadline.unwrap_or(self.settings.transaction_timeout);
        let result = with_deadline(deadline, async {
            let mut tx = self.store.begin(self.settings.tx_options()).await?;
            let outcome = Self::reverse_in_tx(&mut tx, &snapshot, reason).await;
            finish(tx, outcome).await
        })
        .await;

        match &result {
            Ok(transfer) => info!(
                transfer_id = %transfer.id,
                amount = %transfer.amount,
                reason = %reason,
                "Transfer reversed"
            ),
            Err(LedgerError::InsufficientFundsForReversal { account_id, .. }) => warn!(
                transfer_id = %snapshot.id,
                account_id = %account_id,
                "Reversal blocked: funds already moved on, needs manual resolution"
            ),
            Err(_) => {}
        }
        result
    }

    async fn reverse_in_tx(
        tx: &mut S::Tx,
        snapshot: &Transfer,
        reason: &str,
    ) -> Result<Transfer, LedgerError> {
        for account_id in lock_order(snapshot.from_account_id, snapshot.to_account_id) {
            tx.get_account_for_update(account_id).await?;
        }

        let mut transfer = tx.get_transfer_for_update(snapshot.id).await?;
        validate_reversal(&transfer)?;

        tx.apply_delta(transfer.to_account_id, -transfer.amount)
            .await
            .map_err(|err| match err {
                StoreError::WouldGoNegative {
                    account_id,
                    balance,
                    ..
                } => LedgerError::InsufficientFundsForReversal {
                    transfer_id: transfer.id,
                    account_id,
                    balance,
                    required: transfer.amount,
                },
                other => other.into(),
            })?;
        tx.apply_delta(transfer.from_account_id, transfer.amount)
            .await?;

        transfer.reverse(reason.to_string(), now())?;
        tx.update_transfer(&transfer).await?;
        Ok(transfer)
    }
}
