//! Transfer records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{AccountId, CurrencyCode, TransferId};

use super::error::LedgerError;
use super::state::TransferStatus;

/// A movement of `amount` from one account to another in a single currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Transfer identifier.
    pub id: TransferId,
    /// Debited account.
    pub from_account_id: AccountId,
    /// Credited account.
    pub to_account_id: AccountId,
    /// Strictly positive amount.
    pub amount: Decimal,
    /// Currency shared by both accounts.
    pub currency: CurrencyCode,
    /// Free-form description supplied by the caller.
    pub description: String,
    /// Lifecycle status.
    pub status: TransferStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Set when the transfer is reversed.
    pub reversed_at: Option<DateTime<Utc>>,
    /// Set when the transfer is reversed.
    pub reversal_reason: Option<String>,
    /// Set when a rejected transfer is recorded as failed.
    pub failure_reason: Option<String>,
}

impl Transfer {
    /// Builds a new transfer in the transient `Pending` state.
    #[must_use]
    pub fn pending(
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Decimal,
        currency: CurrencyCode,
        description: String,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransferId::new(),
            from_account_id,
            to_account_id,
            amount,
            currency,
            description,
            status: TransferStatus::Pending,
            created_at: at,
            reversed_at: None,
            reversal_reason: None,
            failure_reason: None,
        }
    }

    /// Marks the transfer completed.
    pub fn complete(&mut self) -> Result<(), LedgerError> {
        self.status = self.status.transition(TransferStatus::Completed)?;
        Ok(())
    }

    /// Marks the transfer failed, keeping the reason for the audit trail.
    pub fn fail(&mut self, reason: String) -> Result<(), LedgerError> {
        self.status = self.status.transition(TransferStatus::Failed)?;
        self.failure_reason = Some(reason);
        Ok(())
    }

    /// Marks the transfer reversed.
    pub fn reverse(&mut self, reason: String, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.status = self.status.transition(TransferStatus::Reversed)?;
        self.reversed_at = Some(at);
        self.reversal_reason = Some(reason);
        Ok(())
    }

    /// Returns true if `account_id` is either side of the transfer.
    #[must_use]
    pub fn involves(&self, account_id: AccountId) -> bool {
        self.from_account_id == account_id || self.to_account_id == account_id
    }
}
