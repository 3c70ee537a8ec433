//! Audit records for administrative balance adjustments.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{AccountId, AdjustmentId};

/// Immutable record written in the same transaction as an `AdjustBalance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAdjustment {
    /// Adjustment identifier.
    pub id: AdjustmentId,
    /// Adjusted account.
    pub account_id: AccountId,
    /// Signed amount applied to the balance.
    pub amount: Decimal,
    /// Operator-supplied justification.
    pub reason: String,
    /// Balance right after the adjustment committed.
    pub balance_after: Decimal,
    /// When the adjustment was made.
    pub created_at: DateTime<Utc>,
}
