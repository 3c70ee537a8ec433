//! Transfer lifecycle state machine.
//!
//! The legal transitions are:
//! - Pending → Completed (debit and credit applied)
//! - Pending → Failed (rejected, no balance touched)
//! - Completed → Reversed (compensating movement applied)
//!
//! `Pending` only exists inside the database transaction that creates the
//! transfer; it is never committed.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::LedgerError;

/// Status of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Created, balances not yet moved.
    Pending,
    /// Both balances moved.
    Completed,
    /// Undone by a compensating movement.
    Reversed,
    /// Rejected without moving any balance.
    Failed,
}

impl TransferStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 4] = [Self::Pending, Self::Completed, Self::Reversed, Self::Failed];

    /// Returns the string representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Reversed => "reversed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "reversed" => Some(Self::Reversed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true if no further transition is ever possible.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Reversed | Self::Failed)
    }

    /// Returns true if `self → next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed | Self::Failed) | (Self::Completed, Self::Reversed)
        )
    }

    /// Performs the transition `self → next`.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` for anything outside the legal set.
    pub fn transition(self, next: Self) -> Result<Self, LedgerError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(LedgerError::InvalidStateTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
