//! Currency accounts and the balance arithmetic applied under a row lock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{AccountId, CurrencyCode, MAX_AMOUNT, OwnerId};

use super::store::StoreError;

/// A single-currency account holding an exact decimal balance.
///
/// `id`, `owner_id` and `currency` never change after the account is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier.
    pub id: AccountId,
    /// Owning user.
    pub owner_id: OwnerId,
    /// Currency every movement on this account must use.
    pub currency: CurrencyCode,
    /// Current balance; never negative once committed.
    pub balance: Decimal,
    /// Inactive accounts cannot take part in transfers.
    pub is_active: bool,
    /// Frozen accounts cannot take part in transfers.
    pub is_frozen: bool,
    /// When the account was opened.
    pub created_at: DateTime<Utc>,
    /// Last balance or flag change.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Opens a new, empty, active account.
    #[must_use]
    pub fn open(owner_id: OwnerId, currency: CurrencyCode, at: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            owner_id,
            currency,
            balance: Decimal::ZERO,
            is_active: true,
            is_frozen: false,
            created_at: at,
            updated_at: at,
        }
    }

    /// Returns true if transfers may debit or credit this account.
    #[must_use]
    pub const fn accepts_transfers(&self) -> bool {
        self.is_active && !self.is_frozen
    }

    /// Computes the balance after applying `delta`.
    ///
    /// # Errors
    ///
    /// `WouldGoNegative` if the result is below zero, `BalanceOverflow` if it
    /// exceeds [`MAX_AMOUNT`], the ceiling of the balance column.
    pub fn balance_after(&self, delta: Decimal) -> Result<Decimal, StoreError> {
        let next = self
            .balance
            .checked_add(delta)
            .filter(|next| *next <= MAX_AMOUNT)
            .ok_or(StoreError::BalanceOverflow(self.id))?;
        if next < Decimal::ZERO {
            return Err(StoreError::WouldGoNegative {
                account_id: self.id,
                balance: self.balance,
                delta,
            });
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account_with(balance: Decimal) -> Account {
        let mut account = Account::open(OwnerId::new(), CurrencyCode::USD, Utc::now());
        account.balance = balance;
        account
    }

    #[test]
    fn test_open_account_is_empty_and_usable() {
        let account = Account::open(OwnerId::new(), CurrencyCode::EUR, Utc::now());
        assert_eq!(account.balance, Decimal::ZERO);
        assert!(account.accepts_transfers());
        assert_eq!(account.created_at, account.updated_at);
    }

    #[test]
    fn test_frozen_or_inactive_rejects_transfers() {
        let mut account = account_with(dec!(10));
        account.is_frozen = true;
        assert!(!account.accepts_transfers());

        account.is_frozen = false;
        account.is_active = false;
        assert!(!account.accepts_transfers());
    }

    #[test]
    fn test_balance_after_exact_to_zero() {
        let account = account_with(dec!(200.00));
        assert_eq!(account.balance_after(dec!(-200.00)).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_balance_after_rejects_negative() {
        let account = account_with(dec!(199.99));
        let err = account.balance_after(dec!(-200.00)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::WouldGoNegative { balance, delta, .. }
                if balance == dec!(199.99) && delta == dec!(-200.00)
        ));
    }

    #[test]
    fn test_balance_after_overflow() {
        let account = account_with(Decimal::MAX);
        assert!(matches!(
            account.balance_after(dec!(1)),
            Err(StoreError::BalanceOverflow(_))
        ));
    }

    #[test]
    fn test_balance_after_stops_at_column_ceiling() {
        let account = account_with(MAX_AMOUNT);
        assert_eq!(account.balance_after(Decimal::ZERO).unwrap(), MAX_AMOUNT);
        assert!(matches!(
            account.balance_after(dec!(0.0001)),
            Err(StoreError::BalanceOverflow(id)) if id == account.id
        ));

        let below = account_with(MAX_AMOUNT - dec!(1));
        assert_eq!(below.balance_after(dec!(1)).unwrap(), MAX_AMOUNT);
    }
}
