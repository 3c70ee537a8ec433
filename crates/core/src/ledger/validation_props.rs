//! Property-based tests for the ledger invariant checks.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::types::{CurrencyCode, OwnerId};

use super::account::Account;
use super::error::LedgerError;
use super::validation::{
    validate_adjustment, validate_amount, validate_transfer_request, MAX_AMOUNT,
};

/// Strategy to generate a valid positive amount (0.0001 to 10,000,000.0000).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000_000i64).prop_map(|units| Decimal::new(units, 4))
}

/// Strategy to generate a zero or negative amount.
fn non_positive_amount() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_000_000i64).prop_map(|units| Decimal::new(-units, 4))
}

/// Strategy to generate an amount with 5 to 10 significant decimal places.
fn over_precise_amount() -> impl Strategy<Value = Decimal> {
    (5u32..=10, 1i64..1_000_000i64).prop_map(|(scale, units)| {
        // Last digit non-zero keeps the scale after normalization.
        Decimal::new(units * 10 + 1, scale)
    })
}

fn currency_strategy() -> impl Strategy<Value = CurrencyCode> {
    prop_oneof![
        Just(CurrencyCode::USD),
        Just(CurrencyCode::EUR),
        Just(CurrencyCode::new("GBP").unwrap()),
    ]
}

fn account(currency: CurrencyCode) -> Account {
    Account::open(OwnerId::new(), currency, Utc::now())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every positive four-place amount is accepted.
    #[test]
    fn prop_positive_amount_accepted(amount in positive_amount()) {
        prop_assert!(validate_amount(amount).is_ok());
    }

    /// Zero and negative amounts are always rejected.
    #[test]
    fn prop_non_positive_amount_rejected(amount in non_positive_amount()) {
        let rejected = matches!(validate_amount(amount), Err(LedgerError::NonPositiveAmount(_)));
        prop_assert!(rejected);
    }

    /// Amounts the store would have to round are rejected, in both signs.
    #[test]
    fn prop_over_precise_amount_rejected(amount in over_precise_amount()) {
        let rejected = matches!(validate_amount(amount), Err(LedgerError::AmountPrecision { .. }));
        prop_assert!(rejected);
        let rejected = matches!(
            validate_adjustment(-amount),
            Err(LedgerError::AmountPrecision { .. })
        );
        prop_assert!(rejected);
    }

    /// Anything past the column range is rejected.
    #[test]
    fn prop_out_of_range_rejected(extra in positive_amount()) {
        let rejected = matches!(
            validate_amount(MAX_AMOUNT + extra),
            Err(LedgerError::AmountOutOfRange(_))
        );
        prop_assert!(rejected);
    }

    /// A request passes only when its currency matches both accounts.
    #[test]
    fn prop_currency_must_match_both_accounts(
        from_currency in currency_strategy(),
        to_currency in currency_strategy(),
        requested in currency_strategy(),
        amount in positive_amount(),
    ) {
        let from = account(from_currency);
        let to = account(to_currency);
        let result = validate_transfer_request(&from, &to, amount, requested);
        if from_currency == requested && to_currency == requested {
            prop_assert!(result.is_ok());
        } else {
            let mismatch = matches!(result, Err(LedgerError::CurrencyMismatch { .. }));
            prop_assert!(mismatch);
        }
    }

    /// Non-zero adjustments of either sign are accepted.
    #[test]
    fn prop_signed_adjustment_accepted(amount in positive_amount(), negative in any::<bool>()) {
        let signed = if negative { -amount } else { amount };
        prop_assert!(validate_adjustment(signed).is_ok());
    }
}
