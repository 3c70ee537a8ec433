//! Ledger invariant checks.
//!
//! Pure functions, no I/O. The engine runs them on row snapshots taken under
//! the row lock, so a passing check holds until commit.

use rust_decimal::Decimal;
use tally_shared::types::{AMOUNT_SCALE, CurrencyCode};

pub use tally_shared::types::MAX_AMOUNT;

use super::account::Account;
use super::error::LedgerError;
use super::state::TransferStatus;
use super::transfer::Transfer;

/// Checks precision and range of an amount of either sign.
fn validate_representable(amount: Decimal) -> Result<(), LedgerError> {
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(LedgerError::AmountPrecision {
            amount,
            max_scale: AMOUNT_SCALE,
        });
    }
    if amount.abs() > MAX_AMOUNT {
        return Err(LedgerError::AmountOutOfRange(amount));
    }
    Ok(())
}

/// Validates a transfer amount: strictly positive, at most four decimal
/// places, within the storable range.
///
/// # Errors
///
/// `NonPositiveAmount`, `AmountPrecision` or `AmountOutOfRange`.
pub fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::NonPositiveAmount(amount));
    }
    validate_representable(amount)
}

/// Validates a transfer between two locked account snapshots.
///
/// Checks run in this order: currency, distinct accounts, amount, then
/// frozen or inactive accounts.
///
/// # Errors
///
/// `CurrencyMismatch`, `SameAccount`, amount errors, or `AccountFrozen`.
pub fn validate_transfer_request(
    from: &Account,
    to: &Account,
    amount: Decimal,
    currency: CurrencyCode,
) -> Result<(), LedgerError> {
    for account in [from, to] {
        if account.currency != currency {
            return Err(LedgerError::CurrencyMismatch {
                account_id: account.id,
                expected: account.currency,
                actual: currency,
            });
        }
    }

    if from.id == to.id {
        return Err(LedgerError::SameAccount(from.id));
    }

    validate_amount(amount)?;

    for account in [from, to] {
        if !account.accepts_transfers() {
            return Err(LedgerError::AccountFrozen(account.id));
        }
    }

    Ok(())
}

/// Validates that a transfer may be reversed.
///
/// # Errors
///
/// `AlreadyReversed` for reversed transfers, `NotReversible` for anything
/// else that is not completed.
pub fn validate_reversal(transfer: &Transfer) -> Result<(), LedgerError> {
    match transfer.status {
        TransferStatus::Completed => Ok(()),
        TransferStatus::Reversed => Err(LedgerError::AlreadyReversed(transfer.id)),
        status @ (TransferStatus::Pending | TransferStatus::Failed) => {
            Err(LedgerError::NotReversible {
                transfer_id: transfer.id,
                status,
            })
        }
    }
}

/// Validates a signed adjustment amount.
///
/// # Errors
///
/// `ZeroAdjustment`, `AmountPrecision` or `AmountOutOfRange`.
pub fn validate_adjustment(amount: Decimal) -> Result<(), LedgerError> {
    if amount.is_zero() {
        return Err(LedgerError::ZeroAdjustment);
    }
    validate_representable(amount)
}

/// Returns the trimmed reason.
///
/// # Errors
///
/// `ReasonRequired` if the reason is blank.
pub fn validate_reason(reason: &str) -> Result<&str, LedgerError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::ReasonRequired);
    }
    Ok(trimmed)
}
