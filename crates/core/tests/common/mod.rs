//! Shared fixtures for ledger integration tests.

#![allow(dead_code)]

use std::time::Duration;

use rust_decimal::Decimal;
use tally_core::ledger::{
    Account, AdjustBalanceInput, CreateTransferInput, LedgerService, LedgerSettings,
    MemoryLedgerStore, OpenAccountInput, RetryPolicy, ReverseTransferInput,
};
use tally_shared::types::{AccountId, CurrencyCode, OwnerId, TransferId};

/// Settings with a fast retry policy.
pub fn settings() -> LedgerSettings {
    LedgerSettings {
        retry: RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        ..LedgerSettings::default()
    }
}

/// Fresh, isolated ledger.
pub fn ledger() -> LedgerService<MemoryLedgerStore> {
    ledger_with(settings())
}

/// Fresh, isolated ledger with custom settings.
pub fn ledger_with(settings: LedgerSettings) -> LedgerService<MemoryLedgerStore> {
    LedgerService::new(MemoryLedgerStore::new(), settings)
}

/// Opens an account for a new owner and funds it through an adjustment.
pub async fn funded_account(
    ledger: &LedgerService<MemoryLedgerStore>,
    currency: CurrencyCode,
    balance: Decimal,
) -> Account {
    let account = ledger
        .open_account(OpenAccountInput {
            owner_id: OwnerId::new(),
            currency,
        })
        .await
        .unwrap();
    if balance.is_zero() {
        return account;
    }
    ledger
        .adjust_balance(AdjustBalanceInput {
            account_id: account.id,
            amount: balance,
            reason: "initial funding".to_string(),
            deadline: None,
        })
        .await
        .unwrap()
}

/// Transfer request with no deadline override.
pub fn transfer(
    from: AccountId,
    to: AccountId,
    amount: Decimal,
    currency: CurrencyCode,
) -> CreateTransferInput {
    CreateTransferInput {
        from_account_id: from,
        to_account_id: to,
        amount,
        currency,
        description: "test".to_string(),
        deadline: None,
    }
}

/// Reversal request with no deadline override.
pub fn reversal(transfer_id: TransferId, reason: &str) -> ReverseTransferInput {
    ReverseTransferInput {
        transfer_id,
        reason: reason.to_string(),
        deadline: None,
    }
}

/// Committed balance of an account.
pub async fn balance(ledger: &LedgerService<MemoryLedgerStore>, id: AccountId) -> Decimal {
    ledger.get_account(id).await.unwrap().balance
}
