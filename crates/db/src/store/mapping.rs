//! Conversions between `SeaORM` models and ledger entities.

use chrono::Utc;
use sea_orm::Set;
use tally_core::ledger::{Account, BalanceAdjustment, StoreError, Transfer, TransferStatus};
use tally_shared::types::{AccountId, AdjustmentId, CurrencyCode, OwnerId, TransferId};

use crate::entities::{accounts, balance_adjustments, transfers};

fn currency(raw: &str) -> Result<CurrencyCode, StoreError> {
    CurrencyCode::new(raw).map_err(|_| StoreError::Corrupt(format!("invalid currency '{raw}'")))
}

fn status(raw: &str) -> Result<TransferStatus, StoreError> {
    TransferStatus::parse(raw)
        .ok_or_else(|| StoreError::Corrupt(format!("invalid transfer status '{raw}'")))
}

impl TryFrom<accounts::Model> for Account {
    type Error = StoreError;

    fn try_from(model: accounts::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: AccountId::from_uuid(model.id),
            owner_id: OwnerId::from_uuid(model.owner_id),
            currency: currency(&model.currency)?,
            balance: model.balance,
            is_active: model.is_active,
            is_frozen: model.is_frozen,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        })
    }
}

impl From<&Account> for accounts::ActiveModel {
    fn from(account: &Account) -> Self {
        Self {
            id: Set(account.id.into_inner()),
            owner_id: Set(account.owner_id.into_inner()),
            currency: Set(account.currency.as_str().to_string()),
            balance: Set(account.balance),
            is_active: Set(account.is_active),
            is_frozen: Set(account.is_frozen),
            created_at: Set(account.created_at.into()),
            updated_at: Set(account.updated_at.into()),
        }
    }
}

impl TryFrom<transfers::Model> for Transfer {
    type Error = StoreError;

    fn try_from(model: transfers::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TransferId::from_uuid(model.id),
            from_account_id: AccountId::from_uuid(model.from_account_id),
            to_account_id: AccountId::from_uuid(model.to_account_id),
            amount: model.amount,
            currency: currency(&model.currency)?,
            description: model.description,
            status: status(&model.status)?,
            created_at: model.created_at.with_timezone(&Utc),
            reversed_at: model.reversed_at.map(|at| at.with_timezone(&Utc)),
            reversal_reason: model.reversal_reason,
            failure_reason: model.failure_reason,
        })
    }
}

impl From<&Transfer> for transfers::ActiveModel {
    fn from(transfer: &Transfer) -> Self {
        Self {
            id: Set(transfer.id.into_inner()),
            from_account_id: Set(transfer.from_account_id.into_inner()),
            to_account_id: Set(transfer.to_account_id.into_inner()),
            amount: Set(transfer.amount),
            currency: Set(transfer.currency.as_str().to_string()),
            description: Set(transfer.description.clone()),
            status: Set(transfer.status.as_str().to_string()),
            created_at: Set(transfer.created_at.into()),
            reversed_at: Set(transfer.reversed_at.map(Into::into)),
            reversal_reason: Set(transfer.reversal_reason.clone()),
            failure_reason: Set(transfer.failure_reason.clone()),
        }
    }
}

impl From<balance_adjustments::Model> for BalanceAdjustment {
    fn from(model: balance_adjustments::Model) -> Self {
        Self {
            id: AdjustmentId::from_uuid(model.id),
            account_id: AccountId::from_uuid(model.account_id),
            amount: model.amount,
            reason: model.reason,
            balance_after: model.balance_after,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<&BalanceAdjustment> for balance_adjustments::ActiveModel {
    fn from(adjustment: &BalanceAdjustment) -> Self {
        Self {
            id: Set(adjustment.id.into_inner()),
            account_id: Set(adjustment.account_id.into_inner()),
            amount: Set(adjustment.amount),
            reason: Set(adjustment.reason.clone()),
            balance_after: Set(adjustment.balance_after),
            created_at: Set(adjustment.created_at.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use rust_decimal_macros::dec;
    use sea_orm::ActiveValue;
    use uuid::Uuid;

    fn account_model() -> accounts::Model {
        let at = Utc::now().with_timezone(&FixedOffset::east_opt(3600).unwrap());
        accounts::Model {
            id: Uuid::now_v7(),
            owner_id: Uuid::now_v7(),
            currency: "USD".to_string(),
            balance: dec!(200.0000),
            is_active: true,
            is_frozen: false,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_account_from_model() {
        let model = account_model();
        let account = Account::try_from(model.clone()).unwrap();
        assert_eq!(account.id.into_inner(), model.id);
        assert_eq!(account.currency, CurrencyCode::USD);
        assert_eq!(account.balance, dec!(200));
        assert_eq!(account.created_at, model.created_at);
    }

    #[test]
    fn test_account_with_bad_currency_is_corrupt() {
        let mut model = account_model();
        model.currency = "US".to_string();
        assert!(matches!(
            Account::try_from(model),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_transfer_with_unknown_status_is_corrupt() {
        let at = Utc::now().fixed_offset();
        let model = transfers::Model {
            id: Uuid::now_v7(),
            from_account_id: Uuid::now_v7(),
            to_account_id: Uuid::now_v7(),
            amount: dec!(1),
            currency: "EUR".to_string(),
            description: String::new(),
            status: "settled".to_string(),
            created_at: at,
            reversed_at: None,
            reversal_reason: None,
            failure_reason: None,
        };
        assert!(matches!(
            Transfer::try_from(model),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_transfer_active_model() {
        let mut transfer = Transfer::pending(
            AccountId::new(),
            AccountId::new(),
            dec!(12.34),
            CurrencyCode::EUR,
            "rent".to_string(),
            Utc::now(),
        );
        transfer.complete().unwrap();

        let active = transfers::ActiveModel::from(&transfer);
        assert_eq!(active.status, ActiveValue::Set("completed".to_string()));
        assert_eq!(active.currency, ActiveValue::Set("EUR".to_string()));
        assert_eq!(active.reversed_at, ActiveValue::Set(None));
    }
}
