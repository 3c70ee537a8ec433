//! PostgreSQL implementation of the ledger store.
//!
//! Each [`PgLedgerTx`] is one database transaction started with the
//! configured isolation level and `lock_timeout`. Locking reads use
//! `SELECT ... FOR UPDATE`; balance changes are applied in place with
//! `UPDATE ... RETURNING`.

mod error;
mod mapping;
mod tx;

pub use error::{PgFailure, classify, classify_code, into_store_error};
pub use tx::PgLedgerTx;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use tally_core::ledger::{
    Account, BalanceAdjustment, IsolationLevel, LedgerStore, StoreError, Transfer, TxOptions,
};
use tally_shared::types::{AccountId, CurrencyCode, OwnerId, PageRequest, TransferId};

use crate::entities::{accounts, balance_adjustments, transfers};

const fn isolation(level: IsolationLevel) -> sea_orm::IsolationLevel {
    match level {
        IsolationLevel::ReadCommitted => sea_orm::IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead => sea_orm::IsolationLevel::RepeatableRead,
        IsolationLevel::Serializable => sea_orm::IsolationLevel::Serializable,
    }
}

/// Ledger store backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    db: DatabaseConnection,
}

impl PgLedgerStore {
    /// Creates a new store over an established connection pool.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Returns the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgLedgerTx;

    async fn begin(&self, options: TxOptions) -> Result<PgLedgerTx, StoreError> {
        let txn = self
            .db
            .begin_with_config(Some(isolation(options.isolation)), None)
            .await
            .map_err(into_store_error)?;

        if let Some(limit) = options.lock_timeout {
            let millis = limit.as_millis().max(1);
            txn.execute_unprepared(&format!("SET LOCAL lock_timeout = '{millis}ms'"))
                .await
                .map_err(into_store_error)?;
        }

        Ok(PgLedgerTx::new(txn))
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError> {
        accounts::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(into_store_error)?
            .ok_or(StoreError::AccountNotFound(id))?
            .try_into()
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, StoreError> {
        transfers::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(into_store_error)?
            .ok_or(StoreError::TransferNotFound(id))?
            .try_into()
    }

    async fn list_accounts_for_owner(
        &self,
        owner_id: OwnerId,
    ) -> Result<Vec<Account>, StoreError> {
        accounts::Entity::find()
            .filter(accounts::Column::OwnerId.eq(owner_id.into_inner()))
            .order_by_asc(accounts::Column::CreatedAt)
            .order_by_asc(accounts::Column::Id)
            .all(&self.db)
            .await
            .map_err(into_store_error)?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    async fn list_transfers_for_account(
        &self,
        account_id: AccountId,
        page: &PageRequest,
    ) -> Result<(Vec<Transfer>, u64), StoreError> {
        let uuid = account_id.into_inner();
        let query = transfers::Entity::find().filter(
            Condition::any()
                .add(transfers::Column::FromAccountId.eq(uuid))
                .add(transfers::Column::ToAccountId.eq(uuid)),
        );

        let total = query
            .clone()
            .count(&self.db)
            .await
            .map_err(into_store_error)?;

        let transfers = query
            .order_by_desc(transfers::Column::CreatedAt)
            .order_by_desc(transfers::Column::Id)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(into_store_error)?
            .into_iter()
            .map(Transfer::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((transfers, total))
    }

    async fn total_balance(&self, currency: CurrencyCode) -> Result<Decimal, StoreError> {
        let total: Option<Option<Decimal>> = accounts::Entity::find()
            .select_only()
            .column_as(Expr::col(accounts::Column::Balance).sum(), "total")
            .filter(accounts::Column::Currency.eq(currency.as_str()))
            .into_tuple()
            .one(&self.db)
            .await
            .map_err(into_store_error)?;

        Ok(total.flatten().unwrap_or(Decimal::ZERO))
    }

    async fn list_adjustments(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<BalanceAdjustment>, StoreError> {
        Ok(balance_adjustments::Entity::find()
            .filter(balance_adjustments::Column::AccountId.eq(account_id.into_inner()))
            .order_by_asc(balance_adjustments::Column::CreatedAt)
            .order_by_asc(balance_adjustments::Column::Id)
            .all(&self.db)
            .await
            .map_err(into_store_error)?
            .into_iter()
            .map(BalanceAdjustment::from)
            .collect())
    }
}
