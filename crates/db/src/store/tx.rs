//! One ledger transaction over a PostgreSQL connection.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, DatabaseTransaction, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    QuerySelect,
};
use tally_core::ledger::{Account, BalanceAdjustment, LedgerTx, StoreError, Transfer, now};
use tally_shared::types::{AccountId, TransferId};
use tracing::debug;

use super::error::{ACTIVE_ACCOUNT_INDEX, PgFailure, classify, into_store_error};
use crate::entities::{accounts, balance_adjustments, transfers};

/// Transaction over a [`PgLedgerStore`](super::PgLedgerStore).
///
/// Rows read with `SELECT ... FOR UPDATE` are remembered so that writes can
/// be refused for rows this transaction never locked. Dropping the value
/// without committing rolls the database transaction back.
pub struct PgLedgerTx {
    txn: DatabaseTransaction,
    accounts: HashMap<AccountId, Account>,
    transfers: HashSet<TransferId>,
}

impl PgLedgerTx {
    pub(crate) fn new(txn: DatabaseTransaction) -> Self {
        Self {
            txn,
            accounts: HashMap::new(),
            transfers: HashSet::new(),
        }
    }

    fn locked_account(&self, id: AccountId) -> Result<&Account, StoreError> {
        self.accounts.get(&id).ok_or(StoreError::RowNotLocked {
            table: "accounts",
            id: id.into_inner(),
        })
    }

    /// Stores the row returned by an `UPDATE ... RETURNING` in the lock cache.
    fn remember(
        &mut self,
        id: AccountId,
        rows: Vec<accounts::Model>,
    ) -> Result<Account, StoreError> {
        let model = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Corrupt(format!("locked account {id} disappeared")))?;
        let account = Account::try_from(model)?;
        self.accounts.insert(id, account.clone());
        Ok(account)
    }
}

/// Maps a failed balance update using the balance seen under the lock.
fn balance_error(err: DbErr, account: &Account, delta: Decimal) -> StoreError {
    match classify(&err) {
        PgFailure::NumericOutOfRange => StoreError::BalanceOverflow(account.id),
        PgFailure::CheckViolation(_) => StoreError::WouldGoNegative {
            account_id: account.id,
            balance: account.balance,
            delta,
        },
        _ => into_store_error(err),
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, StoreError> {
        let model = accounts::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(into_store_error)?
            .ok_or(StoreError::AccountNotFound(id))?;
        let account = Account::try_from(model)?;
        self.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn apply_delta(&mut self, id: AccountId, delta: Decimal) -> Result<Account, StoreError> {
        let current = self.locked_account(id)?;
        // Checked against the locked snapshot first: a constraint error would
        // abort the whole database transaction.
        current.balance_after(delta)?;

        let rows = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::Balance,
                Expr::col(accounts::Column::Balance).add(delta),
            )
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now()))
            .filter(accounts::Column::Id.eq(id.into_inner()))
            .exec_with_returning(&self.txn)
            .await
            .map_err(|err| balance_error(err, current, delta))?;

        self.remember(id, rows)
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), StoreError> {
        accounts::Entity::insert(accounts::ActiveModel::from(account))
            .exec_without_returning(&self.txn)
            .await
            .map_err(|err| match classify(&err) {
                PgFailure::UniqueViolation(Some(constraint))
                    if constraint == ACTIVE_ACCOUNT_INDEX =>
                {
                    StoreError::DuplicateActiveAccount {
                        owner_id: account.owner_id,
                        currency: account.currency,
                    }
                }
                _ => into_store_error(err),
            })?;

        // A freshly inserted row is invisible to others until commit.
        self.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update_account_flags(
        &mut self,
        id: AccountId,
        is_active: bool,
        is_frozen: bool,
    ) -> Result<Account, StoreError> {
        let current = self.locked_account(id)?;
        let (owner_id, currency) = (current.owner_id, current.currency);

        let rows = accounts::Entity::update_many()
            .col_expr(accounts::Column::IsActive, Expr::value(is_active))
            .col_expr(accounts::Column::IsFrozen, Expr::value(is_frozen))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now()))
            .filter(accounts::Column::Id.eq(id.into_inner()))
            .exec_with_returning(&self.txn)
            .await
            .map_err(|err| match classify(&err) {
                PgFailure::UniqueViolation(Some(constraint))
                    if constraint == ACTIVE_ACCOUNT_INDEX =>
                {
                    StoreError::DuplicateActiveAccount { owner_id, currency }
                }
                _ => into_store_error(err),
            })?;

        self.remember(id, rows)
    }

    async fn delete_account(&mut self, id: AccountId) -> Result<(), StoreError> {
        self.locked_account(id)?;

        let result = accounts::Entity::delete_by_id(id.into_inner())
            .exec(&self.txn)
            .await
            .map_err(into_store_error)?;
        if result.rows_affected == 0 {
            return Err(StoreError::AccountNotFound(id));
        }

        self.accounts.remove(&id);
        Ok(())
    }

    async fn count_account_references(&mut self, id: AccountId) -> Result<u64, StoreError> {
        let uuid = id.into_inner();
        let transfers = transfers::Entity::find()
            .filter(
                Condition::any()
                    .add(transfers::Column::FromAccountId.eq(uuid))
                    .add(transfers::Column::ToAccountId.eq(uuid)),
            )
            .count(&self.txn)
            .await
            .map_err(into_store_error)?;
        let adjustments = balance_adjustments::Entity::find()
            .filter(balance_adjustments::Column::AccountId.eq(uuid))
            .count(&self.txn)
            .await
            .map_err(into_store_error)?;

        Ok(transfers + adjustments)
    }

    async fn get_transfer_for_update(&mut self, id: TransferId) -> Result<Transfer, StoreError> {
        let model = transfers::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(into_store_error)?
            .ok_or(StoreError::TransferNotFound(id))?;
        self.transfers.insert(id);
        Transfer::try_from(model)
    }

    async fn insert_transfer(&mut self, transfer: &Transfer) -> Result<(), StoreError> {
        transfers::Entity::insert(transfers::ActiveModel::from(transfer))
            .exec_without_returning(&self.txn)
            .await
            .map_err(|err| match classify(&err) {
                PgFailure::ForeignKeyViolation(_) => {
                    let missing = if self.accounts.contains_key(&transfer.from_account_id) {
                        transfer.to_account_id
                    } else {
                        transfer.from_account_id
                    };
                    StoreError::AccountNotFound(missing)
                }
                _ => into_store_error(err),
            })?;

        self.transfers.insert(transfer.id);
        Ok(())
    }

    async fn update_transfer(&mut self, transfer: &Transfer) -> Result<(), StoreError> {
        if !self.transfers.contains(&transfer.id) {
            return Err(StoreError::RowNotLocked {
                table: "transfers",
                id: transfer.id.into_inner(),
            });
        }

        let result = transfers::Entity::update_many()
            .col_expr(transfers::Column::Status, Expr::value(transfer.status.as_str()))
            .col_expr(transfers::Column::ReversedAt, Expr::value(transfer.reversed_at))
            .col_expr(
                transfers::Column::ReversalReason,
                Expr::value(transfer.reversal_reason.clone()),
            )
            .col_expr(
                transfers::Column::FailureReason,
                Expr::value(transfer.failure_reason.clone()),
            )
            .filter(transfers::Column::Id.eq(transfer.id.into_inner()))
            .exec(&self.txn)
            .await
            .map_err(into_store_error)?;

        if result.rows_affected == 0 {
            return Err(StoreError::TransferNotFound(transfer.id));
        }
        Ok(())
    }

    async fn insert_adjustment(
        &mut self,
        adjustment: &BalanceAdjustment,
    ) -> Result<(), StoreError> {
        balance_adjustments::Entity::insert(balance_adjustments::ActiveModel::from(adjustment))
            .exec_without_returning(&self.txn)
            .await
            .map_err(|err| match classify(&err) {
                PgFailure::ForeignKeyViolation(_) => {
                    StoreError::AccountNotFound(adjustment.account_id)
                }
                _ => into_store_error(err),
            })?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.txn.commit().await.map_err(into_store_error)?;
        debug!(
            accounts = self.accounts.len(),
            transfers = self.transfers.len(),
            "Ledger transaction committed"
        );
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.txn.rollback().await.map_err(into_store_error)
    }
}
