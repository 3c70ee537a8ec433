//! In-memory [`LedgerStore`] with real row locks.
//!
//! Each account and transfer row has its own `tokio::sync::Mutex`; a
//! [`MemoryTx`] holds the owned guard for every row it read for update until
//! it commits or is dropped. Writes are staged inside the transaction and
//! applied in one step on commit, so an abandoned transaction leaves no trace.
//! A row's lock entry is dropped once no transaction holds or awaits it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tally_shared::types::{AccountId, CurrencyCode, OwnerId, PageRequest, TransferId};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use super::account::Account;
use super::adjustment::BalanceAdjustment;
use super::now;
use super::store::{LedgerStore, LedgerTx, StoreError, TxOptions};
use super::transfer::Transfer;

type LockMap<K> = Mutex<HashMap<K, Arc<RowLock<()>>>>;

#[derive(Debug, Default)]
struct Committed {
    accounts: HashMap<AccountId, Account>,
    transfers: HashMap<TransferId, Transfer>,
    adjustments: Vec<BalanceAdjustment>,
}

#[derive(Debug, Default)]
struct Inner {
    committed: Mutex<Committed>,
    account_locks: LockMap<AccountId>,
    transfer_locks: LockMap<TransferId>,
    injected_conflicts: AtomicU32,
}

impl Inner {
    fn committed(&self) -> std::sync::MutexGuard<'_, Committed> {
        self.committed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn row_lock<K: std::hash::Hash + Eq + Copy>(locks: &LockMap<K>, key: K) -> Arc<RowLock<()>> {
    let mut locks = locks.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(key).or_default())
}

/// Removes the entries of `keys` that nobody holds or waits on.
///
/// Every holder or waiter owns a clone of the `Arc`, and clones are only
/// handed out under the map mutex, so a count of one means the entry is idle.
fn prune<K: std::hash::Hash + Eq + Copy>(locks: &LockMap<K>, keys: impl IntoIterator<Item = K>) {
    let mut locks = locks.lock().unwrap_or_else(PoisonError::into_inner);
    for key in keys {
        if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&key);
        }
    }
}

async fn acquire<K: std::hash::Hash + Eq + Copy>(
    locks: &LockMap<K>,
    key: K,
    timeout: Option<Duration>,
    what: impl FnOnce() -> String,
) -> Result<OwnedMutexGuard<()>, StoreError> {
    let lock = row_lock(locks, key);
    let acquired = match timeout {
        Some(limit) => tokio::time::timeout(limit, lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(what())),
        None => Ok(lock.lock_owned().await),
    };
    if acquired.is_err() {
        prune(locks, [key]);
    }
    acquired
}

/// In-memory ledger store for tests and local tooling.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl MemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with `StoreError::Conflict`, as a
    /// serialization failure would.
    pub fn inject_commit_conflicts(&self, count: u32) {
        self.inner.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of injected conflicts not consumed yet.
    #[must_use]
    pub fn pending_injected_conflicts(&self) -> u32 {
        self.inner.injected_conflicts.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn lock_entries(&self) -> (usize, usize) {
        fn len<K>(map: &LockMap<K>) -> usize {
            map.lock().unwrap_or_else(PoisonError::into_inner).len()
        }
        (len(&self.inner.account_locks), len(&self.inner.transfer_locks))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Tx = MemoryTx;

    async fn begin(&self, options: TxOptions) -> Result<MemoryTx, StoreError> {
        Ok(MemoryTx {
            inner: Arc::clone(&self.inner),
            lock_timeout: options.lock_timeout,
            account_guards: HashMap::new(),
            transfer_guards: HashMap::new(),
            accounts: HashMap::new(),
            account_writes: HashMap::new(),
            transfer_writes: HashMap::new(),
            adjustment_writes: Vec::new(),
        })
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError> {
        self.inner
            .committed()
            .accounts
            .get(&id)
            .cloned()
            .ok_or(StoreError::AccountNotFound(id))
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, StoreError> {
        self.inner
            .committed()
            .transfers
            .get(&id)
            .cloned()
            .ok_or(StoreError::TransferNotFound(id))
    }

    async fn list_accounts_for_owner(
        &self,
        owner_id: OwnerId,
    ) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self
            .inner
            .committed()
            .accounts
            .values()
            .filter(|account| account.owner_id == owner_id)
            .cloned()
            .collect();
        accounts.sort_by_key(|account| (account.created_at, account.id));
        Ok(accounts)
    }

    async fn list_transfers_for_account(
        &self,
        account_id: AccountId,
        page: &PageRequest,
    ) -> Result<(Vec<Transfer>, u64), StoreError> {
        let mut transfers: Vec<Transfer> = self
            .inner
            .committed()
            .transfers
            .values()
            .filter(|transfer| transfer.involves(account_id))
            .cloned()
            .collect();
        transfers.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let total = transfers.len() as u64;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
        let data = transfers.into_iter().skip(offset).take(limit).collect();
        Ok((data, total))
    }

    async fn total_balance(&self, currency: CurrencyCode) -> Result<Decimal, StoreError> {
        Ok(self
            .inner
            .committed()
            .accounts
            .values()
            .filter(|account| account.currency == currency)
            .map(|account| account.balance)
            .sum())
    }

    async fn list_adjustments(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<BalanceAdjustment>, StoreError> {
        Ok(self
            .inner
            .committed()
            .adjustments
            .iter()
            .filter(|adjustment| adjustment.account_id == account_id)
            .cloned()
            .collect())
    }
}

/// Transaction over a [`MemoryLedgerStore`].
#[derive(Debug)]
pub struct MemoryTx {
    inner: Arc<Inner>,
    lock_timeout: Option<Duration>,
    account_guards: HashMap<AccountId, OwnedMutexGuard<()>>,
    transfer_guards: HashMap<TransferId, OwnedMutexGuard<()>>,
    /// Working copies of locked accounts.
    accounts: HashMap<AccountId, Account>,
    /// Staged account rows; `None` deletes.
    account_writes: HashMap<AccountId, Option<Account>>,
    transfer_writes: HashMap<TransferId, Transfer>,
    adjustment_writes: Vec<BalanceAdjustment>,
}

impl MemoryTx {
    fn locked_account(&mut self, id: AccountId) -> Result<&mut Account, StoreError> {
        self.accounts.get_mut(&id).ok_or(StoreError::RowNotLocked {
            table: "accounts",
            id: id.into_inner(),
        })
    }

    fn stage_account(&mut self, account: &Account) {
        self.account_writes.insert(account.id, Some(account.clone()));
    }

    fn account_exists(&self, committed: &Committed, id: AccountId) -> bool {
        match self.account_writes.get(&id) {
            Some(staged) => staged.is_some(),
            None => committed.accounts.contains_key(&id),
        }
    }

    /// Rejects staged transfers and adjustments whose accounts are gone, as
    /// the foreign keys of the SQL schema would.
    fn check_references(&self, committed: &Committed) -> Result<(), StoreError> {
        let referenced = self
            .transfer_writes
            .values()
            .flat_map(|transfer| [transfer.from_account_id, transfer.to_account_id])
            .chain(self.adjustment_writes.iter().map(|adjustment| adjustment.account_id));
        for account_id in referenced {
            if !self.account_exists(committed, account_id) {
                return Err(StoreError::AccountNotFound(account_id));
            }
        }
        Ok(())
    }

    /// Rejects a second active account for the same owner and currency,
    /// looking at committed rows as this transaction would leave them.
    fn check_unique_active(&self, committed: &Committed) -> Result<(), StoreError> {
        for account in self.account_writes.values().flatten() {
            if !account.is_active {
                continue;
            }
            let clash = committed
                .accounts
                .values()
                .filter(|other| other.id != account.id)
                .map(|other| match self.account_writes.get(&other.id) {
                    Some(staged) => staged.as_ref(),
                    None => Some(other),
                })
                .chain(
                    self.account_writes
                        .values()
                        .flatten()
                        .filter(|other| {
                            other.id != account.id && !committed.accounts.contains_key(&other.id)
                        })
                        .map(Some),
                )
                .flatten()
                .any(|other| {
                    other.is_active
                        && other.owner_id == account.owner_id
                        && other.currency == account.currency
                });
            if clash {
                return Err(StoreError::DuplicateActiveAccount {
                    owner_id: account.owner_id,
                    currency: account.currency,
                });
            }
        }
        Ok(())
    }

    fn apply_staged(&mut self) -> Result<(), StoreError> {
        let mut committed = self.inner.committed();
        self.check_unique_active(&committed)?;
        self.check_references(&committed)?;

        for (id, staged) in self.account_writes.drain() {
            match staged {
                Some(account) => {
                    committed.accounts.insert(id, account);
                }
                None => {
                    committed.accounts.remove(&id);
                }
            }
        }
        for (id, transfer) in self.transfer_writes.drain() {
            committed.transfers.insert(id, transfer);
        }
        committed.adjustments.append(&mut self.adjustment_writes);
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        let accounts: Vec<AccountId> = self.account_guards.keys().copied().collect();
        let transfers: Vec<TransferId> = self.transfer_guards.keys().copied().collect();
        self.account_guards.clear();
        self.transfer_guards.clear();
        prune(&self.inner.account_locks, accounts);
        prune(&self.inner.transfer_locks, transfers);
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, StoreError> {
        if let Some(account) = self.accounts.get(&id) {
            return Ok(account.clone());
        }

        let guard = acquire(&self.inner.account_locks, id, self.lock_timeout, || {
            format!("account {id}")
        })
        .await?;

        let found = self.inner.committed().accounts.get(&id).cloned();
        let Some(account) = found else {
            drop(guard);
            prune(&self.inner.account_locks, [id]);
            return Err(StoreError::AccountNotFound(id));
        };
        self.account_guards.insert(id, guard);
        self.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn apply_delta(&mut self, id: AccountId, delta: Decimal) -> Result<Account, StoreError> {
        let account = self.locked_account(id)?;
        account.balance = account.balance_after(delta)?;
        account.updated_at = now();
        let account = account.clone();
        self.stage_account(&account);
        Ok(account)
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), StoreError> {
        let exists = {
            let committed = self.inner.committed();
            self.account_exists(&committed, account.id)
        };
        if exists {
            return Err(StoreError::Conflict(format!(
                "account {} already exists",
                account.id
            )));
        }

        let guard = acquire(&self.inner.account_locks, account.id, self.lock_timeout, || {
            format!("account {}", account.id)
        })
        .await?;
        self.account_guards.insert(account.id, guard);
        self.accounts.insert(account.id, account.clone());
        self.stage_account(account);

        let committed = self.inner.committed();
        self.check_unique_active(&committed)
    }

    async fn update_account_flags(
        &mut self,
        id: AccountId,
        is_active: bool,
        is_frozen: bool,
    ) -> Result<Account, StoreError> {
        let account = self.locked_account(id)?;
        account.is_active = is_active;
        account.is_frozen = is_frozen;
        account.updated_at = now();
        let account = account.clone();
        self.stage_account(&account);
        Ok(account)
    }

    async fn delete_account(&mut self, id: AccountId) -> Result<(), StoreError> {
        self.locked_account(id)?;
        self.accounts.remove(&id);
        self.account_writes.insert(id, None);
        Ok(())
    }

    async fn count_account_references(&mut self, id: AccountId) -> Result<u64, StoreError> {
        let committed = self.inner.committed();
        let transfers = committed
            .transfers
            .values()
            .chain(
                self.transfer_writes
                    .values()
                    .filter(|staged| !committed.transfers.contains_key(&staged.id)),
            )
            .filter(|transfer| transfer.involves(id))
            .count();
        let adjustments = committed
            .adjustments
            .iter()
            .chain(&self.adjustment_writes)
            .filter(|adjustment| adjustment.account_id == id)
            .count();
        Ok((transfers + adjustments) as u64)
    }

    async fn get_transfer_for_update(&mut self, id: TransferId) -> Result<Transfer, StoreError> {
        if !self.transfer_guards.contains_key(&id) {
            let guard = acquire(&self.inner.transfer_locks, id, self.lock_timeout, || {
                format!("transfer {id}")
            })
            .await?;
            self.transfer_guards.insert(id, guard);
        }

        if let Some(staged) = self.transfer_writes.get(&id) {
            return Ok(staged.clone());
        }
        self.inner
            .committed()
            .transfers
            .get(&id)
            .cloned()
            .ok_or(StoreError::TransferNotFound(id))
    }

    async fn insert_transfer(&mut self, transfer: &Transfer) -> Result<(), StoreError> {
        {
            let committed = self.inner.committed();
            if committed.transfers.contains_key(&transfer.id)
                || self.transfer_writes.contains_key(&transfer.id)
            {
                return Err(StoreError::Conflict(format!(
                    "transfer {} already exists",
                    transfer.id
                )));
            }
            for account_id in [transfer.from_account_id, transfer.to_account_id] {
                if !self.account_exists(&committed, account_id) {
                    return Err(StoreError::AccountNotFound(account_id));
                }
            }
        }
        self.transfer_writes.insert(transfer.id, transfer.clone());
        Ok(())
    }

    async fn update_transfer(&mut self, transfer: &Transfer) -> Result<(), StoreError> {
        if !self.transfer_guards.contains_key(&transfer.id) {
            return Err(StoreError::RowNotLocked {
                table: "transfers",
                id: transfer.id.into_inner(),
            });
        }
        self.transfer_writes.insert(transfer.id, transfer.clone());
        Ok(())
    }

    async fn insert_adjustment(
        &mut self,
        adjustment: &BalanceAdjustment,
    ) -> Result<(), StoreError> {
        let exists = {
            let committed = self.inner.committed();
            self.account_exists(&committed, adjustment.account_id)
        };
        if !exists {
            return Err(StoreError::AccountNotFound(adjustment.account_id));
        }
        self.adjustment_writes.push(adjustment.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        let injected = self
            .inner
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Conflict(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }
        self.apply_staged()
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
