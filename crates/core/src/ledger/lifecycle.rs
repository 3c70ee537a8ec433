//! Account lifecycle: open, freeze, deactivate, close.
//!
//! Flag changes take the account row lock, so they serialize with in-flight
//! transfers on the same account.

use tally_shared::types::{AccountId, CurrencyCode, OwnerId};
use tracing::info;

use super::account::Account;
use super::engine::{finish, with_deadline};
use super::error::LedgerError;
use super::now;
use super::settings::LedgerSettings;
use super::store::{LedgerStore, LedgerTx};

/// Input for opening an account.
#[derive(Debug, Clone, Copy)]
pub struct OpenAccountInput {
    /// Owning user.
    pub owner_id: OwnerId,
    /// Currency of the new account.
    pub currency: CurrencyCode,
}

/// Flag change applied under the row lock.
#[derive(Debug, Clone, Copy)]
enum FlagChange {
    Freeze,
    Unfreeze,
    Deactivate,
}

/// Opens, freezes, deactivates and closes accounts.
#[derive(Debug, Clone)]
pub struct AccountService<S> {
    store: S,
    settings: LedgerSettings,
}

impl<S: LedgerStore> AccountService<S> {
    /// Creates a new account service.
    #[must_use]
    pub const fn new(store: S, settings: LedgerSettings) -> Self {
        Self { store, settings }
    }

    /// Opens an empty, active account.
    ///
    /// # Errors
    ///
    /// `DuplicateActiveAccount` if the owner already has an active account
    /// in this currency.
    pub async fn open_account(&self, input: OpenAccountInput) -> Result<Account, LedgerError> {
        let account = Account::open(input.owner_id, input.currency, now());
        with_deadline(self.settings.transaction_timeout, async {
            let mut tx = self.store.begin(self.settings.tx_options()).await?;
            let outcome = tx.insert_account(&account).await.map_err(LedgerError::from);
            finish(tx, outcome).await
        })
        .await?;

        info!(
            account_id = %account.id,
            owner_id = %account.owner_id,
            currency = %account.currency,
            "Account opened"
        );
        Ok(account)
    }

    /// Freezes an account; transfers touching it are rejected.
    pub async fn freeze_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.change_flags(id, FlagChange::Freeze).await
    }

    /// Lifts a freeze.
    pub async fn unfreeze_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.change_flags(id, FlagChange::Unfreeze).await
    }

    /// Deactivates an empty account, freeing the owner's slot for its
    /// currency.
    ///
    /// # Errors
    ///
    /// `AccountNotEmpty` if the balance is not zero.
    pub async fn deactivate_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.change_flags(id, FlagChange::Deactivate).await
    }

    async fn change_flags(&self, id: AccountId, change: FlagChange) -> Result<Account, LedgerError> {
        let account = with_deadline(self.settings.transaction_timeout, async {
            let mut tx = self.store.begin(self.settings.tx_options()).await?;
            let outcome = Self::change_flags_in_tx(&mut tx, id, change).await;
            finish(tx, outcome).await
        })
        .await?;

        info!(
            account_id = %id,
            change = ?change,
            is_active = account.is_active,
            is_frozen = account.is_frozen,
            "Account flags changed"
        );
        Ok(account)
    }

    async fn change_flags_in_tx(
        tx: &mut S::Tx,
        id: AccountId,
        change: FlagChange,
    ) -> Result<Account, LedgerError> {
        let account = tx.get_account_for_update(id).await?;
        let (is_active, is_frozen) = match change {
            FlagChange::Freeze => (account.is_active, true),
            FlagChange::Unfreeze => (account.is_active, false),
            FlagChange::Deactivate => {
                if !account.balance.is_zero() {
                    return Err(LedgerError::AccountNotEmpty {
                        account_id: id,
                        balance: account.balance,
                    });
                }
                (false, account.is_frozen)
            }
        };

        if (is_active, is_frozen) == (account.is_active, account.is_frozen) {
            return Ok(account);
        }
        Ok(tx.update_account_flags(id, is_active, is_frozen).await?)
    }

    /// Deletes an account that holds nothing and is referenced by nothing.
    ///
    /// # Errors
    ///
    /// `AccountNotEmpty` or `AccountReferenced`.
    pub async fn close_account(&self, id: AccountId) -> Result<(), LedgerError> {
        with_deadline(self.settings.transaction_timeout, async {
            let mut tx = self.store.begin(self.settings.tx_options()).await?;
            let outcome = Self::close_in_tx(&mut tx, id).await;
            finish(tx, outcome).await
        })
        .await?;

        info!(account_id = %id, "Account closed");
        Ok(())
    }

    async fn close_in_tx(tx: &mut S::Tx, id: AccountId) -> Result<(), LedgerError> {
        let account = tx.get_account_for_update(id).await?;
        if !account.balance.is_zero() {
            return Err(LedgerError::AccountNotEmpty {
                account_id: id,
                balance: account.balance,
            });
        }
        let references = tx.count_account_references(id).await?;
        if references > 0 {
            return Err(LedgerError::AccountReferenced {
                account_id: id,
                references,
            });
        }
        tx.delete_account(id).await?;
        Ok(())
    }

    /// Reads one account.
    pub async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        Ok(self.store.get_account(id).await?)
    }

    /// Lists all accounts of an owner.
    pub async fn list_accounts(&self, owner_id: OwnerId) -> Result<Vec<Account>, LedgerError> {
        Ok(self.store.list_accounts_for_owner(owner_id).await?)
    }
}
