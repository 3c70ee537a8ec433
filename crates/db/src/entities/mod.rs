//! `SeaORM` entity definitions for the ledger tables.

pub mod accounts;
pub mod balance_adjustments;
pub mod transfers;

pub mod prelude {
    //! Entity re-exports.

    pub use super::accounts::Entity as Accounts;
    pub use super::balance_adjustments::Entity as BalanceAdjustments;
    pub use super::transfers::Entity as Transfers;
}
