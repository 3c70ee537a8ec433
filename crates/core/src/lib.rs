//! Core ledger logic for Tally.
//!
//! This crate contains the ledger transfer engine with ZERO web or database
//! dependencies. Persistence is reached through the [`ledger::LedgerStore`]
//! traits; `tally-db` provides the PostgreSQL implementation and
//! [`ledger::MemoryLedgerStore`] is the in-process reference store.
//!
//! # Modules
//!
//! - `ledger` - Accounts, transfers, invariants, locking discipline and reversals

pub mod ledger;
