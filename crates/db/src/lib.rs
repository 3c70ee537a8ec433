//! PostgreSQL persistence for the Tally ledger.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - Database migrations
//! - [`PgLedgerStore`], the production implementation of the ledger store

pub mod entities;
pub mod migration;
pub mod store;

pub use store::{PgLedgerStore, PgLedgerTx};

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use tally_shared::DatabaseConfig;
use tracing::info;

/// Establishes a pooled connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    info!(
        max_connections = config.max_connections,
        "Database connection pool established"
    );
    Ok(db)
}
