//! Seeds a small demo ledger for local development.
//!
//! Opens USD accounts for two fixed owners, funds one through an
//! adjustment, moves money between them and reverses one transfer.
//! Running it again is a no-op once the demo owners have accounts.
//!
//! Usage: cargo run --bin seeder

use rust_decimal::Decimal;
use tally_core::ledger::{
    Account, AdjustBalanceInput, CreateTransferInput, LedgerService, LedgerSettings,
    OpenAccountInput, ReverseTransferInput,
};
use tally_db::{PgLedgerStore, connect};
use tally_shared::AppConfig;
use tally_shared::types::{CurrencyCode, OwnerId};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Demo owner holding the funded account.
const ALICE: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0001);
/// Demo owner receiving transfers.
const BOB: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0002);

type Ledger = LedgerService<PgLedgerStore>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally=debug,seeder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    let db = connect(&config.database).await?;
    let ledger = LedgerService::new(
        PgLedgerStore::new(db),
        LedgerSettings::from(&config.ledger),
    );

    let alice = OwnerId::from_uuid(ALICE);
    let bob = OwnerId::from_uuid(BOB);
    if !ledger.list_accounts(alice).await?.is_empty() {
        info!(owner_id = %alice, "Demo ledger already seeded, skipping");
        return Ok(());
    }

    let alice_usd = open_usd(&ledger, alice).await?;
    let bob_usd = open_usd(&ledger, bob).await?;

    ledger
        .adjust_balance(AdjustBalanceInput {
            account_id: alice_usd.id,
            amount: Decimal::new(100_000, 2),
            reason: "demo opening balance".to_string(),
            deadline: None,
        })
        .await?;

    let rent = ledger
        .create_transfer(CreateTransferInput {
            from_account_id: alice_usd.id,
            to_account_id: bob_usd.id,
            amount: Decimal::new(25_000, 2),
            currency: CurrencyCode::USD,
            description: "rent".to_string(),
            deadline: None,
        })
        .await?;
    info!(transfer_id = %rent.id, "Seeded transfer");

    let refund = ledger
        .create_transfer(CreateTransferInput {
            from_account_id: bob_usd.id,
            to_account_id: alice_usd.id,
            amount: Decimal::new(4_000, 2),
            currency: CurrencyCode::USD,
            description: "refund".to_string(),
            deadline: None,
        })
        .await?;
    ledger
        .reverse_transfer(ReverseTransferInput {
            transfer_id: refund.id,
            reason: "sent twice".to_string(),
            deadline: None,
        })
        .await?;
    info!(transfer_id = %refund.id, "Seeded reversed transfer");

    let total = ledger.total_balance(CurrencyCode::USD).await?;
    info!(
        alice = %ledger.get_account(alice_usd.id).await?.balance,
        bob = %ledger.get_account(bob_usd.id).await?.balance,
        total = %total,
        "Seeding complete"
    );
    Ok(())
}

async fn open_usd(ledger: &Ledger, owner_id: OwnerId) -> anyhow::Result<Account> {
    let account = ledger
        .open_account(OpenAccountInput {
            owner_id,
            currency: CurrencyCode::USD,
        })
        .await?;
    info!(owner_id = %owner_id, account_id = %account.id, "Opened demo account");
    Ok(account)
}
