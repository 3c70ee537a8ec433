//! Ledger schema: accounts, transfers and the adjustment audit trail.
//!
//! Balance non-negativity and the one-active-account rule are enforced by
//! the database as well as by the engine.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(ACCOUNTS_SQL).await?;
        db.execute_unprepared(TRANSFERS_SQL).await?;
        db.execute_unprepared(ADJUSTMENTS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_SQL).await?;
        Ok(())
    }
}

// ============================================================
// PART 1: ACCOUNTS
// ============================================================
const ACCOUNTS_SQL: &str = r"
CREATE TABLE accounts (
    id UUID PRIMARY KEY,
    owner_id UUID NOT NULL,
    currency VARCHAR(3) NOT NULL,
    balance NUMERIC(19, 4) NOT NULL DEFAULT 0,
    is_active BOOLEAN NOT NULL DEFAULT true,
    is_frozen BOOLEAN NOT NULL DEFAULT false,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_accounts_balance_non_negative CHECK (balance >= 0),
    CONSTRAINT chk_accounts_currency_format CHECK (currency ~ '^[A-Z]{3}$')
);

-- At most one active account per owner and currency
CREATE UNIQUE INDEX uq_accounts_owner_currency_active
    ON accounts(owner_id, currency) WHERE is_active;

CREATE INDEX idx_accounts_owner ON accounts(owner_id, created_at);
CREATE INDEX idx_accounts_currency ON accounts(currency);
";

// ============================================================
// PART 2: TRANSFERS
// ============================================================
const TRANSFERS_SQL: &str = r"
CREATE TABLE transfers (
    id UUID PRIMARY KEY,
    from_account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE RESTRICT,
    to_account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE RESTRICT,
    amount NUMERIC(19, 4) NOT NULL,
    currency VARCHAR(3) NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status VARCHAR(16) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    reversed_at TIMESTAMPTZ,
    reversal_reason TEXT,
    failure_reason TEXT,
    CONSTRAINT chk_transfers_amount_positive CHECK (amount > 0),
    CONSTRAINT chk_transfers_distinct_accounts CHECK (from_account_id <> to_account_id),
    CONSTRAINT chk_transfers_status CHECK (
        status IN ('pending', 'completed', 'reversed', 'failed')
    ),
    CONSTRAINT chk_transfers_reversal_fields CHECK (
        (status = 'reversed') = (reversed_at IS NOT NULL AND reversal_reason IS NOT NULL)
    )
);

CREATE INDEX idx_transfers_from ON transfers(from_account_id, created_at DESC);
CREATE INDEX idx_transfers_to ON transfers(to_account_id, created_at DESC);
";

// ============================================================
// PART 3: BALANCE ADJUSTMENTS (append-only audit trail)
// ============================================================
const ADJUSTMENTS_SQL: &str = r"
CREATE TABLE balance_adjustments (
    id UUID PRIMARY KEY,
    account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE RESTRICT,
    amount NUMERIC(19, 4) NOT NULL,
    reason TEXT NOT NULL,
    balance_after NUMERIC(19, 4) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_adjustments_amount_non_zero CHECK (amount <> 0),
    CONSTRAINT chk_adjustments_reason_present CHECK (length(btrim(reason)) > 0),
    CONSTRAINT chk_adjustments_balance_after CHECK (balance_after >= 0)
);

CREATE INDEX idx_adjustments_account ON balance_adjustments(account_id, created_at);
";

const DROP_SQL: &str = r"
DROP TABLE IF EXISTS balance_adjustments CASCADE;
DROP TABLE IF EXISTS transfers CASCADE;
DROP TABLE IF EXISTS accounts CASCADE;
";
