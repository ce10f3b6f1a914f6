//! PostgreSQL store.
//!
//! Every `lock_*` read is a `SELECT ... FOR UPDATE` inside the unit's
//! transaction, so two units touching the same row serialise on it.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use super::store::{Page, PageRequest, Store, UnitOfWork};
use crate::audit::{AuditEntry, NewAuditEntry};
use crate::deposit::{DepositRequest, PaymentReference};
use crate::gateway::{ExternalTransaction, PaymentInstructions};
use crate::wallet::{LedgerSnapshot, LedgerTransaction, TransactionType, UserId, Wallet};
use crate::withdrawal::{BankDestination, WithdrawalRequest};

const WALLET_COLUMNS: &str = "user_id, balance, daily_limit, monthly_limit, is_active, is_frozen, \
     review_hold, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, user_id, transaction_type, direction, amount, balance_after, \
     status, description, reference_id, from_user_id, to_user_id, created_at";

const DEPOSIT_COLUMNS: &str = "id, user_id, amount, pearls_amount, payment_method, reference_code, \
     integration_method, auto_approval_eligible, status, external_transaction_id, expires_at, \
     validated_by, validated_at, rejection_reason, created_at, updated_at";

const EXTERNAL_COLUMNS: &str = "id, deposit_request_id, user_id, external_charge_id, amount, \
     currency, payment_method, external_status, authorization_code, error_code, error_message, \
     instructions_bank, instructions_clabe, instructions_reference, charged_at, expires_at, \
     created_at, updated_at";

const REFERENCE_COLUMNS: &str =
    "id, code, validation_code, user_id, amount, kind, is_used, used_at, expires_at, created_at";

const WITHDRAWAL_COLUMNS: &str = "id, user_id, amount, commission, net_amount, reference_code, \
     bank_name, account_holder, clabe, status, processed_by, processed_at, rejection_reason, \
     created_at, updated_at";

const AUDIT_COLUMNS: &str =
    "id, actor, action, user_id, amount, reference_id, details, created_at";

/// Decode a text column into one of the domain enums
fn parse_column<T>(row: &PgRow, column: &str) -> StoreResult<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|value| StoreError::Decode(format!("{column}: {value}")))
}

fn wallet_from_row(row: &PgRow) -> StoreResult<Wallet> {
    Ok(Wallet {
        user_id: row.try_get("user_id")?,
        balance: row.try_get("balance")?,
        daily_limit: row.try_get("daily_limit")?,
        monthly_limit: row.try_get("monthly_limit")?,
        is_active: row.try_get("is_active")?,
        is_frozen: row.try_get("is_frozen")?,
        review_hold: row.try_get("review_hold")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> StoreResult<LedgerTransaction> {
    Ok(LedgerTransaction {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        transaction_type: parse_column(row, "transaction_type")?,
        direction: parse_column(row, "direction")?,
        amount: row.try_get("amount")?,
        balance_after: row.try_get("balance_after")?,
        status: parse_column(row, "status")?,
        description: row.try_get("description")?,
        reference_id: row.try_get("reference_id")?,
        from_user_id: row.try_get("from_user_id")?,
        to_user_id: row.try_get("to_user_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn deposit_from_row(row: &PgRow) -> StoreResult<DepositRequest> {
    Ok(DepositRequest {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        pearls_amount: row.try_get("pearls_amount")?,
        payment_method: parse_column(row, "payment_method")?,
        reference_code: row.try_get("reference_code")?,
        integration_method: parse_column(row, "integration_method")?,
        auto_approval_eligible: row.try_get("auto_approval_eligible")?,
        status: parse_column(row, "status")?,
        external_transaction_id: row.try_get("external_transaction_id")?,
        expires_at: row.try_get("expires_at")?,
        validated_by: row.try_get("validated_by")?,
        validated_at: row.try_get("validated_at")?,
        rejection_reason: row.try_get("rejection_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn external_from_row(row: &PgRow) -> StoreResult<ExternalTransaction> {
    Ok(ExternalTransaction {
        id: row.try_get("id")?,
        deposit_request_id: row.try_get("deposit_request_id")?,
        user_id: row.try_get("user_id")?,
        external_charge_id: row.try_get("external_charge_id")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        payment_method: parse_column(row, "payment_method")?,
        external_status: parse_column(row, "external_status")?,
        authorization_code: row.try_get("authorization_code")?,
        error_code: row.try_get("error_code")?,
        error_message: row.try_get("error_message")?,
        payment_instructions: PaymentInstructions {
            bank_name: row.try_get("instructions_bank")?,
            clabe: row.try_get("instructions_clabe")?,
            reference: row.try_get("instructions_reference")?,
        },
        charged_at: row.try_get("charged_at")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn reference_from_row(row: &PgRow) -> StoreResult<PaymentReference> {
    Ok(PaymentReference {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        validation_code: row.try_get("validation_code")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        kind: parse_column(row, "kind")?,
        is_used: row.try_get("is_used")?,
        used_at: row.try_get("used_at")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn withdrawal_from_row(row: &PgRow) -> StoreResult<WithdrawalRequest> {
    Ok(WithdrawalRequest {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        commission: row.try_get("commission")?,
        net_amount: row.try_get("net_amount")?,
        reference_code: row.try_get("reference_code")?,
        destination: BankDestination {
            bank_name: row.try_get("bank_name")?,
            account_holder: row.try_get("account_holder")?,
            clabe: row.try_get("clabe")?,
        },
        status: parse_column(row, "status")?,
        processed_by: row.try_get("processed_by")?,
        processed_at: row.try_get("processed_at")?,
        rejection_reason: row.try_get("rejection_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn audit_from_row(row: &PgRow) -> StoreResult<AuditEntry> {
    Ok(AuditEntry {
        id: row.try_get("id")?,
        actor: row.try_get("actor")?,
        action: parse_column(row, "action")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        reference_id: row.try_get("reference_id")?,
        details: row.try_get("details")?,
        created_at: row.try_get("created_at")?,
    })
}

fn collect<T>(rows: &[PgRow], decode: fn(&PgRow) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(decode).collect()
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    /// Create a store over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn wallet(&self, user_id: UserId) -> StoreResult<Option<Wallet>> {
        let row = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.as_ref().map(wallet_from_row).transpose()
    }

    async fn transaction(&self, id: Uuid) -> StoreResult<Option<LedgerTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn transactions_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> StoreResult<Page<LedgerTransaction>> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool.as_ref())
            .await?
            .try_get("total")?;

        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(Page {
            items: collect(&rows, transaction_from_row)?,
            page: page.page,
            limit: page.limit,
            total: total as u64,
        })
    }

    async fn ledger_snapshot(&self, user_id: UserId) -> StoreResult<Option<LedgerSnapshot>> {
        // One statement, one snapshot: balance and sum cannot drift apart mid-read.
        let row = sqlx::query(
            r#"
            SELECT w.balance AS wallet_balance,
                   COALESCE((
                       SELECT SUM(CASE WHEN t.direction = 'credit' THEN t.amount ELSE -t.amount END)
                       FROM transactions t
                       WHERE t.user_id = w.user_id AND t.status = 'COMPLETED'
                   ), 0) AS ledger_balance
            FROM wallets w
            WHERE w.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(|r| {
            Ok(LedgerSnapshot {
                user_id,
                wallet_balance: r.try_get("wallet_balance")?,
                ledger_balance: r.try_get("ledger_balance")?,
            })
        })
        .transpose()
    }

    async fn credited_since(
        &self,
        user_id: UserId,
        kind: TransactionType,
        since: DateTime<Utc>,
    ) -> StoreResult<Decimal> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0) AS total
            FROM transactions
            WHERE user_id = $1
              AND transaction_type = $2
              AND direction = 'credit'
              AND status = 'COMPLETED'
              AND created_at >= $3
            "#,
        )
        .bind(user_id)
        .bind(kind.to_string())
        .bind(since)
        .fetch_one(self.pool.as_ref())
        .await?;
        Ok(row.try_get("total")?)
    }

    async fn deposit(&self, id: Uuid) -> StoreResult<Option<DepositRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {DEPOSIT_COLUMNS} FROM deposit_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.as_ref().map(deposit_from_row).transpose()
    }

    async fn deposit_by_reference(&self, code: &str) -> StoreResult<Option<DepositRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {DEPOSIT_COLUMNS} FROM deposit_requests WHERE reference_code = $1"
        ))
        .bind(code)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.as_ref().map(deposit_from_row).transpose()
    }

    async fn payment_reference(&self, code: &str) -> StoreResult<Option<PaymentReference>> {
        let row = sqlx::query(&format!(
            "SELECT {REFERENCE_COLUMNS} FROM payment_references WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.as_ref().map(reference_from_row).transpose()
    }

    async fn external_transaction(&self, id: Uuid) -> StoreResult<Option<ExternalTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {EXTERNAL_COLUMNS} FROM external_transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.as_ref().map(external_from_row).transpose()
    }

    async fn external_by_charge_id(
        &self,
        charge_id: &str,
    ) -> StoreResult<Option<ExternalTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {EXTERNAL_COLUMNS} FROM external_transactions WHERE external_charge_id = $1"
        ))
        .bind(charge_id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.as_ref().map(external_from_row).transpose()
    }

    async fn external_transactions_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> StoreResult<Page<ExternalTransaction>> {
        let total: i64 =
            sqlx::query("SELECT COUNT(*) AS total FROM external_transactions WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(self.pool.as_ref())
                .await?
                .try_get("total")?;

        let rows = sqlx::query(&format!(
            "SELECT {EXTERNAL_COLUMNS} FROM external_transactions
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(Page {
            items: collect(&rows, external_from_row)?,
            page: page.page,
            limit: page.limit,
            total: total as u64,
        })
    }

    async fn external_transactions_since(
        &self,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<ExternalTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {EXTERNAL_COLUMNS} FROM external_transactions
             WHERE created_at >= $1
             ORDER BY created_at DESC"
        ))
        .bind(since)
        .fetch_all(self.pool.as_ref())
        .await?;
        collect(&rows, external_from_row)
    }

    async fn external_volume(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<u64> {
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM external_transactions
             WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(self.pool.as_ref())
        .await?
        .try_get("total")?;
        Ok(total as u64)
    }

    async fn stale_pending_externals(
        &self,
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<ExternalTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {EXTERNAL_COLUMNS} FROM external_transactions
             WHERE external_status IN ('pending', 'charge_pending') AND created_at < $1
             ORDER BY created_at"
        ))
        .bind(before)
        .fetch_all(self.pool.as_ref())
        .await?;
        collect(&rows, external_from_row)
    }

    async fn captured_pending_externals(
        &self,
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<ExternalTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {EXTERNAL_COLUMNS} FROM external_transactions
             WHERE external_status = 'completed' AND updated_at < $1
               AND EXISTS (
                   SELECT 1 FROM deposit_requests d
                   WHERE d.id = external_transactions.deposit_request_id
                     AND d.status = 'PENDING'
               )
             ORDER BY updated_at"
        ))
        .bind(before)
        .fetch_all(self.pool.as_ref())
        .await?;
        collect(&rows, external_from_row)
    }

    async fn withdrawal(&self, id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.as_ref().map(withdrawal_from_row).transpose()
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> StoreResult<AuditEntry> {
        let row = sqlx::query(&format!(
            "INSERT INTO audit_logs (actor, action, user_id, amount, reference_id, details)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {AUDIT_COLUMNS}"
        ))
        .bind(&entry.actor)
        .bind(entry.action.to_string())
        .bind(entry.user_id)
        .bind(entry.amount)
        .bind(&entry.reference_id)
        .bind(&entry.details)
        .fetch_one(self.pool.as_ref())
        .await?;
        audit_from_row(&row)
    }

    async fn audit_entries(
        &self,
        user_id: Option<UserId>,
        limit: u32,
    ) -> StoreResult<Vec<AuditEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs
             WHERE $1::BIGINT IS NULL OR user_id = $1
             ORDER BY id DESC
             LIMIT $2"
        ))
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(self.pool.as_ref())
        .await?;
        collect(&rows, audit_from_row)
    }
}

/// Unit of work over one PostgreSQL transaction
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_wallet(&mut self, wallet: &Wallet) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO users (id, pearls_balance) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
        )
        .bind(wallet.user_id)
        .bind(wallet.balance)
        .execute(&mut *self.tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO wallets (user_id, balance, daily_limit, monthly_limit, is_active,
                                 is_frozen, review_hold, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(wallet.user_id)
        .bind(wallet.balance)
        .bind(wallet.daily_limit)
        .bind(wallet.monthly_limit)
        .bind(wallet.is_active)
        .bind(wallet.is_frozen)
        .bind(wallet.review_hold)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_wallet(&mut self, user_id: UserId) -> StoreResult<Option<Wallet>> {
        let row = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(wallet_from_row).transpose()
    }

    async fn update_wallet(&mut self, wallet: &Wallet) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE wallets
            SET balance = $2, daily_limit = $3, monthly_limit = $4, is_active = $5,
                is_frozen = $6, review_hold = $7, updated_at = $8
            WHERE user_id = $1
            "#,
        )
        .bind(wallet.user_id)
        .bind(wallet.balance)
        .bind(wallet.daily_limit)
        .bind(wallet.monthly_limit)
        .bind(wallet.is_active)
        .bind(wallet.is_frozen)
        .bind(wallet.review_hold)
        .bind(wallet.updated_at)
        .execute(&mut *self.tx)
        .await?;

        sqlx::query("UPDATE users SET pearls_balance = $2 WHERE id = $1")
            .bind(wallet.user_id)
            .bind(wallet.balance)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &LedgerTransaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, user_id, transaction_type, direction, amount,
                                      balance_after, status, description, reference_id,
                                      from_user_id, to_user_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.user_id)
        .bind(transaction.transaction_type.to_string())
        .bind(transaction.direction.to_string())
        .bind(transaction.amount)
        .bind(transaction.balance_after)
        .bind(transaction.status.to_string())
        .bind(&transaction.description)
        .bind(&transaction.reference_id)
        .bind(transaction.from_user_id)
        .bind(transaction.to_user_id)
        .bind(transaction.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn ledger_sum(&mut self, user_id: UserId) -> StoreResult<Decimal> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(CASE WHEN direction = 'credit' THEN amount ELSE -amount END), 0)
                   AS total
            FROM transactions
            WHERE user_id = $1 AND status = 'COMPLETED'
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.try_get("total")?)
    }

    async fn insert_deposit(&mut self, deposit: &DepositRequest) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO deposit_requests (id, user_id, amount, pearls_amount, payment_method,
                                          reference_code, integration_method,
                                          auto_approval_eligible, status,
                                          external_transaction_id, expires_at, validated_by,
                                          validated_at, rejection_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(deposit.id)
        .bind(deposit.user_id)
        .bind(deposit.amount)
        .bind(deposit.pearls_amount)
        .bind(deposit.payment_method.to_string())
        .bind(&deposit.reference_code)
        .bind(deposit.integration_method.to_string())
        .bind(deposit.auto_approval_eligible)
        .bind(deposit.status.to_string())
        .bind(deposit.external_transaction_id)
        .bind(deposit.expires_at)
        .bind(&deposit.validated_by)
        .bind(deposit.validated_at)
        .bind(&deposit.rejection_reason)
        .bind(deposit.created_at)
        .bind(deposit.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_deposit(&mut self, id: Uuid) -> StoreResult<Option<DepositRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {DEPOSIT_COLUMNS} FROM deposit_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(deposit_from_row).transpose()
    }

    async fn lock_deposit_by_reference(
        &mut self,
        code: &str,
    ) -> StoreResult<Option<DepositRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {DEPOSIT_COLUMNS} FROM deposit_requests WHERE reference_code = $1 FOR UPDATE"
        ))
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(deposit_from_row).transpose()
    }

    async fn update_deposit(&mut self, deposit: &DepositRequest) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE deposit_requests
            SET status = $2, external_transaction_id = $3, validated_by = $4,
                validated_at = $5, rejection_reason = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(deposit.id)
        .bind(deposit.status.to_string())
        .bind(deposit.external_transaction_id)
        .bind(&deposit.validated_by)
        .bind(deposit.validated_at)
        .bind(&deposit.rejection_reason)
        .bind(deposit.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn expire_deposits(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<DepositRequest>> {
        let rows = sqlx::query(&format!(
            "UPDATE deposit_requests
             SET status = 'EXPIRED', updated_at = $1
             WHERE status = 'PENDING' AND expires_at < $1
               AND NOT EXISTS (
                   SELECT 1 FROM external_transactions e
                   WHERE e.deposit_request_id = deposit_requests.id
                     AND e.external_status = 'completed'
               )
             RETURNING {DEPOSIT_COLUMNS}"
        ))
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await?;
        collect(&rows, deposit_from_row)
    }

    async fn insert_external(&mut self, external: &ExternalTransaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO external_transactions (id, deposit_request_id, user_id,
                                               external_charge_id, amount, currency,
                                               payment_method, external_status,
                                               authorization_code, error_code, error_message,
                                               instructions_bank, instructions_clabe,
                                               instructions_reference, charged_at, expires_at,
                                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18)
            "#,
        )
        .bind(external.id)
        .bind(external.deposit_request_id)
        .bind(external.user_id)
        .bind(&external.external_charge_id)
        .bind(external.amount)
        .bind(&external.currency)
        .bind(external.payment_method.to_string())
        .bind(external.external_status.to_string())
        .bind(&external.authorization_code)
        .bind(&external.error_code)
        .bind(&external.error_message)
        .bind(&external.payment_instructions.bank_name)
        .bind(&external.payment_instructions.clabe)
        .bind(&external.payment_instructions.reference)
        .bind(external.charged_at)
        .bind(external.expires_at)
        .bind(external.created_at)
        .bind(external.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_external_by_charge_id(
        &mut self,
        charge_id: &str,
    ) -> StoreResult<Option<ExternalTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {EXTERNAL_COLUMNS} FROM external_transactions
             WHERE external_charge_id = $1 FOR UPDATE"
        ))
        .bind(charge_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(external_from_row).transpose()
    }

    async fn update_external(&mut self, external: &ExternalTransaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE external_transactions
            SET external_status = $2, authorization_code = $3, error_code = $4,
                error_message = $5, charged_at = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(external.id)
        .bind(external.external_status.to_string())
        .bind(&external.authorization_code)
        .bind(&external.error_code)
        .bind(&external.error_message)
        .bind(external.charged_at)
        .bind(external.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_payment_reference(&mut self, reference: &PaymentReference) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_references (id, code, validation_code, user_id, amount, kind,
                                            is_used, used_at, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(reference.id)
        .bind(&reference.code)
        .bind(&reference.validation_code)
        .bind(reference.user_id)
        .bind(reference.amount)
        .bind(reference.kind.to_string())
        .bind(reference.is_used)
        .bind(reference.used_at)
        .bind(reference.expires_at)
        .bind(reference.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_payment_reference(
        &mut self,
        code: &str,
    ) -> StoreResult<Option<PaymentReference>> {
        let row = sqlx::query(&format!(
            "SELECT {REFERENCE_COLUMNS} FROM payment_references WHERE code = $1 FOR UPDATE"
        ))
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(reference_from_row).transpose()
    }

    async fn update_payment_reference(&mut self, reference: &PaymentReference) -> StoreResult<()> {
        sqlx::query("UPDATE payment_references SET is_used = $2, used_at = $3 WHERE id = $1")
            .bind(reference.id)
            .bind(reference.is_used)
            .bind(reference.used_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_withdrawal(&mut self, withdrawal: &WithdrawalRequest) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO withdrawal_requests (id, user_id, amount, commission, net_amount,
                                             reference_code, bank_name, account_holder, clabe,
                                             status, processed_by, processed_at,
                                             rejection_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(withdrawal.id)
        .bind(withdrawal.user_id)
        .bind(withdrawal.amount)
        .bind(withdrawal.commission)
        .bind(withdrawal.net_amount)
        .bind(&withdrawal.reference_code)
        .bind(&withdrawal.destination.bank_name)
        .bind(&withdrawal.destination.account_holder)
        .bind(&withdrawal.destination.clabe)
        .bind(withdrawal.status.to_string())
        .bind(&withdrawal.processed_by)
        .bind(withdrawal.processed_at)
        .bind(&withdrawal.rejection_reason)
        .bind(withdrawal.created_at)
        .bind(withdrawal.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_withdrawal(&mut self, id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(withdrawal_from_row).transpose()
    }

    async fn update_withdrawal(&mut self, withdrawal: &WithdrawalRequest) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE withdrawal_requests
            SET status = $2, processed_by = $3, processed_at = $4, rejection_reason = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(withdrawal.id)
        .bind(withdrawal.status.to_string())
        .bind(&withdrawal.processed_by)
        .bind(withdrawal.processed_at)
        .bind(&withdrawal.rejection_reason)
        .bind(withdrawal.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
