//! PostgreSQL ledger store.
//!
//! Uniqueness of payment identifiers is enforced by the
//! `payments_identifier_key` constraint. Every payment, ledger append and
//! balance increment runs inside one transaction.

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};

use super::LedgerStore;
use crate::error::{PaymentError, Result};
use crate::model::{
    LedgerEntry, LedgerEntryId, LedgerSource, PaymentId, PaymentRecord, PaymentStatus, Provider,
    UserId,
};

/// Name of the unique constraint on `payments.identifier`
const IDENTIFIER_CONSTRAINT: &str = "payments_identifier_key";

const PAYMENT_COLUMNS: &str = "id, provider, provider_order_id, identifier, user_id, amount_cents, \
                               currency, status, raw, created_at, updated_at";

const LEDGER_COLUMNS: &str = "id, user_id, delta, reason, source, ref, created_at";

/// PostgreSQL storage backend
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

fn storage_error(err: sqlx::Error) -> PaymentError {
    PaymentError::Storage(err.to_string())
}

fn page(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn payment_from_row(row: &PgRow) -> Result<PaymentRecord> {
    let provider: String = row.try_get("provider").map_err(storage_error)?;
    let status: String = row.try_get("status").map_err(storage_error)?;
    let user_id: String = row.try_get("user_id").map_err(storage_error)?;

    Ok(PaymentRecord {
        id: PaymentId::from_uuid(row.try_get("id").map_err(storage_error)?),
        provider: Provider::parse(&provider)
            .ok_or_else(|| PaymentError::Storage(format!("unknown provider tag: {provider}")))?,
        provider_order_id: row.try_get("provider_order_id").map_err(storage_error)?,
        identifier: row.try_get("identifier").map_err(storage_error)?,
        user_id: UserId::new(user_id),
        amount_cents: row.try_get("amount_cents").map_err(storage_error)?,
        currency: row.try_get("currency").map_err(storage_error)?,
        status: PaymentStatus::parse(&status)
            .ok_or_else(|| PaymentError::Storage(format!("unknown payment status: {status}")))?,
        raw: row.try_get("raw").map_err(storage_error)?,
        created_at: row.try_get("created_at").map_err(storage_error)?,
        updated_at: row.try_get("updated_at").map_err(storage_error)?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry> {
    let source: String = row.try_get("source").map_err(storage_error)?;
    let user_id: String = row.try_get("user_id").map_err(storage_error)?;

    Ok(LedgerEntry {
        id: LedgerEntryId::from_uuid(row.try_get("id").map_err(storage_error)?),
        user_id: UserId::new(user_id),
        delta: row.try_get("delta").map_err(storage_error)?,
        reason: row.try_get("reason").map_err(storage_error)?,
        source: LedgerSource::parse(&source)
            .ok_or_else(|| PaymentError::Storage(format!("unknown ledger source: {source}")))?,
        ref_: row.try_get("ref").map_err(storage_error)?,
        created_at: row.try_get("created_at").map_err(storage_error)?,
    })
}

impl PgLedgerStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply pending migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await.map_err(storage_error)?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PaymentError::Storage(format!("migration failed: {e}")))
    }

    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_entry(conn: &mut sqlx::PgConnection, entry: &LedgerEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO ledger (id, user_id, delta, reason, source, ref, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.id.as_uuid())
        .bind(entry.user_id.as_str())
        .bind(entry.delta)
        .bind(&entry.reason)
        .bind(entry.source.as_str())
        .bind(&entry.ref_)
        .bind(entry.created_at)
        .execute(conn)
        .await
        .map_err(storage_error)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn find_payment_by_identifier(&self, identifier: &str) -> Result<Option<PaymentRecord>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE identifier = $1");
        let row = sqlx::query(&sql)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.as_ref().map(payment_from_row).transpose()
    }

    async fn commit_payment(
        &self,
        record: &PaymentRecord,
        credit: Option<&LedgerEntry>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let inserted = sqlx::query(&format!(
            "INSERT INTO payments ({PAYMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(record.id.as_uuid())
        .bind(record.provider.as_str())
        .bind(&record.provider_order_id)
        .bind(&record.identifier)
        .bind(record.user_id.as_str())
        .bind(record.amount_cents)
        .bind(&record.currency)
        .bind(record.status.as_str())
        .bind(&record.raw)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            if let (sqlx::Error::Database(db_err), Some(identifier)) = (&err, &record.identifier) {
                if db_err.is_unique_violation()
                    && db_err.constraint() == Some(IDENTIFIER_CONSTRAINT)
                {
                    return Err(PaymentError::DuplicateIdentifier(identifier.clone()));
                }
            }
            return Err(storage_error(err));
        }

        let delta = credit.map_or(0, |entry| entry.delta);
        sqlx::query(
            "INSERT INTO users (id, credits) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET credits = users.credits + EXCLUDED.credits",
        )
        .bind(record.user_id.as_str())
        .bind(delta)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        if let Some(entry) = credit {
            Self::insert_entry(&mut *tx, entry).await?;
        }

        tx.commit().await.map_err(storage_error)
    }

    async fn apply_adjustment(&self, entry: &LedgerEntry) -> Result<i64> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let row = sqlx::query(
            "UPDATE users SET credits = credits + $2 WHERE id = $1 RETURNING credits",
        )
        .bind(entry.user_id.as_str())
        .bind(entry.delta)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| PaymentError::UserNotFound(entry.user_id.to_string()))?;
        let credits: i64 = row.try_get("credits").map_err(storage_error)?;

        Self::insert_entry(&mut *tx, entry).await?;
        tx.commit().await.map_err(storage_error)?;

        Ok(credits)
    }

    async fn balance(&self, user_id: &UserId) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT credits FROM users WHERE id = $1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.map(|r| r.try_get::<i64, _>("credits").map_err(storage_error))
            .transpose()
    }

    async fn ledger_sum(&self, user_id: &UserId) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(delta), 0)::BIGINT AS total FROM ledger WHERE user_id = $1",
        )
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;
        row.try_get("total").map_err(storage_error)
    }

    async fn recent_payments(&self, limit: usize) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(page(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows.iter().map(payment_from_row).collect()
    }

    async fn user_payments(&self, user_id: &UserId, limit: usize) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        ))
        .bind(user_id.as_str())
        .bind(page(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows.iter().map(payment_from_row).collect()
    }

    async fn user_ledger(&self, user_id: &UserId, limit: usize) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        ))
        .bind(user_id.as_str())
        .bind(page(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows.iter().map(entry_from_row).collect()
    }
}
