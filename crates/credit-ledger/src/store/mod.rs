//! Ledger Storage
//!
//! The persistence seam for payments, ledger entries and user balances.
//! Backends must enforce the uniqueness of `PaymentRecord::identifier` and
//! apply every ledger append together with its balance change, so the ledger
//! sum and the denormalized balance cannot drift apart.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{LedgerEntry, PaymentRecord, UserId};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryLedgerStore;
#[cfg(feature = "postgres")]
pub use postgres::PgLedgerStore;

/// Storage backend for the credit ledger
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Look up a payment by its idempotency key
    async fn find_payment_by_identifier(&self, identifier: &str) -> Result<Option<PaymentRecord>>;

    /// Atomically insert a payment and, when given, its credit entry.
    ///
    /// The entry's delta is added to the user's balance in the same write;
    /// the user row is created on first credit. Fails with
    /// `PaymentError::DuplicateIdentifier` when another record already holds
    /// the identifier, in which case nothing is written.
    async fn commit_payment(
        &self,
        record: &PaymentRecord,
        credit: Option<&LedgerEntry>,
    ) -> Result<()>;

    /// Atomically append an entry and add its delta to an existing user.
    ///
    /// Returns the new balance, or `PaymentError::UserNotFound` without
    /// writing anything.
    async fn apply_adjustment(&self, entry: &LedgerEntry) -> Result<i64>;

    /// Current denormalized balance, `None` for an unknown user
    async fn balance(&self, user_id: &UserId) -> Result<Option<i64>>;

    /// Sum of every ledger delta for the user
    async fn ledger_sum(&self, user_id: &UserId) -> Result<i64>;

    /// Most recent payments, newest first
    async fn recent_payments(&self, limit: usize) -> Result<Vec<PaymentRecord>>;

    /// Most recent payments for one user, newest first
    async fn user_payments(&self, user_id: &UserId, limit: usize) -> Result<Vec<PaymentRecord>>;

    /// Most recent ledger entries for one user, newest first
    async fn user_ledger(&self, user_id: &UserId, limit: usize) -> Result<Vec<LedgerEntry>>;
}
