//! # credit-ledger
//!
//! Idempotent payment recording and credit bookkeeping.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────────┐   ┌─────────────┐
//! │   Provider   │──▶│ PaymentEvent │──▶│ PaymentRecorder│──▶│ LedgerStore │
//! │   webhook    │   │ (typed shape)│   │  (exactly once)│   │ payments    │
//! └──────────────┘   └──────────────┘   └────────────────┘   │ ledger      │
//!                                                            │ users       │
//! ┌──────────────┐   ┌──────────────┐                        │             │
//! │  Admin call  │──▶│CreditAdjuster│───────────────────────▶│             │
//! └──────────────┘   └──────────────┘                        └─────────────┘
//! ```
//!
//! - A payment carrying an `identifier` is stored at most once, however many
//!   times (or however concurrently) the provider delivers it.
//! - Credits are `floor(amount_cents / 100 * credits_per_unit)`.
//! - The ledger is append-only; each append and its balance change are one
//!   atomic store write, so `sum(ledger.delta) == users.credits`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use credit_ledger::{LedgerConfig, MemoryLedgerStore, PaymentRecorder, PaymentRequest, Provider};
//! use rust_decimal_macros::dec;
//!
//! let store = Arc::new(MemoryLedgerStore::new());
//! let recorder = PaymentRecorder::new(store, LedgerConfig::from_env()?);
//!
//! let record = recorder.record_payment(
//!     PaymentRequest::new(Provider::LemonSqueezy, "u1", dec!(500)).with_identifier("evt_1"),
//! ).await?;
//! ```

pub mod admin;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod recorder;
pub mod store;
pub mod webhook;

pub use admin::{AdjustmentOutcome, CreditAdjuster};
pub use config::LedgerConfig;
pub use error::{PaymentError, Result};
pub use model::{
    LedgerEntry, LedgerEntryId, LedgerSource, PaymentId, PaymentRecord, PaymentRequest,
    PaymentStatus, Provider, UserId,
};
pub use query::{LedgerQueries, Reconciliation};
pub use recorder::PaymentRecorder;
pub use store::{LedgerStore, MemoryLedgerStore};
#[cfg(feature = "postgres")]
pub use store::PgLedgerStore;
pub use webhook::PaymentEvent;
