//! Ledger Queries
//!
//! Read-only views over payments, ledger entries and balances.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::model::{LedgerEntry, PaymentRecord, UserId};
use crate::store::LedgerStore;

/// Upper bound on any listing
pub const MAX_PAGE_SIZE: usize = 500;

/// Default listing size when the caller gives none
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Comparison of the denormalized balance against the ledger
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub user_id: UserId,
    pub balance: i64,
    pub ledger_sum: i64,

    /// `balance - ledger_sum`; zero when consistent
    pub drift: i64,
}

impl Reconciliation {
    pub const fn is_consistent(&self) -> bool {
        self.drift == 0
    }
}

fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_PAGE_SIZE)
}

/// Read-only ledger access
#[derive(Clone)]
pub struct LedgerQueries {
    store: Arc<dyn LedgerStore>,
}

impl LedgerQueries {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn recent_payments(&self, limit: usize) -> Result<Vec<PaymentRecord>> {
        self.store.recent_payments(clamp_limit(limit)).await
    }

    pub async fn user_payments(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<PaymentRecord>> {
        self.store.user_payments(user_id, clamp_limit(limit)).await
    }

    pub async fn user_ledger(&self, user_id: &UserId, limit: usize) -> Result<Vec<LedgerEntry>> {
        self.store.user_ledger(user_id, clamp_limit(limit)).await
    }

    pub async fn payment_by_identifier(&self, identifier: &str) -> Result<Option<PaymentRecord>> {
        self.store.find_payment_by_identifier(identifier).await
    }

    pub async fn balance(&self, user_id: &UserId) -> Result<Option<i64>> {
        self.store.balance(user_id).await
    }

    /// Check the balance field against the ledger sum; `None` for unknown users
    pub async fn reconcile(&self, user_id: &UserId) -> Result<Option<Reconciliation>> {
        let Some(balance) = self.store.balance(user_id).await? else {
            return Ok(None);
        };
        let ledger_sum = self.store.ledger_sum(user_id).await?;
        let drift = balance.saturating_sub(ledger_sum);

        if drift != 0 {
            tracing::warn!(
                user_id = %user_id,
                balance,
                ledger_sum,
                drift,
                "Balance drift detected"
            );
        }

        Ok(Some(Reconciliation {
            user_id: user_id.clone(),
            balance,
            ledger_sum,
            drift,
        }))
    }
}
