//! Admin Credit Adjustment
//!
//! Manual credit grants and deductions, gated by the server-held admin key.
//! There is no idempotency key on this path: every authorized call mutates.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::error::{PaymentError, Result};
use crate::model::{LedgerEntry, UserId};
use crate::store::LedgerStore;

/// Result of a successful adjustment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentOutcome {
    /// Balance after the adjustment
    pub credits: i64,
}

/// Applies operator-initiated credit changes
pub struct CreditAdjuster {
    store: Arc<dyn LedgerStore>,
    config: LedgerConfig,
}

impl CreditAdjuster {
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Add `delta` (possibly negative) to a user's balance.
    ///
    /// Fails closed on a wrong or unconfigured key. The balance change is an
    /// atomic increment at the store, so concurrent adjustments never lose
    /// updates.
    pub async fn adjust_credits(
        &self,
        user_id: &UserId,
        delta: i64,
        reason: &str,
        admin_key: &str,
    ) -> Result<AdjustmentOutcome> {
        if !self.config.verify_admin_key(admin_key) {
            tracing::warn!(user_id = %user_id, "Rejected credit adjustment with invalid admin key");
            return Err(PaymentError::Unauthorized("invalid admin key".into()));
        }

        if user_id.is_blank() {
            return Err(PaymentError::InvalidInput("user_id must not be empty".into()));
        }
        if delta == 0 {
            return Err(PaymentError::InvalidInput("delta must be non-zero".into()));
        }

        let reason = match reason.trim() {
            "" => "Admin adjustment",
            r => r,
        };
        let entry = LedgerEntry::admin(user_id.clone(), delta, reason);
        let credits = self.store.apply_adjustment(&entry).await?;

        tracing::info!(
            user_id = %user_id,
            delta,
            credits,
            reference = %entry.ref_,
            "Applied admin credit adjustment"
        );

        Ok(AdjustmentOutcome { credits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LedgerSource;
    use crate::store::MemoryLedgerStore;

    const KEY: &str = "correct-key";

    async fn setup(start: i64) -> (Arc<MemoryLedgerStore>, CreditAdjuster) {
        let store = Arc::new(MemoryLedgerStore::new().with_user("u1", start).await);
        let adjuster = CreditAdjuster::new(store.clone(), LedgerConfig::new(100, KEY));
        (store, adjuster)
    }

    #[tokio::test]
    async fn test_wrong_key_changes_nothing() {
        let (store, adjuster) = setup(0).await;
        let user = UserId::new("u1");

        let result = adjuster.adjust_credits(&user, 10, "bonus", "wrong-key").await;

        assert!(matches!(result, Err(PaymentError::Unauthorized(_))));
        assert_eq!(store.balance(&user).await.unwrap(), Some(0));
        assert!(store.user_ledger(&user, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_correct_key_grants_credits() {
        let (store, adjuster) = setup(0).await;
        let user = UserId::new("u1");

        let outcome = adjuster.adjust_credits(&user, 10, "bonus", KEY).await.unwrap();

        assert_eq!(outcome.credits, 10);
        let ledger = store.user_ledger(&user, 10).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].source, LedgerSource::Admin);
        assert_eq!(ledger[0].reason, "bonus");
        assert!(ledger[0].ref_.starts_with("admin:"));
    }

    #[tokio::test]
    async fn test_negative_adjustment() {
        let (store, adjuster) = setup(100).await;
        let user = UserId::new("u1");

        let outcome = adjuster.adjust_credits(&user, -30, "refund", KEY).await.unwrap();

        assert_eq!(outcome.credits, 70);
        assert_eq!(store.ledger_sum(&user).await.unwrap(), 70);
    }

    #[tokio::test]
    async fn test_unconfigured_key_fails_closed() {
        let store = Arc::new(MemoryLedgerStore::new().with_user("u1", 0).await);
        let adjuster = CreditAdjuster::new(store.clone(), LedgerConfig::default());

        let result = adjuster.adjust_credits(&UserId::new("u1"), 10, "bonus", "").await;
        assert!(matches!(result, Err(PaymentError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_unknown_user_and_zero_delta() {
        let (_store, adjuster) = setup(0).await;

        let missing = adjuster.adjust_credits(&UserId::new("ghost"), 10, "bonus", KEY).await;
        assert!(matches!(missing, Err(PaymentError::UserNotFound(_))));

        let zero = adjuster.adjust_credits(&UserId::new("u1"), 0, "noop", KEY).await;
        assert!(matches!(zero, Err(PaymentError::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adjustments_do_not_lose_updates() {
        let (store, adjuster) = setup(0).await;
        let adjuster = Arc::new(adjuster);

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let adjuster = adjuster.clone();
                tokio::spawn(async move {
                    adjuster.adjust_credits(&UserId::new("u1"), 5, "promo", KEY).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let user = UserId::new("u1");
        assert_eq!(store.balance(&user).await.unwrap(), Some(100));
        assert_eq!(store.user_ledger(&user, 100).await.unwrap().len(), 20);
    }
}
