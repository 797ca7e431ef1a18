//! In-memory ledger store (for development and tests)

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::LedgerStore;
use crate::error::{PaymentError, Result};
use crate::model::{LedgerEntry, PaymentRecord, UserId};

#[derive(Default)]
struct Inner {
    payments: Vec<PaymentRecord>,
    by_identifier: HashMap<String, usize>,
    ledger: Vec<LedgerEntry>,
    balances: HashMap<UserId, i64>,
}

/// In-memory ledger store.
///
/// A single lock guards all three collections, so the identifier check and
/// the payment, ledger and balance writes happen as one unit.
#[derive(Default)]
pub struct MemoryLedgerStore {
    inner: RwLock<Inner>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user with a starting balance and a matching `system` entry
    pub async fn with_user(self, user_id: impl Into<UserId>, credits: i64) -> Self {
        let user_id = user_id.into();
        {
            let mut inner = self.inner.write().await;
            if credits != 0 {
                inner.ledger.push(LedgerEntry {
                    id: crate::model::LedgerEntryId::new(),
                    user_id: user_id.clone(),
                    delta: credits,
                    reason: "Opening balance".into(),
                    source: crate::model::LedgerSource::System,
                    ref_: "system:opening".into(),
                    created_at: chrono::Utc::now(),
                });
            }
            inner.balances.insert(user_id, credits);
        }
        self
    }
}

fn newest_first<T, F>(items: impl DoubleEndedIterator<Item = T>, limit: usize, created: F) -> Vec<T>
where
    F: Fn(&T) -> chrono::DateTime<chrono::Utc>,
{
    let mut out: Vec<T> = items.rev().collect();
    out.sort_by_key(|item| std::cmp::Reverse(created(item)));
    out.truncate(limit);
    out
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn find_payment_by_identifier(&self, identifier: &str) -> Result<Option<PaymentRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_identifier
            .get(identifier)
            .map(|&idx| inner.payments[idx].clone()))
    }

    async fn commit_payment(
        &self,
        record: &PaymentRecord,
        credit: Option<&LedgerEntry>,
    ) -> Result<()> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        if let Some(identifier) = &record.identifier {
            if inner.by_identifier.contains_key(identifier) {
                return Err(PaymentError::DuplicateIdentifier(identifier.clone()));
            }
            let idx = inner.payments.len();
            inner.by_identifier.insert(identifier.clone(), idx);
        }
        inner.payments.push(record.clone());

        let balance = inner.balances.entry(record.user_id.clone()).or_insert(0);
        if let Some(entry) = credit {
            *balance = balance.saturating_add(entry.delta);
            inner.ledger.push(entry.clone());
        }

        Ok(())
    }

    async fn apply_adjustment(&self, entry: &LedgerEntry) -> Result<i64> {
        let mut inner = self.inner.write().await;

        let balance = inner
            .balances
            .get_mut(&entry.user_id)
            .ok_or_else(|| PaymentError::UserNotFound(entry.user_id.to_string()))?;
        *balance = balance.saturating_add(entry.delta);
        let new_balance = *balance;

        inner.ledger.push(entry.clone());
        Ok(new_balance)
    }

    async fn balance(&self, user_id: &UserId) -> Result<Option<i64>> {
        Ok(self.inner.read().await.balances.get(user_id).copied())
    }

    async fn ledger_sum(&self, user_id: &UserId) -> Result<i64> {
        let inner = self.inner.read().await;
        Ok(inner
            .ledger
            .iter()
            .filter(|e| &e.user_id == user_id)
            .fold(0i64, |acc, e| acc.saturating_add(e.delta)))
    }

    async fn recent_payments(&self, limit: usize) -> Result<Vec<PaymentRecord>> {
        let inner = self.inner.read().await;
        Ok(newest_first(inner.payments.iter().cloned(), limit, |p| p.created_at))
    }

    async fn user_payments(&self, user_id: &UserId, limit: usize) -> Result<Vec<PaymentRecord>> {
        let inner = self.inner.read().await;
        let matching = inner
            .payments
            .iter()
            .filter(|p| &p.user_id == user_id)
            .cloned();
        Ok(newest_first(matching, limit, |p| p.created_at))
    }

    async fn user_ledger(&self, user_id: &UserId, limit: usize) -> Result<Vec<LedgerEntry>> {
        let inner = self.inner.read().await;
        let matching = inner
            .ledger
            .iter()
            .filter(|e| &e.user_id == user_id)
            .cloned();
        Ok(newest_first(matching, limit, |e| e.created_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PaymentRequest, Provider};
    use rust_decimal_macros::dec;

    fn payment(user: &str, identifier: Option<&str>) -> PaymentRecord {
        let mut request = PaymentRequest::new(Provider::LemonSqueezy, user, dec!(500));
        request.identifier = identifier.map(String::from);
        PaymentRecord::paid(request)
    }

    #[tokio::test]
    async fn test_identifier_is_unique() {
        let store = MemoryLedgerStore::new();
        let first = payment("u1", Some("evt_1"));
        let second = payment("u1", Some("evt_1"));

        store.commit_payment(&first, None).await.unwrap();
        let err = store.commit_payment(&second, None).await.unwrap_err();
        assert!(matches!(err, PaymentError::DuplicateIdentifier(ref id) if id == "evt_1"));

        let found = store.find_payment_by_identifier("evt_1").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert_eq!(store.recent_payments(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_commit_writes_nothing() {
        let store = MemoryLedgerStore::new();
        let first = payment("u1", Some("evt_1"));
        let entry = LedgerEntry::for_payment(&first, 500);
        store.commit_payment(&first, Some(&entry)).await.unwrap();

        let dup = payment("u1", Some("evt_1"));
        let dup_entry = LedgerEntry::for_payment(&dup, 500);
        assert!(store.commit_payment(&dup, Some(&dup_entry)).await.is_err());

        let user = UserId::new("u1");
        assert_eq!(store.balance(&user).await.unwrap(), Some(500));
        assert_eq!(store.user_ledger(&user, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_payments_without_identifier_never_conflict() {
        let store = MemoryLedgerStore::new();
        store.commit_payment(&payment("u1", None), None).await.unwrap();
        store.commit_payment(&payment("u1", None), None).await.unwrap();
        assert_eq!(store.recent_payments(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_adjustment_requires_user() {
        let store = MemoryLedgerStore::new();
        let entry = LedgerEntry::admin(UserId::new("ghost"), 10, "bonus");
        let err = store.apply_adjustment(&entry).await.unwrap_err();
        assert!(matches!(err, PaymentError::UserNotFound(_)));
        assert_eq!(store.ledger_sum(&UserId::new("ghost")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seeded_user_reconciles() {
        let store = MemoryLedgerStore::new().with_user("u1", 40).await;
        let user = UserId::new("u1");
        assert_eq!(store.balance(&user).await.unwrap(), Some(40));
        assert_eq!(store.ledger_sum(&user).await.unwrap(), 40);

        let balance = store
            .apply_adjustment(&LedgerEntry::admin(user.clone(), -15, "refund"))
            .await
            .unwrap();
        assert_eq!(balance, 25);
        assert_eq!(store.ledger_sum(&user).await.unwrap(), 25);
    }

    #[tokio::test]
    async fn test_listing_is_newest_first_and_limited() {
        let store = MemoryLedgerStore::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let record = payment(if i % 2 == 0 { "u1" } else { "u2" }, None);
            ids.push(record.id);
            store.commit_payment(&record, None).await.unwrap();
            tokio::task::yield_now().await;
        }

        let recent = store.recent_payments(3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, ids[4]);
        assert!(recent.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let u2 = store.user_payments(&UserId::new("u2"), 10).await.unwrap();
        assert_eq!(u2.iter().map(|p| p.id).collect::<Vec<_>>(), vec![ids[3], ids[1]]);
    }
}
