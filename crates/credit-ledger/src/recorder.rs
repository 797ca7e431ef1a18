//! Payment Recorder
//!
//! Turns a provider-reported payment into a stored `PaymentRecord` and a
//! credit grant, exactly once per idempotency key.

use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::error::{PaymentError, Result};
use crate::model::{LedgerEntry, PaymentRecord, PaymentRequest};
use crate::store::LedgerStore;

/// Records payments and credits the paying user
pub struct PaymentRecorder {
    store: Arc<dyn LedgerStore>,
    config: LedgerConfig,
}

impl PaymentRecorder {
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub const fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Record a paid payment.
    ///
    /// With an `identifier`, replays (sequential or concurrent) return the
    /// first stored record and credit the user only once. Without one, every
    /// call is an independent credit event. Store failures propagate so the
    /// caller can ask the provider to redeliver.
    pub async fn record_payment(&self, request: PaymentRequest) -> Result<PaymentRecord> {
        if request.user_id.is_blank() {
            return Err(PaymentError::InvalidInput("user_id must not be empty".into()));
        }

        let identifier = request.identifier.clone().filter(|id| !id.is_empty());

        if let Some(identifier) = identifier.as_deref() {
            if let Some(existing) = self.store.find_payment_by_identifier(identifier).await? {
                tracing::debug!(
                    identifier = %identifier,
                    payment_id = %existing.id,
                    "Duplicate payment delivery, returning stored record"
                );
                return Ok(existing);
            }
        }

        let record = PaymentRecord::paid(request);
        let credits = self.config.credits_for(record.amount_cents);
        let entry = (credits > 0).then(|| LedgerEntry::for_payment(&record, credits));

        match self.store.commit_payment(&record, entry.as_ref()).await {
            Ok(()) => {
                tracing::info!(
                    payment_id = %record.id,
                    provider = %record.provider,
                    user_id = %record.user_id,
                    amount_cents = record.amount_cents,
                    credits,
                    "Recorded payment"
                );
                Ok(record)
            }

            // A concurrent delivery committed first; hand back its record.
            Err(PaymentError::DuplicateIdentifier(identifier)) => {
                match self.store.find_payment_by_identifier(&identifier).await? {
                    Some(winner) => {
                        tracing::info!(
                            identifier = %identifier,
                            payment_id = %winner.id,
                            "Lost identifier race, returning winning record"
                        );
                        Ok(winner)
                    }
                    None => Err(PaymentError::DuplicateIdentifier(identifier)),
                }
            }

            Err(e) => {
                tracing::error!(
                    payment_id = %record.id,
                    user_id = %record.user_id,
                    error = %e,
                    "Failed to record payment"
                );
                Err(e)
            }
        }
    }
}
