//! Domain Models
//!
//! Payment records, ledger entries and the identifiers tying them to users.
//! Amounts are stored as integer minor units; inbound amounts arrive as
//! `Decimal` and are normalized here, never through f64.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Currency assumed when a provider does not report one
pub const DEFAULT_CURRENCY: &str = "USD";

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique payment record identifier
    PaymentId
);

uuid_id!(
    /// Unique ledger entry identifier
    LedgerEntryId
);

/// User identifier as issued by the auth layer
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Payment processors we accept events from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    LemonSqueezy,
    Alipay,
    Stripe,
    Wechat,
    Yeepay,
}

impl Provider {
    pub const ALL: [Self; 5] = [
        Self::LemonSqueezy,
        Self::Alipay,
        Self::Stripe,
        Self::Wechat,
        Self::Yeepay,
    ];

    /// Wire tag (also the stored column value)
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LemonSqueezy => "lemon-squeezy",
            Self::Alipay => "alipay",
            Self::Stripe => "stripe",
            Self::Wechat => "wechat",
            Self::Yeepay => "yeepay",
        }
    }

    /// Human-readable name used in ledger reasons
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::LemonSqueezy => "Lemon Squeezy",
            Self::Alipay => "Alipay",
            Self::Stripe => "Stripe",
            Self::Wechat => "WeChat Pay",
            Self::Yeepay => "YeePay",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "lemon-squeezy" | "lemonsqueezy" => Some(Self::LemonSqueezy),
            "alipay" => Some(Self::Alipay),
            "stripe" => Some(Self::Stripe),
            "wechat" | "wechat-pay" | "wechatpay" => Some(Self::Wechat),
            "yeepay" => Some(Self::Yeepay),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "refunded" => Some(Self::Refunded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Origin of a ledger entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerSource {
    Webhook,
    Admin,
    System,
}

impl LedgerSource {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "webhook" => Some(Self::Webhook),
            "admin" => Some(Self::Admin),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Clamp an inbound amount to a non-negative whole number of minor units
pub fn normalize_amount_cents(amount: Decimal) -> i64 {
    if amount.is_sign_negative() {
        return 0;
    }
    amount.floor().to_i64().unwrap_or(i64::MAX)
}

/// Normalize a currency code, falling back to USD
pub fn normalize_currency(currency: Option<&str>) -> String {
    match currency.map(str::trim) {
        Some(code) if !code.is_empty() => code.to_uppercase(),
        _ => DEFAULT_CURRENCY.to_string(),
    }
}

/// A strongly-typed payment event handed to the recorder
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Processor that reported the payment
    pub provider: Provider,

    /// User to credit
    pub user_id: UserId,

    /// Paid amount in minor units (may be fractional or negative on input)
    pub amount_cents: Decimal,

    /// Idempotency key, usually the provider's event ID
    #[serde(default)]
    pub identifier: Option<String>,

    /// Provider-assigned order or transaction ID
    #[serde(default)]
    pub provider_order_id: Option<String>,

    #[serde(default)]
    pub currency: Option<String>,

    /// Original payload, kept for audit
    #[serde(default)]
    pub raw: Option<serde_json::Value>,
}

impl PaymentRequest {
    pub fn new(provider: Provider, user_id: impl Into<UserId>, amount_cents: Decimal) -> Self {
        Self {
            provider,
            user_id: user_id.into(),
            amount_cents,
            identifier: None,
            provider_order_id: None,
            currency: None,
            raw: None,
        }
    }

    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    #[must_use]
    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.provider_order_id = Some(order_id.into());
        self
    }

    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    #[must_use]
    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

/// A persisted payment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub provider: Provider,
    pub provider_order_id: Option<String>,

    /// Idempotency key; unique across all records when present
    pub identifier: Option<String>,

    pub user_id: UserId,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,

    /// Opaque provider payload, not interpreted
    pub raw: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Build a `paid` record from a request, normalizing amount and currency
    pub fn paid(request: PaymentRequest) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            provider: request.provider,
            provider_order_id: request.provider_order_id,
            identifier: request.identifier.filter(|id| !id.is_empty()),
            user_id: request.user_id,
            amount_cents: normalize_amount_cents(request.amount_cents),
            currency: normalize_currency(request.currency.as_deref()),
            status: PaymentStatus::Paid,
            raw: request.raw,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reference written to the ledger: the idempotency key, else our own id
    pub fn ledger_ref(&self) -> String {
        self.identifier
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// An append-only credit movement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub user_id: UserId,

    /// Signed credit change
    pub delta: i64,

    pub reason: String,
    pub source: LedgerSource,

    /// Correlating reference (payment identifier or `admin:<millis>`)
    #[serde(rename = "ref")]
    pub ref_: String,

    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Credit grant derived from a recorded payment
    pub fn for_payment(record: &PaymentRecord, credits: i64) -> Self {
        Self {
            id: LedgerEntryId::new(),
            user_id: record.user_id.clone(),
            delta: credits,
            reason: format!("{} payment", record.provider.display_name()),
            source: LedgerSource::Webhook,
            ref_: record.ledger_ref(),
            created_at: record.created_at,
        }
    }

    /// Manual adjustment by an operator
    pub fn admin(user_id: UserId, delta: i64, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: LedgerEntryId::new(),
            user_id,
            delta,
            reason: reason.into(),
            source: LedgerSource::Admin,
            ref_: format!("admin:{}", now.timestamp_millis()),
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_normalization() {
        assert_eq!(normalize_amount_cents(dec!(500)), 500);
        assert_eq!(normalize_amount_cents(dec!(999.99)), 999);
        assert_eq!(normalize_amount_cents(dec!(-500)), 0);
        assert_eq!(normalize_amount_cents(dec!(-0.5)), 0);
        assert_eq!(normalize_amount_cents(Decimal::ZERO), 0);
    }

    #[test]
    fn test_currency_defaults_to_usd() {
        assert_eq!(normalize_currency(None), "USD");
        assert_eq!(normalize_currency(Some("  ")), "USD");
        assert_eq!(normalize_currency(Some("cny")), "CNY");
    }

    #[test]
    fn test_paid_record() {
        let request = PaymentRequest::new(Provider::Alipay, "u1", dec!(150.7))
            .with_identifier("evt_9")
            .with_order_id("2024");
        let record = PaymentRecord::paid(request);

        assert_eq!(record.status, PaymentStatus::Paid);
        assert_eq!(record.amount_cents, 150);
        assert_eq!(record.currency, "USD");
        assert_eq!(record.ledger_ref(), "evt_9");
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_ledger_ref_falls_back_to_id() {
        let record = PaymentRecord::paid(
            PaymentRequest::new(Provider::Stripe, "u1", dec!(100)).with_identifier(""),
        );
        assert!(record.identifier.is_none());
        assert_eq!(record.ledger_ref(), record.id.to_string());
    }

    #[test]
    fn test_admin_entry_ref() {
        let entry = LedgerEntry::admin(UserId::new("u1"), -5, "chargeback");
        assert_eq!(entry.source, LedgerSource::Admin);
        assert!(entry.ref_.starts_with("admin:"));
        assert_eq!(entry.delta, -5);
    }

    #[test]
    fn test_provider_tags() {
        for provider in Provider::ALL {
            assert_eq!(Provider::parse(provider.as_str()), Some(provider));
            let json = serde_json::to_value(provider).unwrap();
            assert_eq!(json, serde_json::json!(provider.as_str()));
        }
        assert_eq!(Provider::parse("lemon_squeezy"), Some(Provider::LemonSqueezy));
        assert_eq!(Provider::parse("paypal"), None);
    }

    #[test]
    fn test_ledger_entry_serializes_ref() {
        let entry = LedgerEntry::admin(UserId::new("u1"), 10, "bonus");
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("ref").is_some());
        assert_eq!(json["source"], "admin");
        assert_eq!(json["userId"], "u1");
    }
}
