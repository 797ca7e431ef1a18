//! Provider Webhook Payloads
//!
//! Known provider notification shapes, parsed at the boundary and reduced to a
//! [`PaymentRequest`]. Nothing past this module sees provider-specific data.
//!
//! Each provider's idempotency key is namespaced (`<provider>:<id>`) so ids
//! from different processors can never collide in the shared unique index.
//!
//! Signature verification is the HTTP layer's job and happens before
//! [`PaymentEvent::parse`] is called.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{PaymentError, Result};
use crate::model::{PaymentRequest, Provider, UserId};

/// Identifier that providers send either as a string or a bare number
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LooseId(pub String);

impl<'de> Deserialize<'de> for LooseId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "expected string or number identifier, got {other}"
            ))),
        }
    }
}

impl LooseId {
    fn into_inner(self) -> String {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Lemon Squeezy
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
pub struct LemonSqueezyWebhook {
    pub meta: LemonSqueezyMeta,
    pub data: LemonSqueezyOrder,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LemonSqueezyMeta {
    pub event_name: String,
    #[serde(default)]
    pub custom_data: HashMap<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LemonSqueezyOrder {
    pub id: LooseId,
    pub attributes: LemonSqueezyOrderAttributes,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LemonSqueezyOrderAttributes {
    /// Total in cents
    pub total: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
}

// ---------------------------------------------------------------------------
// Stripe
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StripeEventData {
    pub object: StripeCheckoutSession,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    #[serde(default)]
    pub amount_total: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Alipay
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
pub struct AlipayNotification {
    pub trade_no: LooseId,
    #[serde(default)]
    pub out_trade_no: Option<LooseId>,
    /// Amount in yuan, e.g. `"12.34"`
    pub total_amount: Decimal,
    pub trade_status: String,
    /// Merchant passback; carries the user id
    #[serde(default)]
    pub passback_params: Option<String>,
}

// ---------------------------------------------------------------------------
// WeChat Pay (decrypted v3 resource)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
pub struct WechatNotification {
    pub transaction_id: LooseId,
    #[serde(default)]
    pub out_trade_no: Option<LooseId>,
    pub trade_state: String,
    pub amount: WechatAmount,
    /// Merchant attach field; carries the user id
    #[serde(default)]
    pub attach: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WechatAmount {
    /// Total in fen
    pub total: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

// ---------------------------------------------------------------------------
// YeePay
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YeepayNotification {
    pub unique_order_no: LooseId,
    #[serde(default)]
    pub order_id: Option<LooseId>,
    /// Amount in yuan
    pub order_amount: Decimal,
    pub status: String,
    /// Merchant memo; carries the user id
    #[serde(default)]
    pub memo: Option<String>,
}

/// A parsed provider notification
#[derive(Clone, Debug)]
pub enum PaymentEvent {
    LemonSqueezy(LemonSqueezyWebhook),
    Stripe(StripeEvent),
    Alipay(AlipayNotification),
    Wechat(WechatNotification),
    Yeepay(YeepayNotification),
}

/// Scale a major-unit amount (yuan) to minor units. Amounts too large to
/// scale are rejected rather than clamped.
fn major_to_minor(amount: Decimal, provider: Provider) -> Result<Decimal> {
    amount.checked_mul(Decimal::from(100)).ok_or_else(|| {
        PaymentError::WebhookParse(format!("{provider} amount out of range: {amount}"))
    })
}

fn required_user(candidate: Option<String>, provider: Provider) -> Result<UserId> {
    candidate
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(UserId::from)
        .ok_or_else(|| PaymentError::WebhookParse(format!("{provider} payload carries no user id")))
}

fn namespaced(provider: Provider, id: &str) -> String {
    format!("{provider}:{id}")
}

impl PaymentEvent {
    /// Parse a JSON body in the shape `provider` sends
    pub fn parse(provider: Provider, body: &str) -> Result<Self> {
        Ok(match provider {
            Provider::LemonSqueezy => Self::LemonSqueezy(serde_json::from_str(body)?),
            Provider::Stripe => Self::Stripe(serde_json::from_str(body)?),
            Provider::Alipay => Self::Alipay(serde_json::from_str(body)?),
            Provider::Wechat => Self::Wechat(serde_json::from_str(body)?),
            Provider::Yeepay => Self::Yeepay(serde_json::from_str(body)?),
        })
    }

    pub const fn provider(&self) -> Provider {
        match self {
            Self::LemonSqueezy(_) => Provider::LemonSqueezy,
            Self::Stripe(_) => Provider::Stripe,
            Self::Alipay(_) => Provider::Alipay,
            Self::Wechat(_) => Provider::Wechat,
            Self::Yeepay(_) => Provider::Yeepay,
        }
    }

    /// Short description for logs
    pub fn kind(&self) -> String {
        match self {
            Self::LemonSqueezy(hook) => hook.meta.event_name.clone(),
            Self::Stripe(event) => event.event_type.clone(),
            Self::Alipay(n) => n.trade_status.clone(),
            Self::Wechat(n) => n.trade_state.clone(),
            Self::Yeepay(n) => n.status.clone(),
        }
    }

    /// Reduce to a payment request.
    ///
    /// Returns `Ok(None)` for notifications that do not represent a completed
    /// payment (other event types, unpaid states).
    pub fn into_request(self) -> Result<Option<PaymentRequest>> {
        let provider = self.provider();
        let request = match self {
            Self::LemonSqueezy(hook) => {
                let paid = hook.data.attributes.status.as_deref().is_none_or(|s| s == "paid");
                if hook.meta.event_name != "order_created" || !paid {
                    return Ok(None);
                }
                let user = hook
                    .meta
                    .custom_data
                    .get("user_id")
                    .and_then(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    });
                let order_id = hook.data.id.into_inner();
                let key = hook
                    .data
                    .attributes
                    .identifier
                    .clone()
                    .unwrap_or_else(|| order_id.clone());

                let user_id = required_user(user, provider)?;
                let mut request = PaymentRequest::new(provider, user_id, hook.data.attributes.total)
                    .with_identifier(namespaced(provider, &key))
                    .with_order_id(order_id);
                request.currency = hook.data.attributes.currency;
                request
            }

            Self::Stripe(event) => {
                let completed = matches!(
                    event.event_type.as_str(),
                    "checkout.session.completed" | "checkout.session.async_payment_succeeded"
                );
                let session = event.data.object;
                if !completed || session.payment_status.as_deref() != Some("paid") {
                    return Ok(None);
                }
                let user = session
                    .metadata
                    .get("user_id")
                    .cloned()
                    .or(session.client_reference_id);

                // Keyed on the session so the completed and async-succeeded
                // events for one checkout credit once.
                let mut request = PaymentRequest::new(
                    provider,
                    required_user(user, provider)?,
                    session.amount_total.unwrap_or_default(),
                )
                .with_identifier(namespaced(provider, &session.id))
                .with_order_id(session.id);
                request.currency = session.currency;
                request
            }

            Self::Alipay(n) => {
                if !matches!(n.trade_status.as_str(), "TRADE_SUCCESS" | "TRADE_FINISHED") {
                    return Ok(None);
                }
                let trade_no = n.trade_no.into_inner();
                PaymentRequest::new(
                    provider,
                    required_user(n.passback_params, provider)?,
                    major_to_minor(n.total_amount, provider)?,
                )
                .with_identifier(namespaced(provider, &trade_no))
                .with_order_id(trade_no)
                .with_currency("CNY")
            }

            Self::Wechat(n) => {
                if n.trade_state != "SUCCESS" {
                    return Ok(None);
                }
                let transaction_id = n.transaction_id.into_inner();
                let user_id = required_user(n.attach, provider)?;
                let mut request = PaymentRequest::new(provider, user_id, n.amount.total)
                    .with_identifier(namespaced(provider, &transaction_id))
                    .with_order_id(transaction_id);
                request.currency = n.amount.currency.or_else(|| Some("CNY".into()));
                request
            }

            Self::Yeepay(n) => {
                if n.status != "SUCCESS" {
                    return Ok(None);
                }
                let order_no = n.unique_order_no.into_inner();
                PaymentRequest::new(
                    provider,
                    required_user(n.memo, provider)?,
                    major_to_minor(n.order_amount, provider)?,
                )
                .with_identifier(namespaced(provider, &order_no))
                .with_order_id(order_no)
                .with_currency("CNY")
            }
        };

        Ok(Some(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn request(provider: Provider, body: &Value) -> Option<PaymentRequest> {
        PaymentEvent::parse(provider, &body.to_string())
            .unwrap()
            .into_request()
            .unwrap()
    }

    #[test]
    fn test_lemon_squeezy_order() {
        let body = json!({
            "meta": { "event_name": "order_created", "custom_data": { "user_id": "u1" } },
            "data": {
                "id": 1234,
                "attributes": { "total": 999, "currency": "USD", "status": "paid" }
            }
        });
        let req = request(Provider::LemonSqueezy, &body).unwrap();

        assert_eq!(req.user_id.as_str(), "u1");
        assert_eq!(req.amount_cents, dec!(999));
        assert_eq!(req.identifier.as_deref(), Some("lemon-squeezy:1234"));
        assert_eq!(req.provider_order_id.as_deref(), Some("1234"));
    }

    #[test]
    fn test_lemon_squeezy_other_event_is_ignored() {
        let body = json!({
            "meta": { "event_name": "subscription_updated", "custom_data": { "user_id": "u1" } },
            "data": { "id": "1", "attributes": { "total": 999 } }
        });
        assert!(request(Provider::LemonSqueezy, &body).is_none());
    }

    #[test]
    fn test_stripe_checkout_completed() {
        let body = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_1",
                "amount_total": 2900,
                "currency": "usd",
                "payment_status": "paid",
                "client_reference_id": "u7"
            } }
        });
        let req = request(Provider::Stripe, &body).unwrap();

        assert_eq!(req.user_id.as_str(), "u7");
        assert_eq!(req.amount_cents, dec!(2900));
        assert_eq!(req.identifier.as_deref(), Some("stripe:cs_test_1"));
        assert_eq!(req.currency.as_deref(), Some("usd"));
    }

    #[test]
    fn test_stripe_unpaid_session_is_ignored() {
        let body = json!({
            "id": "evt_2",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_2",
                "payment_status": "unpaid",
                "metadata": { "user_id": "u1" }
            } }
        });
        assert!(request(Provider::Stripe, &body).is_none());
    }

    #[test]
    fn test_alipay_major_units() {
        let body = json!({
            "trade_no": 2_024_101_922_001_u64,
            "out_trade_no": "order-9",
            "total_amount": "12.34",
            "trade_status": "TRADE_SUCCESS",
            "passback_params": "u3"
        });
        let req = request(Provider::Alipay, &body).unwrap();

        assert_eq!(req.amount_cents, dec!(1234));
        assert_eq!(req.provider_order_id.as_deref(), Some("2024101922001"));
        assert_eq!(req.identifier.as_deref(), Some("alipay:2024101922001"));
        assert_eq!(req.currency.as_deref(), Some("CNY"));
    }

    #[test]
    fn test_oversized_major_amount_is_rejected() {
        let alipay = json!({
            "trade_no": "2",
            "total_amount": "79228162514264337593543950335",
            "trade_status": "TRADE_SUCCESS",
            "passback_params": "u3"
        });
        let result = PaymentEvent::parse(Provider::Alipay, &alipay.to_string())
            .unwrap()
            .into_request();
        assert!(matches!(result, Err(PaymentError::WebhookParse(_))));

        let yeepay = json!({
            "uniqueOrderNo": "1014",
            "orderAmount": "79228162514264337593543950335",
            "status": "SUCCESS",
            "memo": "u5"
        });
        let result = PaymentEvent::parse(Provider::Yeepay, &yeepay.to_string())
            .unwrap()
            .into_request();
        assert!(matches!(result, Err(PaymentError::WebhookParse(_))));
    }

    #[test]
    fn test_wechat_success() {
        let body = json!({
            "transaction_id": "4200001",
            "trade_state": "SUCCESS",
            "amount": { "total": 100, "currency": "CNY" },
            "attach": "u4"
        });
        let req = request(Provider::Wechat, &body).unwrap();
        assert_eq!(req.amount_cents, dec!(100));
        assert_eq!(req.identifier.as_deref(), Some("wechat:4200001"));
    }

    #[test]
    fn test_yeepay_pending_is_ignored() {
        let body = json!({
            "uniqueOrderNo": "1013",
            "orderAmount": 5,
            "status": "PROCESSING",
            "memo": "u5"
        });
        assert!(request(Provider::Yeepay, &body).is_none());
    }

    #[test]
    fn test_missing_user_is_parse_error() {
        let body = json!({
            "transaction_id": "4200002",
            "trade_state": "SUCCESS",
            "amount": { "total": 100 }
        });
        let result = PaymentEvent::parse(Provider::Wechat, &body.to_string())
            .unwrap()
            .into_request();
        assert!(matches!(result, Err(PaymentError::WebhookParse(_))));
    }

    #[test]
    fn test_malformed_body() {
        let result = PaymentEvent::parse(Provider::Stripe, "{not json");
        assert!(matches!(result, Err(PaymentError::WebhookParse(_))));

        let wrong_shape = PaymentEvent::parse(Provider::Alipay, r#"{"trade_no": true}"#);
        assert!(wrong_shape.is_err());
    }
}
