//! Ledger Configuration
//!
//! The credit conversion rate and admin key are the only tunables. They are
//! gathered once into a [`LedgerConfig`] and handed to the recorder and the
//! adjuster rather than read from the environment on every call.

use crate::error::{PaymentError, Result};

/// Default credits granted per major currency unit ($1 = 100 credits)
pub const DEFAULT_CREDITS_PER_UNIT: u32 = 100;

/// Ledger configuration
#[derive(Clone)]
pub struct LedgerConfig {
    /// Credits granted per major currency unit (per 100 minor units)
    pub credits_per_unit: u32,

    /// Server-held secret for manual credit adjustments.
    /// `None` disables the admin path entirely.
    pub admin_key: Option<String>,
}

impl std::fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("credits_per_unit", &self.credits_per_unit)
            .field("admin_key", &self.admin_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            credits_per_unit: DEFAULT_CREDITS_PER_UNIT,
            admin_key: None,
        }
    }
}

impl LedgerConfig {
    pub fn new(credits_per_unit: u32, admin_key: impl Into<String>) -> Self {
        Self {
            credits_per_unit,
            admin_key: Some(admin_key.into()),
        }
    }

    /// Create from environment variables (`CREDITS_PER_UNIT`, `ADMIN_KEY`)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credits_per_unit = match lookup("CREDITS_PER_UNIT") {
            Some(raw) if !raw.trim().is_empty() => raw.trim().parse::<u32>().map_err(|e| {
                PaymentError::Config(format!(
                    "CREDITS_PER_UNIT must be a non-negative integer: {e}"
                ))
            })?,
            _ => DEFAULT_CREDITS_PER_UNIT,
        };

        let admin_key = lookup("ADMIN_KEY").filter(|key| !key.is_empty());
        if admin_key.is_none() {
            tracing::warn!("ADMIN_KEY not set - admin credit adjustments disabled");
        }

        Ok(Self {
            credits_per_unit,
            admin_key,
        })
    }

    /// Convert a paid amount in minor units into credits.
    ///
    /// `floor((amount_cents / 100) * credits_per_unit)`, computed exactly in
    /// integers. Non-positive amounts yield zero.
    pub fn credits_for(&self, amount_cents: i64) -> i64 {
        if amount_cents <= 0 {
            return 0;
        }
        let credits = i128::from(amount_cents) * i128::from(self.credits_per_unit) / 100;
        i64::try_from(credits).unwrap_or(i64::MAX)
    }

    /// Constant-time comparison against the configured admin key
    pub fn verify_admin_key(&self, candidate: &str) -> bool {
        let Some(expected) = self.admin_key.as_deref() else {
            return false;
        };
        let (a, b) = (expected.as_bytes(), candidate.as_bytes());
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_conversion() {
        assert_eq!(LedgerConfig::default().credits_for(999), 999);
        assert_eq!(LedgerConfig::new(50, "k").credits_for(150), 75);
        assert_eq!(LedgerConfig::new(1, "k").credits_for(99), 0);
        assert_eq!(LedgerConfig::default().credits_for(-500), 0);
        assert_eq!(LedgerConfig::new(u32::MAX, "k").credits_for(i64::MAX), i64::MAX);
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.credits_per_unit, DEFAULT_CREDITS_PER_UNIT);
        assert!(config.admin_key.is_none());
    }

    #[test]
    fn test_from_lookup_values() {
        let vars = [("CREDITS_PER_UNIT", " 250 "), ("ADMIN_KEY", "s3cret")];
        let config = LedgerConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.credits_per_unit, 250);
        assert_eq!(config.admin_key.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_from_lookup_rejects_bad_rate() {
        let result = LedgerConfig::from_lookup(lookup(&[("CREDITS_PER_UNIT", "-3")]));
        assert!(matches!(result, Err(PaymentError::Config(_))));
    }

    #[test]
    fn test_debug_redacts_admin_key() {
        let printed = format!("{:?}", LedgerConfig::new(100, "s3cret-key"));
        assert!(!printed.contains("s3cret-key"));
        assert!(printed.contains("[REDACTED]"));
        assert!(printed.contains("credits_per_unit: 100"));
    }

    #[test]
    fn test_admin_key_verification() {
        let config = LedgerConfig::new(100, "correct-key");
        assert!(config.verify_admin_key("correct-key"));
        assert!(!config.verify_admin_key("wrong-key!!"));
        assert!(!config.verify_admin_key("short"));
        assert!(!LedgerConfig::default().verify_admin_key(""));
    }
}
