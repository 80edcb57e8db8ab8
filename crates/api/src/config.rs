//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use domain::{Currency, Money, PricingPolicy};
use payments::{CoordinatorSettings, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration with defaults for every setting.
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Unset means the in-memory event store.
    pub database_url: Option<String>,
    /// JSON product list. Unset means an empty catalog.
    pub catalog_path: Option<PathBuf>,
    pub currency: Currency,
    pub pricing: PricingPolicy,
    pub provider_timeout: Duration,
    pub provider_max_retries: usize,
    pub intent_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let lookup = &lookup;
        let cents = |key: &str, default: Money| {
            parse_var(lookup, key)
                .map(Money::from_cents)
                .unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref().map(str::trim) {
                Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            catalog_path: lookup("CATALOG_PATH")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
            currency: parse_var(lookup, "CURRENCY").unwrap_or(defaults.currency),
            pricing: PricingPolicy {
                free_shipping_threshold: cents(
                    "FREE_SHIPPING_THRESHOLD_CENTS",
                    defaults.pricing.free_shipping_threshold,
                ),
                standard_shipping: cents(
                    "STANDARD_SHIPPING_CENTS",
                    defaults.pricing.standard_shipping,
                ),
                express_shipping: cents("EXPRESS_SHIPPING_CENTS", defaults.pricing.express_shipping),
                tax_rate_bps: parse_var(lookup, "TAX_RATE_BPS").unwrap_or(defaults.pricing.tax_rate_bps),
            },
            provider_timeout: parse_var(lookup, "PROVIDER_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.provider_timeout),
            provider_max_retries: parse_var(lookup, "PROVIDER_MAX_RETRIES")
                .unwrap_or(defaults.provider_max_retries),
            intent_ttl: parse_var(lookup, "PAYMENT_INTENT_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.intent_ttl),
            sweep_interval: parse_var::<u64>(lookup, "INTENT_SWEEP_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            retry: RetryPolicy {
                timeout: self.provider_timeout,
                max_retries: self.provider_max_retries,
                ..RetryPolicy::default()
            },
            intent_ttl: self.intent_ttl,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        let payments = CoordinatorSettings::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            catalog_path: None,
            currency: Currency::usd(),
            pricing: PricingPolicy::default(),
            provider_timeout: retry.timeout,
            provider_max_retries: retry.max_retries,
            intent_ttl: payments.intent_ttl,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]);
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert!(config.catalog_path.is_none());
        assert_eq!(config.currency, Currency::usd());
        assert_eq!(config.pricing, PricingPolicy::default());
        assert_eq!(config.provider_timeout, Duration::from_secs(5));
        assert_eq!(config.provider_max_retries, 3);
        assert_eq!(config.intent_ttl, Duration::from_secs(1800));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn reads_every_setting() {
        let config = config_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/pets"),
            ("CATALOG_PATH", "fixtures/catalog.json"),
            ("CURRENCY", "eur"),
            ("FREE_SHIPPING_THRESHOLD_CENTS", "10000"),
            ("STANDARD_SHIPPING_CENTS", "499"),
            ("EXPRESS_SHIPPING_CENTS", "999"),
            ("TAX_RATE_BPS", "2000"),
            ("PROVIDER_TIMEOUT_MS", "250"),
            ("PROVIDER_MAX_RETRIES", "1"),
            ("PAYMENT_INTENT_TTL_SECS", "60"),
            ("INTENT_SWEEP_INTERVAL_SECS", "5"),
        ]);

        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/pets"));
        assert_eq!(
            config.catalog_path,
            Some(PathBuf::from("fixtures/catalog.json"))
        );
        assert_eq!(config.currency.to_string(), "EUR");
        assert_eq!(config.pricing.free_shipping_threshold, Money::from_cents(10_000));
        assert_eq!(config.pricing.standard_shipping, Money::from_cents(499));
        assert_eq!(config.pricing.express_shipping, Money::from_cents(999));
        assert_eq!(config.pricing.tax_rate_bps, 2000);

        let settings = config.coordinator_settings();
        assert_eq!(settings.retry.timeout, Duration::from_millis(250));
        assert_eq!(settings.retry.max_retries, 1);
        assert_eq!(settings.intent_ttl, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
    }

    #[test]
    fn bad_values_fall_back() {
        let config = config_from(&[
            ("PORT", "not-a-port"),
            ("CURRENCY", "DOLLARS"),
            ("TAX_RATE_BPS", "-5"),
            ("INTENT_SWEEP_INTERVAL_SECS", "0"),
            ("DATABASE_URL", "  "),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.currency, Currency::usd());
        assert_eq!(config.pricing.tax_rate_bps, 800);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert!(config.database_url.is_none());
    }
}
