//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! Loading and validation errors surface as
//! [`MarketDataError::Configuration`] and are fatal at startup.

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::clock::MAX_CONFIGURED_SECS;
use crate::errors::MarketDataError;
use crate::provider::{self, EndpointTemplate};
use crate::registry::{CircuitBreakerConfig, GovernorConfig, QualityConfig, ValidatorConfig};

/// Per-provider overrides.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    pub enabled: bool,
    /// Overrides the provider's static priority. Lower is preferred.
    pub priority: Option<i32>,
    pub realtime_template: Option<String>,
    pub series_template: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: None,
            realtime_template: None,
            series_template: None,
        }
    }
}

/// Realtime cross-validation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrossValidationConfig {
    /// Number of providers raced concurrently.
    pub width: usize,
    /// Relative deviation from the mean above which outliers are rejected.
    pub max_deviation: Decimal,
    /// Per-call timeout applied inside the governed slot.
    pub call_timeout_ms: u64,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            width: 2,
            max_deviation: Decimal::new(5, 2),
            call_timeout_ms: 10_000,
        }
    }
}

impl CrossValidationConfig {
    pub fn call_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketDataConfig {
    /// Keyed by provider id (`SINA`, `TENCENT`, `EASTMONEY`).
    pub providers: BTreeMap<String, ProviderSettings>,
    pub circuit_breaker: CircuitBreakerConfig,
    pub governor: GovernorConfig,
    pub validation: ValidatorConfig,
    pub quality: QualityConfig,
    pub cross_validation: CrossValidationConfig,
}

impl MarketDataConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, MarketDataError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| MarketDataError::Configuration(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MarketDataError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MarketDataError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    /// Settings for one provider, defaulted when absent.
    pub fn provider(&self, id: &str) -> ProviderSettings {
        self.providers.get(id).cloned().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), MarketDataError> {
        for (id, settings) in &self.providers {
            if !provider::KNOWN_PROVIDERS.contains(&id.as_str()) {
                return Err(MarketDataError::Configuration(format!(
                    "unknown provider '{}' (known: {})",
                    id,
                    provider::KNOWN_PROVIDERS.join(", ")
                )));
            }
            for template in [&settings.realtime_template, &settings.series_template]
                .into_iter()
                .flatten()
            {
                EndpointTemplate::parse(template)?;
            }
        }

        if !provider::KNOWN_PROVIDERS
            .iter()
            .any(|id| self.provider(id).enabled)
        {
            return Err(MarketDataError::Configuration(
                "every provider is disabled".to_string(),
            ));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(MarketDataError::Configuration(
                "circuit breaker failure threshold must be at least 1".to_string(),
            ));
        }

        let cv = &self.cross_validation;
        if cv.width == 0 {
            return Err(MarketDataError::Configuration(
                "cross-validation width must be at least 1".to_string(),
            ));
        }
        if cv.max_deviation <= Decimal::ZERO {
            return Err(MarketDataError::Configuration(
                "cross-validation max deviation must be positive".to_string(),
            ));
        }
        if cv.call_timeout_ms == 0 || cv.call_timeout_ms > MAX_CONFIGURED_SECS * 1000 {
            return Err(MarketDataError::Configuration(format!(
                "call timeout must be between 1ms and {}s",
                MAX_CONFIGURED_SECS
            )));
        }

        for (name, secs) in [
            ("circuitBreaker.cooldownSecs", self.circuit_breaker.cooldown_secs),
            ("governor.adjustWindowSecs", self.governor.adjust_window_secs),
            ("quality.windowSecs", self.quality.window_secs),
            ("validation.baselineTtlSecs", self.validation.baseline_ttl_secs),
        ] {
            if !(1..=MAX_CONFIGURED_SECS).contains(&secs) {
                return Err(MarketDataError::Configuration(format!(
                    "{} must be between 1 and {} seconds, got {}",
                    name, MAX_CONFIGURED_SECS, secs
                )));
            }
        }

        self.governor.validate()?;
        self.validation.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_object_is_default() {
        let config = MarketDataConfig::from_json_str("{}").unwrap();
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.circuit_breaker.cooldown_secs, 600);
        assert_eq!(config.governor.initial_max_concurrent, 3);
        assert_eq!(config.cross_validation.width, 2);
        assert_eq!(config.cross_validation.max_deviation, dec!(0.05));
        assert!(config.provider("SINA").enabled);
    }

    #[test]
    fn test_camel_case_overrides() {
        let config = MarketDataConfig::from_json_str(
            r#"{
                "providers": {
                    "TENCENT": { "priority": 0 },
                    "EASTMONEY": { "enabled": false }
                },
                "circuitBreaker": { "cooldownSecs": 60 },
                "validation": { "maxChangeRatio": "0.15" },
                "crossValidation": { "callTimeoutMs": 5000 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.provider("TENCENT").priority, Some(0));
        assert!(!config.provider("EASTMONEY").enabled);
        assert_eq!(config.circuit_breaker.cooldown_secs, 60);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.validation.max_change_ratio, dec!(0.15));
        assert_eq!(config.cross_validation.call_timeout_ms, 5000);
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = MarketDataConfig::from_json_str(r#"{"providers": {"YAHOO": {}}}"#).unwrap_err();
        assert!(matches!(err, MarketDataError::Configuration(_)));
    }

    #[test]
    fn test_rejects_bad_template() {
        let err = MarketDataConfig::from_json_str(
            r#"{"providers": {"SINA": {"realtimeTemplate": "https://x/{ticker}"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MarketDataError::Configuration(_)));
    }

    #[test]
    fn test_rejects_all_disabled() {
        let err = MarketDataConfig::from_json_str(
            r#"{"providers": {
                "SINA": {"enabled": false},
                "TENCENT": {"enabled": false},
                "EASTMONEY": {"enabled": false}
            }}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MarketDataError::Configuration(_)));
    }

    #[test]
    fn test_rejects_out_of_range_durations() {
        for raw in [
            r#"{"circuitBreaker": {"cooldownSecs": 100000000000000}}"#,
            r#"{"circuitBreaker": {"cooldownSecs": 0}}"#,
            r#"{"governor": {"adjustWindowSecs": 18446744073709551615}}"#,
            r#"{"quality": {"windowSecs": 86401}}"#,
            r#"{"validation": {"baselineTtlSecs": 9223372036854775808}}"#,
            r#"{"crossValidation": {"callTimeoutMs": 86400001}}"#,
            r#"{"governor": {"minIntervalCeilingMs": 86400001}}"#,
        ] {
            let err = MarketDataConfig::from_json_str(raw).unwrap_err();
            assert!(matches!(err, MarketDataError::Configuration(_)), "{raw}");
        }

        let config =
            MarketDataConfig::from_json_str(r#"{"circuitBreaker": {"cooldownSecs": 86400}}"#)
                .unwrap();
        assert_eq!(config.circuit_breaker.cooldown_secs, 86_400);
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(MarketDataConfig::from_json_str("{not json").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = MarketDataConfig::load("/nonexistent/etfpulse.json").unwrap_err();
        assert!(matches!(err, MarketDataError::Configuration(_)));
    }
}
