//! Price and series validation.
//!
//! Realtime prices are checked against:
//! - a plausible range (global, optionally overridden per instrument)
//! - the recent-price baseline, if one is younger than the TTL
//!
//! The allowed move against the baseline is dynamic: wider for sub-unit
//! prices, wider still during exchange trading hours, and a move that lands
//! on the daily limit band is always accepted.
//!
//! Series are checked for OHLC shape only.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::clock::{self, Clock, SystemClock};
use crate::errors::MarketDataError;
use crate::models::{Candle, Instrument};

/// China Standard Time, UTC+8.
const EXCHANGE_UTC_OFFSET_SECS: i32 = 8 * 60 * 60;

/// Validation severity levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationSeverity {
    /// Hard failure - reject the data, try next provider.
    Hard,
    /// Soft warning - accept but log.
    Soft,
}

/// Validation result details.
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub message: String,
}

impl ValidationIssue {
    fn hard(message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Hard,
            message: message.into(),
        }
    }

    fn soft(message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Soft,
            message: message.into(),
        }
    }
}

/// Inclusive price bounds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: Decimal,
    pub max: Decimal,
}

/// Validator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidatorConfig {
    pub min_price: Decimal,
    pub max_price: Decimal,
    /// Per-instrument overrides keyed by six-digit code.
    pub instrument_ranges: BTreeMap<String, PriceRange>,
    /// Allowed relative move against the baseline.
    pub max_change_ratio: Decimal,
    /// Allowed relative move when the baseline is below `low_price_cutoff`.
    pub low_price_change_ratio: Decimal,
    pub low_price_cutoff: Decimal,
    /// Daily limit-up/down band.
    pub limit_ratio: Decimal,
    pub limit_tolerance: Decimal,
    /// Multiplier applied to the threshold during trading hours.
    pub trading_hours_factor: Decimal,
    pub baseline_ttl_secs: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_price: Decimal::new(1, 3),
            max_price: Decimal::from(10_000),
            instrument_ranges: BTreeMap::new(),
            max_change_ratio: Decimal::new(20, 2),
            low_price_change_ratio: Decimal::new(30, 2),
            low_price_cutoff: Decimal::ONE,
            limit_ratio: Decimal::new(10, 2),
            limit_tolerance: Decimal::new(5, 3),
            trading_hours_factor: Decimal::new(12, 1),
            baseline_ttl_secs: 5 * 60,
        }
    }
}

impl ValidatorConfig {
    pub fn validate(&self) -> Result<(), MarketDataError> {
        let bad_range = |range: &PriceRange| range.min <= Decimal::ZERO || range.min >= range.max;

        if bad_range(&PriceRange {
            min: self.min_price,
            max: self.max_price,
        }) {
            return Err(MarketDataError::Configuration(format!(
                "invalid price range [{}, {}]",
                self.min_price, self.max_price
            )));
        }
        if let Some((code, range)) = self.instrument_ranges.iter().find(|(_, r)| bad_range(r)) {
            return Err(MarketDataError::Configuration(format!(
                "invalid price range [{}, {}] for {}",
                range.min, range.max, code
            )));
        }
        if self.max_change_ratio <= Decimal::ZERO || self.low_price_change_ratio <= Decimal::ZERO {
            return Err(MarketDataError::Configuration(
                "change thresholds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn range_for(&self, instrument: &Instrument) -> PriceRange {
        self.instrument_ranges
            .get(instrument.code())
            .copied()
            .unwrap_or(PriceRange {
                min: self.min_price,
                max: self.max_price,
            })
    }
}

#[derive(Clone, Copy, Debug)]
struct Baseline {
    price: Decimal,
    recorded_at: DateTime<Utc>,
}

/// Validates provider output and keeps the recent-price baseline.
pub struct PriceValidator {
    config: ValidatorConfig,
    baselines: Mutex<HashMap<Instrument, Baseline>>,
    clock: Arc<dyn Clock>,
}

impl PriceValidator {
    pub fn new() -> Self {
        Self::with_config(ValidatorConfig::default(), Arc::new(SystemClock))
    }

    pub fn with_config(config: ValidatorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            baselines: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock_baselines(&self) -> MutexGuard<'_, HashMap<Instrument, Baseline>> {
        self.baselines.lock().unwrap_or_else(|poisoned| {
            warn!("Validator baseline mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Last accepted price, if still inside the TTL.
    pub fn baseline(&self, instrument: &Instrument) -> Option<Decimal> {
        let now = self.clock.now();
        let ttl = clock::seconds(self.config.baseline_ttl_secs);
        self.lock_baselines()
            .get(instrument)
            .filter(|b| now - b.recorded_at <= ttl)
            .map(|b| b.price)
    }

    /// Record the final price served for an instrument.
    pub fn accept(&self, instrument: &Instrument, price: Decimal) {
        let recorded_at = self.clock.now();
        self.lock_baselines()
            .insert(instrument.clone(), Baseline { price, recorded_at });
    }

    /// Allowed relative move against `baseline` at time `now`.
    pub fn change_threshold(&self, baseline: Decimal, now: DateTime<Utc>) -> Decimal {
        let mut threshold = if baseline < self.config.low_price_cutoff {
            self.config.low_price_change_ratio
        } else {
            self.config.max_change_ratio
        };
        if is_trading_hours(now) {
            threshold *= self.config.trading_hours_factor;
        }
        threshold
    }

    /// Validate one realtime price reported by `provider`.
    pub fn validate(
        &self,
        provider: &str,
        instrument: &Instrument,
        price: Decimal,
    ) -> Result<(), MarketDataError> {
        let reject = |message: String| {
            debug!("Validator: rejecting {} from '{}': {}", instrument, provider, message);
            Err(MarketDataError::InvalidData {
                provider: provider.to_string(),
                message,
            })
        };

        if price <= Decimal::ZERO {
            return reject(format!("non-positive price {}", price));
        }

        let range = self.config.range_for(instrument);
        if price < range.min || price > range.max {
            return reject(format!(
                "price {} outside plausible range [{}, {}]",
                price, range.min, range.max
            ));
        }

        let Some(baseline) = self.baseline(instrument) else {
            return Ok(());
        };

        let change = ((price - baseline) / baseline).abs();
        let threshold = self.change_threshold(baseline, self.clock.now());
        if change <= threshold {
            return Ok(());
        }

        if (change - self.config.limit_ratio).abs() <= self.config.limit_tolerance {
            debug!(
                "Validator: {} moved {} against {} inside the limit band",
                instrument, change, baseline
            );
            return Ok(());
        }

        reject(format!(
            "price {} moved {:.2}% from baseline {} (allowed {:.2}%)",
            price,
            change * Decimal::ONE_HUNDRED,
            baseline,
            threshold * Decimal::ONE_HUNDRED
        ))
    }

    /// Validate a candle series.
    pub fn validate_series(&self, provider: &str, candles: &[Candle]) -> Result<(), MarketDataError> {
        if candles.is_empty() {
            return Err(MarketDataError::InvalidData {
                provider: provider.to_string(),
                message: "empty series".to_string(),
            });
        }

        let mut issues = Vec::new();
        for candle in candles {
            Self::check_candle(candle, &mut issues);
        }

        let errors: Vec<_> = issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Hard)
            .map(|i| i.message.as_str())
            .collect();

        if !errors.is_empty() {
            return Err(MarketDataError::InvalidData {
                provider: provider.to_string(),
                message: errors.join("; "),
            });
        }

        for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Soft) {
            warn!("Series validation warning from '{}': {}", provider, issue.message);
        }

        Ok(())
    }

    /// OHLC shape checks for one candle.
    fn check_candle(candle: &Candle, issues: &mut Vec<ValidationIssue>) {
        let prices = [candle.open, candle.high, candle.low, candle.close];
        if prices.iter().any(|p| *p <= Decimal::ZERO) {
            issues.push(ValidationIssue::hard(format!(
                "non-positive price on {}",
                candle.date
            )));
            return;
        }

        if candle.high < candle.low {
            issues.push(ValidationIssue::hard(format!(
                "high ({}) is less than low ({}) on {}",
                candle.high, candle.low, candle.date
            )));
            return;
        }

        if candle.volume < Decimal::ZERO {
            issues.push(ValidationIssue::hard(format!(
                "negative volume on {}",
                candle.date
            )));
        }

        if candle.open < candle.low || candle.open > candle.high {
            issues.push(ValidationIssue::soft(format!(
                "open ({}) outside high/low on {}",
                candle.open, candle.date
            )));
        }
        if candle.close < candle.low || candle.close > candle.high {
            issues.push(ValidationIssue::soft(format!(
                "close ({}) outside high/low on {}",
                candle.close, candle.date
            )));
        }
    }
}

impl Default for PriceValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `now` falls in a continuous trading session
/// (Mon-Fri 09:30-11:30 and 13:00-15:00, UTC+8).
pub fn is_trading_hours(now: DateTime<Utc>) -> bool {
    let Some(offset) = FixedOffset::east_opt(EXCHANGE_UTC_OFFSET_SECS) else {
        return false;
    };
    let local = now.with_timezone(&offset);

    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }

    let time = local.time();
    let session = |open: (u32, u32), close: (u32, u32)| {
        match (
            NaiveTime::from_hms_opt(open.0, open.1, 0),
            NaiveTime::from_hms_opt(close.0, close.1, 0),
        ) {
            (Some(open), Some(close)) => time >= open && time <= close,
            _ => false,
        }
    };

    session((9, 30), (11, 30)) || session((13, 0), (15, 0))
}
