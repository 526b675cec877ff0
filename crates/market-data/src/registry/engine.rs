//! The acquisition engine.
//!
//! `AcquisitionEngine` owns every piece of per-provider state and exposes the
//! upward API:
//! - [`fetch_realtime`](AcquisitionEngine::fetch_realtime): race the top
//!   providers, validate, reconcile, fall back serially on total failure
//! - [`fetch_kline_data`](AcquisitionEngine::fetch_kline_data): serial
//!   fallback in selector order
//! - [`status`](AcquisitionEngine::status) and
//!   [`reset_provider`](AcquisitionEngine::reset_provider) for operators
//!
//! Per-provider errors never reach the caller. They are absorbed into the
//! circuit breaker and quality recorder, and only total exhaustion surfaces
//! as [`MarketDataError::AllSourcesUnavailable`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, warn};
use rust_decimal::Decimal;

use super::diagnostics::{FetchDiagnostics, SkipReason};
use super::reconcile::{reconcile, Candidate, Reconciliation};
use super::selector::{order_providers, SelectionEntry};
use super::{CircuitBreaker, Governor, PriceValidator, QualityRecorder};
use crate::clock::{Clock, SystemClock};
use crate::config::{CrossValidationConfig, MarketDataConfig};
use crate::errors::{MarketDataError, RetryClass};
use crate::events::{EventKind, EventSink, NoOpEventSink, ProviderEvent};
use crate::models::{Candle, EngineStatus, Instrument, ProviderState, ProviderStatus, Quote};
use crate::provider::{build_providers, MarketDataProvider};

pub struct AcquisitionEngine {
    /// Registration order; also the final tie-break in selection.
    providers: Vec<Arc<dyn MarketDataProvider>>,
    governors: HashMap<&'static str, Governor>,
    circuit_breaker: CircuitBreaker,
    quality: QualityRecorder,
    validator: PriceValidator,
    cross_validation: CrossValidationConfig,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    current_source: Mutex<Option<String>>,
}

impl AcquisitionEngine {
    /// Engine over the given providers with default settings.
    pub fn new(providers: Vec<Arc<dyn MarketDataProvider>>) -> Result<Self, MarketDataError> {
        Self::with_config(
            providers,
            &MarketDataConfig::default(),
            Arc::new(SystemClock),
            Arc::new(NoOpEventSink),
        )
    }

    /// Engine over the built-in adapters, configured from `config`.
    pub fn from_config(
        config: &MarketDataConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, MarketDataError> {
        config.validate()?;
        let providers = build_providers(config)?;
        Self::with_config(providers, config, Arc::new(SystemClock), sink)
    }

    pub fn with_config(
        providers: Vec<Arc<dyn MarketDataProvider>>,
        config: &MarketDataConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, MarketDataError> {
        if providers.is_empty() {
            return Err(MarketDataError::Configuration(
                "at least one provider is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for provider in &providers {
            if !seen.insert(provider.id()) {
                return Err(MarketDataError::Configuration(format!(
                    "provider '{}' registered twice",
                    provider.id()
                )));
            }
        }

        let governors = providers
            .iter()
            .map(|p| {
                (
                    p.id(),
                    Governor::with_config(
                        p.id(),
                        config.governor.clone(),
                        clock.clone(),
                        sink.clone(),
                    ),
                )
            })
            .collect();

        info!(
            "Acquisition engine ready with providers: {}",
            providers
                .iter()
                .map(|p| format!("{}(p{})", p.id(), p.descriptor().priority))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            providers,
            governors,
            circuit_breaker: CircuitBreaker::with_config(
                config.circuit_breaker.clone(),
                clock.clone(),
                sink.clone(),
            ),
            quality: QualityRecorder::with_config(config.quality.clone(), clock.clone()),
            validator: PriceValidator::with_config(config.validation.clone(), clock.clone()),
            cross_validation: config.cross_validation.clone(),
            sink,
            clock,
            current_source: Mutex::new(None),
        })
    }

    fn lock_current_source(&self) -> MutexGuard<'_, Option<String>> {
        self.current_source
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_current_source(&self, provider: &str) {
        *self.lock_current_source() = Some(provider.to_string());
    }

    fn effective_priority(&self, provider: &dyn MarketDataProvider) -> i32 {
        provider.descriptor().priority + self.quality.penalty(provider.id())
    }

    /// Active providers in selection order. Disabled ones are noted in
    /// `diagnostics`.
    fn ordered_providers(
        &self,
        diagnostics: &mut FetchDiagnostics,
    ) -> Vec<&Arc<dyn MarketDataProvider>> {
        let entries: Vec<SelectionEntry> = self
            .providers
            .iter()
            .map(|p| SelectionEntry {
                id: p.id().to_string(),
                consecutive_failures: self.circuit_breaker.failure_count(p.id()),
                priority: self.effective_priority(p.as_ref()),
                state: self.circuit_breaker.state(p.id()),
            })
            .collect();

        for entry in entries.iter().filter(|e| e.state == ProviderState::Disabled) {
            diagnostics.record_skip(&entry.id, SkipReason::Disabled);
        }

        order_providers(&entries)
            .iter()
            .filter_map(|id| self.providers.iter().find(|p| p.id() == id))
            .collect()
    }

    /// Current selection order, for dashboards and tests.
    pub fn selection_order(&self) -> Vec<String> {
        self.ordered_providers(&mut FetchDiagnostics::new())
            .iter()
            .map(|p| p.id().to_string())
            .collect()
    }

    fn record_success(&self, provider: &str, latency: Duration) {
        self.circuit_breaker.record_success(provider);
        self.quality
            .record_success(provider, latency.as_millis() as u64);
    }

    /// Absorb one provider error into breaker and quality state.
    fn record_error(
        &self,
        provider: &str,
        error: &MarketDataError,
        latency: Duration,
        diagnostics: &mut FetchDiagnostics,
    ) {
        let now = self.clock.now();
        self.quality
            .record_failure(provider, latency.as_millis() as u64);

        if error.retry_class() == RetryClass::QualityPenalty {
            warn!("Rejected data from '{}': {}", provider, error);
            let penalty = self
                .quality
                .record_quality_issue(provider, error.kind(), &error.to_string());
            self.sink.emit(ProviderEvent::new(
                now,
                provider,
                EventKind::QualityIssue,
                format!("{} (penalty {})", error, penalty),
            ));
            diagnostics.record_rejected(provider, error.to_string());
        } else {
            warn!("Provider '{}' failed: {}", provider, error);
            self.sink.emit(ProviderEvent::new(
                now,
                provider,
                EventKind::Failure,
                error.to_string(),
            ));
            diagnostics.record_failed(provider, error.to_string());
        }

        // Invalid data counts as a failure for selection purposes too.
        self.circuit_breaker
            .record_failure(provider, &error.to_string());
    }

    fn call_timeout(&self) -> Duration {
        self.cross_validation.call_timeout()
    }

    /// One governed, validated realtime call. State is not yet updated.
    async fn call_realtime(
        &self,
        provider: &Arc<dyn MarketDataProvider>,
        instrument: &Instrument,
    ) -> (Result<Decimal, MarketDataError>, Duration) {
        let id = provider.id();
        let (result, elapsed) = match self.governors.get(id) {
            Some(governor) => {
                governor
                    .run(self.call_timeout(), provider.fetch_realtime(instrument))
                    .await
            }
            None => (Err(MarketDataError::UnknownProvider(id.to_string())), Duration::ZERO),
        };

        let result = result.and_then(|price| {
            self.validator
                .validate(id, instrument, price)
                .map(|()| price)
        });
        (result, elapsed)
    }

    /// Record the outcome of a realtime call and keep valid prices.
    fn absorb_realtime(
        &self,
        provider: &str,
        outcome: (Result<Decimal, MarketDataError>, Duration),
        candidates: &mut Vec<Candidate>,
        diagnostics: &mut FetchDiagnostics,
    ) {
        let (result, elapsed) = outcome;
        match result {
            Ok(price) => {
                debug!("'{}' answered {} in {:?}", provider, price, elapsed);
                self.record_success(provider, elapsed);
                diagnostics.record_accepted(provider);
                candidates.push(Candidate {
                    provider: provider.to_string(),
                    price,
                });
            }
            Err(e) => self.record_error(provider, &e, elapsed, diagnostics),
        }
    }

    /// Fetch a cross-validated realtime quote.
    pub async fn fetch_realtime(&self, instrument: &Instrument) -> Result<Quote, MarketDataError> {
        let mut diagnostics = FetchDiagnostics::new();
        let ordered = self.ordered_providers(&mut diagnostics);
        let width = self.cross_validation.width.min(ordered.len());
        let (racers, rest) = ordered.split_at(width);

        debug!(
            "Realtime {}: racing [{}]",
            instrument,
            racers.iter().map(|p| p.id()).collect::<Vec<_>>().join(", ")
        );

        // Wait for every racer; comparison needs all answers.
        let outcomes = join_all(racers.iter().map(|p| self.call_realtime(p, instrument))).await;

        let mut candidates = Vec::new();
        for (provider, outcome) in racers.iter().zip(outcomes) {
            self.absorb_realtime(provider.id(), outcome, &mut candidates, &mut diagnostics);
        }

        if candidates.is_empty() {
            for provider in rest {
                debug!("Realtime {}: falling back to '{}'", instrument, provider.id());
                let outcome = self.call_realtime(provider, instrument).await;
                self.absorb_realtime(provider.id(), outcome, &mut candidates, &mut diagnostics);
                if !candidates.is_empty() {
                    break;
                }
            }
        }

        let baseline = self.validator.baseline(instrument);
        let Some(reconciled) =
            reconcile(&candidates, baseline, self.cross_validation.max_deviation)
        else {
            let attempts = diagnostics.summary();
            warn!("All sources unavailable for {}: {}", instrument, attempts);
            return Err(MarketDataError::AllSourcesUnavailable {
                instrument: instrument.to_string(),
                attempts,
            });
        };

        if let Reconciliation::OutlierRejected {
            provider,
            price,
            mean,
            deviation,
            rejected,
        } = &reconciled
        {
            warn!(
                "Price discrepancy for {}: mean {} deviates {:.2}%, keeping {} from '{}'",
                instrument,
                mean.round_dp(4),
                *deviation * Decimal::ONE_HUNDRED,
                price,
                provider
            );
            let now = self.clock.now();
            for outlier in rejected {
                self.sink.emit(ProviderEvent::new(
                    now,
                    outlier.provider.as_str(),
                    EventKind::Discrepancy,
                    format!(
                        "{}: {} rejected, kept {} from {} (mean {})",
                        instrument,
                        outlier.price,
                        price,
                        provider,
                        mean.round_dp(4)
                    ),
                ));
            }
        }

        let price = reconciled.price();
        let source = reconciled.source().to_string();
        self.validator.accept(instrument, price);
        self.set_current_source(&source);

        let mut quote = Quote::new(instrument.symbol(), price, self.clock.now(), source.clone());
        quote.corroborated_by = reconciled
            .contributors()
            .into_iter()
            .filter(|p| *p != source)
            .collect();
        Ok(quote)
    }

    /// Fetch a cross-validated realtime price.
    pub async fn fetch_realtime_price(
        &self,
        instrument: &Instrument,
    ) -> Result<Decimal, MarketDataError> {
        self.fetch_realtime(instrument).await.map(|q| q.price)
    }

    /// Fetch daily candles, ascending by date, at most `lookback_days` long.
    ///
    /// Providers are tried one at a time in selector order; the first
    /// well-formed, non-empty series wins.
    pub async fn fetch_kline_data(
        &self,
        instrument: &Instrument,
        lookback_days: u32,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let days = lookback_days.max(1);
        let mut diagnostics = FetchDiagnostics::new();
        let ordered = self.ordered_providers(&mut diagnostics);

        for provider in ordered {
            let id = provider.id();
            let Some(governor) = self.governors.get(id) else {
                continue;
            };

            let (result, elapsed) = governor
                .run(self.call_timeout(), provider.fetch_series(instrument, days))
                .await;

            let result = result.and_then(|mut candles| {
                candles.sort_by_key(|c| c.date);
                self.validator.validate_series(id, &candles)?;
                let excess = candles.len().saturating_sub(days as usize);
                candles.drain(..excess);
                Ok(candles)
            });

            match result {
                Ok(candles) => {
                    debug!(
                        "Series {}: {} candles from '{}' in {:?}",
                        instrument,
                        candles.len(),
                        id,
                        elapsed
                    );
                    self.record_success(id, elapsed);
                    self.set_current_source(id);
                    return Ok(candles);
                }
                Err(e) => self.record_error(id, &e, elapsed, &mut diagnostics),
            }
        }

        let attempts = diagnostics.summary();
        warn!("All series sources unavailable for {}: {}", instrument, attempts);
        Err(MarketDataError::AllSourcesUnavailable {
            instrument: instrument.to_string(),
            attempts,
        })
    }

    /// Read-only snapshot for dashboards.
    pub fn status(&self) -> EngineStatus {
        let current_source = self
            .lock_current_source()
            .clone()
            .or_else(|| self.selection_order().into_iter().next());

        let providers = self
            .providers
            .iter()
            .map(|p| {
                let id = p.id();
                let failure = self.circuit_breaker.snapshot(id);
                let perf = self.quality.snapshot(id);
                let limits = self.governors.get(id).map(Governor::limits);
                let status = if failure.disabled_until.is_some() {
                    ProviderState::Disabled
                } else {
                    ProviderState::Active
                };

                ProviderStatus {
                    id: id.to_string(),
                    name: p.descriptor().display_name.to_string(),
                    status,
                    failure_count: failure.consecutive_failures,
                    last_success_at: failure.last_success_at,
                    disabled_until: failure.disabled_until,
                    priority: p.descriptor().priority,
                    effective_priority: p.descriptor().priority + perf.penalty,
                    total_requests: perf.total_requests,
                    success_rate: perf.success_rate,
                    avg_response_ms: perf.avg_response_ms,
                    recent_quality_issues: perf.recent_quality_issues,
                    min_interval_ms: limits.map(|l| l.min_interval_ms).unwrap_or_default(),
                    max_concurrent: limits.map(|l| l.max_concurrent).unwrap_or_default(),
                }
            })
            .collect();

        EngineStatus {
            current_source,
            providers,
        }
    }

    /// Clear a provider's failure state and quality penalty.
    pub fn reset_provider(&self, provider_id: &str) -> Result<(), MarketDataError> {
        let provider = self
            .providers
            .iter()
            .find(|p| p.id().eq_ignore_ascii_case(provider_id))
            .ok_or_else(|| MarketDataError::UnknownProvider(provider_id.to_string()))?;

        info!("Manual reset of provider '{}'", provider.id());
        self.circuit_breaker.reset(provider.id());
        self.quality.reset(provider.id());
        Ok(())
    }
}
