//! Adaptive rate and concurrency governor.
//!
//! Each provider gets one [`Governor`] that every outbound call passes
//! through. It enforces two limits at once:
//!
//! - `min_interval_ms` between consecutive dispatches, and
//! - `max_concurrent` calls in flight.
//!
//! Unlike a fixed token bucket the limits move. Outcomes recorded inside
//! the governed slot feed a rolling window; every `adjust_window_secs` the
//! window is judged healthy (loosen), degraded (tighten) or neither (hold).
//! A burst of errors triggers an emergency backoff straight away without
//! waiting for the window to close.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::clock::{self, Clock, SystemClock};
use crate::errors::{MarketDataError, RetryClass};
use crate::events::{EventKind, EventSink, NoOpEventSink, ProviderEvent};

/// Governor tuning parameters, shared by every provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GovernorConfig {
    pub initial_min_interval_ms: u64,
    pub initial_max_concurrent: usize,
    pub min_interval_floor_ms: u64,
    pub min_interval_ceiling_ms: u64,
    pub max_concurrent_floor: usize,
    pub max_concurrent_ceiling: usize,
    /// Length of the periodic adjustment window.
    pub adjust_window_secs: u64,
    /// Windows with fewer samples keep accumulating.
    pub min_samples: u32,
    pub healthy_error_rate: f64,
    pub healthy_latency_ms: f64,
    pub degraded_error_rate: f64,
    pub degraded_latency_ms: f64,
    /// Instantaneous error rate that triggers an emergency backoff.
    pub emergency_error_rate: f64,
    /// Samples the current window needs before an emergency backoff can fire.
    ///
    /// Intentionally stricter than backing off on any single failure: below
    /// this count no emergency fires even at a 100% error rate, so at the
    /// default of 5 up to four straight failures open a window unanswered.
    /// Set to 1 to back off on the first failure.
    pub emergency_min_samples: u32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            initial_min_interval_ms: 500,
            initial_max_concurrent: 3,
            min_interval_floor_ms: 200,
            min_interval_ceiling_ms: 2000,
            max_concurrent_floor: 1,
            max_concurrent_ceiling: 5,
            adjust_window_secs: 30,
            min_samples: 10,
            healthy_error_rate: 0.05,
            healthy_latency_ms: 1000.0,
            degraded_error_rate: 0.15,
            degraded_latency_ms: 2000.0,
            emergency_error_rate: 0.20,
            emergency_min_samples: 5,
        }
    }
}

impl GovernorConfig {
    pub fn validate(&self) -> Result<(), MarketDataError> {
        if self.min_interval_floor_ms > self.min_interval_ceiling_ms {
            return Err(MarketDataError::Configuration(format!(
                "governor interval floor {}ms exceeds ceiling {}ms",
                self.min_interval_floor_ms, self.min_interval_ceiling_ms
            )));
        }
        if self.min_interval_ceiling_ms > clock::MAX_CONFIGURED_SECS * 1000 {
            return Err(MarketDataError::Configuration(format!(
                "governor interval ceiling {}ms exceeds {}s",
                self.min_interval_ceiling_ms,
                clock::MAX_CONFIGURED_SECS
            )));
        }
        if self.max_concurrent_floor == 0 || self.max_concurrent_floor > self.max_concurrent_ceiling
        {
            return Err(MarketDataError::Configuration(format!(
                "governor concurrency bounds [{}, {}] are invalid",
                self.max_concurrent_floor, self.max_concurrent_ceiling
            )));
        }
        if !(self.min_interval_floor_ms..=self.min_interval_ceiling_ms)
            .contains(&self.initial_min_interval_ms)
            || !(self.max_concurrent_floor..=self.max_concurrent_ceiling)
                .contains(&self.initial_max_concurrent)
        {
            return Err(MarketDataError::Configuration(
                "governor initial limits lie outside their bounds".to_string(),
            ));
        }
        if self.adjust_window_secs == 0 {
            return Err(MarketDataError::Configuration(
                "governor adjustment window must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Current limits of one governor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GovernorLimits {
    pub min_interval_ms: u64,
    pub max_concurrent: usize,
}

#[derive(Debug)]
struct GovernorState {
    min_interval_ms: u64,
    max_concurrent: usize,
    success_count: u32,
    error_count: u32,
    total_response_ms: u64,
    window_started_at: DateTime<Utc>,
    in_flight: usize,
    next_dispatch: Instant,
}

impl GovernorState {
    fn samples(&self) -> u32 {
        self.success_count + self.error_count
    }

    fn error_rate(&self) -> f64 {
        match self.samples() {
            0 => 0.0,
            n => self.error_count as f64 / n as f64,
        }
    }

    fn avg_latency_ms(&self) -> f64 {
        match self.samples() {
            0 => 0.0,
            n => self.total_response_ms as f64 / n as f64,
        }
    }

    fn reset_window(&mut self, now: DateTime<Utc>) {
        self.success_count = 0;
        self.error_count = 0;
        self.total_response_ms = 0;
        self.window_started_at = now;
    }

    fn limits(&self) -> GovernorLimits {
        GovernorLimits {
            min_interval_ms: self.min_interval_ms,
            max_concurrent: self.max_concurrent,
        }
    }
}

/// Per-provider scheduler for outbound calls.
pub struct Governor {
    provider: String,
    config: GovernorConfig,
    state: Mutex<GovernorState>,
    released: Notify,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

/// A dispatched slot. Dropping it frees the concurrency slot.
pub struct GovernorSlot<'a> {
    governor: &'a Governor,
}

impl Drop for GovernorSlot<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.governor.lock_state();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.governor.released.notify_waiters();
    }
}

impl Governor {
    pub fn new(provider: impl Into<String>) -> Self {
        Self::with_config(
            provider,
            GovernorConfig::default(),
            Arc::new(SystemClock),
            Arc::new(NoOpEventSink),
        )
    }

    pub fn with_config(
        provider: impl Into<String>,
        config: GovernorConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let state = GovernorState {
            min_interval_ms: config.initial_min_interval_ms,
            max_concurrent: config.initial_max_concurrent,
            success_count: 0,
            error_count: 0,
            total_response_ms: 0,
            window_started_at: clock.now(),
            in_flight: 0,
            next_dispatch: Instant::now(),
        };

        Self {
            provider: provider.into(),
            config,
            state: Mutex::new(state),
            released: Notify::new(),
            clock,
            sink,
        }
    }

    /// Lock the state mutex, recovering from poison if necessary.
    fn lock_state(&self) -> MutexGuard<'_, GovernorState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!(
                "Governor mutex for '{}' was poisoned, recovering",
                self.provider
            );
            poisoned.into_inner()
        })
    }

    pub fn limits(&self) -> GovernorLimits {
        self.lock_state().limits()
    }

    pub fn in_flight(&self) -> usize {
        self.lock_state().in_flight
    }

    /// Wait for a dispatch slot.
    ///
    /// Resolves once fewer than `max_concurrent` calls are in flight and at
    /// least `min_interval_ms` has passed since the previous dispatch.
    pub async fn acquire(&self) -> GovernorSlot<'_> {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);

            let deadline = {
                let mut state = self.lock_state();
                let now = Instant::now();

                if state.in_flight < state.max_concurrent {
                    if now >= state.next_dispatch {
                        state.in_flight += 1;
                        state.next_dispatch = now + Duration::from_millis(state.min_interval_ms);
                        return GovernorSlot { governor: self };
                    }
                    Some(state.next_dispatch)
                } else {
                    // Register before unlocking so a release in between is not missed.
                    notified.as_mut().enable();
                    None
                }
            };

            match deadline {
                Some(deadline) => {
                    debug!(
                        "Governor: '{}' waiting for dispatch interval",
                        self.provider
                    );
                    tokio::time::sleep_until(deadline).await;
                }
                None => {
                    debug!("Governor: '{}' waiting for a free slot", self.provider);
                    notified.await;
                }
            }
        }
    }

    /// Run one call inside a governed slot with a timeout.
    ///
    /// Returns the call's result together with its latency. A timeout
    /// becomes [`MarketDataError::Timeout`]. Transport-class errors count as
    /// errors for tuning; anything else (including invalid data) counts as a
    /// completed request.
    pub async fn run<T, F>(
        &self,
        timeout: Duration,
        call: F,
    ) -> (Result<T, MarketDataError>, Duration)
    where
        F: Future<Output = Result<T, MarketDataError>>,
    {
        let _slot = self.acquire().await;
        let started = Instant::now();

        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(MarketDataError::Timeout {
                provider: self.provider.clone(),
            }),
        };
        let elapsed = started.elapsed();

        let is_error = matches!(
            &result,
            Err(e) if e.retry_class() == RetryClass::FailoverWithPenalty
        );
        self.record_outcome(is_error, elapsed);

        (result, elapsed)
    }

    pub fn record_success(&self, latency: Duration) {
        self.record_outcome(false, latency);
    }

    pub fn record_error(&self, latency: Duration) {
        self.record_outcome(true, latency);
    }

    fn record_outcome(&self, is_error: bool, latency: Duration) {
        let now = self.clock.now();
        let mut state = self.lock_state();

        if is_error {
            state.error_count += 1;
        } else {
            state.success_count += 1;
        }
        state.total_response_ms += latency.as_millis() as u64;

        if is_error
            && state.samples() >= self.config.emergency_min_samples
            && state.error_rate() > self.config.emergency_error_rate
        {
            self.emergency_backoff(&mut state, now);
            return;
        }

        let window = clock::seconds(self.config.adjust_window_secs);
        if now - state.window_started_at >= window && state.samples() >= self.config.min_samples {
            self.adjust(&mut state, now);
        }
    }

    fn emergency_backoff(&self, state: &mut GovernorState, now: DateTime<Utc>) {
        let before = state.limits();
        let error_rate = state.error_rate();

        state.min_interval_ms =
            (state.min_interval_ms * 2).min(self.config.min_interval_ceiling_ms);
        state.max_concurrent = (state.max_concurrent / 2).max(self.config.max_concurrent_floor);
        state.reset_window(now);

        warn!(
            "Governor: emergency backoff for '{}' at {:.0}% errors: interval {}ms -> {}ms, concurrency {} -> {}",
            self.provider,
            error_rate * 100.0,
            before.min_interval_ms,
            state.min_interval_ms,
            before.max_concurrent,
            state.max_concurrent
        );
        self.sink.emit(ProviderEvent::new(
            now,
            self.provider.as_str(),
            EventKind::EmergencyBackoff,
            format!(
                "error rate {:.1}%: interval {}ms, concurrency {}",
                error_rate * 100.0,
                state.min_interval_ms,
                state.max_concurrent
            ),
        ));
    }

    fn adjust(&self, state: &mut GovernorState, now: DateTime<Utc>) {
        let before = state.limits();
        let error_rate = state.error_rate();
        let avg_latency = state.avg_latency_ms();
        let cfg = &self.config;

        if error_rate < cfg.healthy_error_rate && avg_latency < cfg.healthy_latency_ms {
            state.min_interval_ms =
                ((state.min_interval_ms as f64 * 0.8).round() as u64).max(cfg.min_interval_floor_ms);
            state.max_concurrent = (state.max_concurrent + 1).min(cfg.max_concurrent_ceiling);
        } else if error_rate >= cfg.degraded_error_rate || avg_latency >= cfg.degraded_latency_ms {
            state.min_interval_ms =
                ((state.min_interval_ms as f64 * 1.5).round() as u64).min(cfg.min_interval_ceiling_ms);
            state.max_concurrent = state
                .max_concurrent
                .saturating_sub(1)
                .max(cfg.max_concurrent_floor);
        }
        state.reset_window(now);

        let after = state.limits();
        if after == before {
            debug!(
                "Governor: holding limits for '{}' ({:.1}% errors, {:.0}ms avg)",
                self.provider,
                error_rate * 100.0,
                avg_latency
            );
            return;
        }

        info!(
            "Governor: '{}' interval {}ms -> {}ms, concurrency {} -> {} ({:.1}% errors, {:.0}ms avg)",
            self.provider,
            before.min_interval_ms,
            after.min_interval_ms,
            before.max_concurrent,
            after.max_concurrent,
            error_rate * 100.0,
            avg_latency
        );
        self.sink.emit(ProviderEvent::new(
            now,
            self.provider.as_str(),
            EventKind::ThrottleAdjusted,
            format!(
                "interval {}ms, concurrency {}",
                after.min_interval_ms, after.max_concurrent
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::MemoryEventSink;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn governor() -> (Arc<Governor>, Arc<ManualClock>, MemoryEventSink) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 2, 0, 0).unwrap(),
        ));
        let sink = MemoryEventSink::new();
        let gov = Governor::with_config(
            "SINA",
            GovernorConfig::default(),
            clock.clone(),
            Arc::new(sink.clone()),
        );
        (Arc::new(gov), clock, sink)
    }

    fn fast() -> Duration {
        Duration::from_millis(100)
    }

    #[test]
    fn test_initial_limits() {
        let (gov, _, _) = governor();
        assert_eq!(
            gov.limits(),
            GovernorLimits {
                min_interval_ms: 500,
                max_concurrent: 3
            }
        );
    }

    #[test]
    fn test_healthy_window_loosens_limits() {
        let (gov, clock, sink) = governor();
        for _ in 0..10 {
            gov.record_success(fast());
        }
        // Window not yet elapsed.
        assert_eq!(gov.limits().max_concurrent, 3);

        clock.advance(chrono::Duration::seconds(30));
        gov.record_success(fast());

        assert_eq!(
            gov.limits(),
            GovernorLimits {
                min_interval_ms: 400,
                max_concurrent: 4
            }
        );
        assert_eq!(sink.of_kind(EventKind::ThrottleAdjusted).len(), 1);
    }

    #[test]
    fn test_emergency_needs_min_samples() {
        let (gov, _, sink) = governor();
        for _ in 0..4 {
            gov.record_error(fast());
        }
        assert_eq!(gov.limits().max_concurrent, 3);
        assert!(sink.of_kind(EventKind::EmergencyBackoff).is_empty());

        gov.record_error(fast());
        assert_eq!(
            gov.limits(),
            GovernorLimits {
                min_interval_ms: 1000,
                max_concurrent: 1
            }
        );
    }

    #[test]
    fn test_single_sample_emergency_backoff() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 2, 0, 0).unwrap(),
        ));
        let sink = MemoryEventSink::new();
        let config = GovernorConfig {
            emergency_min_samples: 1,
            ..GovernorConfig::default()
        };
        let gov = Governor::with_config("SINA", config, clock, Arc::new(sink.clone()));

        gov.record_error(fast());

        assert_eq!(
            gov.limits(),
            GovernorLimits {
                min_interval_ms: 1000,
                max_concurrent: 1
            }
        );
        assert_eq!(sink.of_kind(EventKind::EmergencyBackoff).len(), 1);
    }

    #[test]
    fn test_sparse_window_keeps_accumulating() {
        let (gov, clock, _) = governor();
        for _ in 0..5 {
            gov.record_success(fast());
        }
        clock.advance(chrono::Duration::seconds(45));
        gov.record_success(fast());
        assert_eq!(gov.limits().min_interval_ms, 500);

        for _ in 0..4 {
            gov.record_success(fast());
        }
        assert_eq!(gov.limits().min_interval_ms, 400);
    }

    #[test]
    fn test_slow_window_tightens_limits() {
        let (gov, clock, _) = governor();
        clock.advance(chrono::Duration::seconds(31));
        for _ in 0..10 {
            gov.record_success(Duration::from_millis(2500));
        }
        assert_eq!(
            gov.limits(),
            GovernorLimits {
                min_interval_ms: 750,
                max_concurrent: 2
            }
        );
    }

    #[test]
    fn test_middling_window_holds() {
        let (gov, clock, sink) = governor();
        clock.advance(chrono::Duration::seconds(31));
        for _ in 0..10 {
            gov.record_success(Duration::from_millis(1500));
        }
        assert_eq!(gov.limits().min_interval_ms, 500);
        assert!(sink.of_kind(EventKind::ThrottleAdjusted).is_empty());
    }

    #[test]
    fn test_converges_to_bounds() {
        let (gov, clock, _) = governor();
        let mut previous = gov.limits();
        for _ in 0..8 {
            clock.advance(chrono::Duration::seconds(30));
            for _ in 0..10 {
                gov.record_success(fast());
            }
            let current = gov.limits();
            assert!(current.min_interval_ms <= previous.min_interval_ms);
            assert!(current.max_concurrent >= previous.max_concurrent);
            previous = current;
        }
        assert_eq!(
            previous,
            GovernorLimits {
                min_interval_ms: 200,
                max_concurrent: 5
            }
        );
    }

    #[test]
    fn test_emergency_backoff_same_tick() {
        let (gov, _, sink) = governor();
        gov.record_success(fast());
        gov.record_success(fast());
        gov.record_success(fast());
        gov.record_error(fast());
        assert_eq!(gov.limits().min_interval_ms, 500);

        // 2 of 5 = 40% errors.
        gov.record_error(fast());
        assert_eq!(
            gov.limits(),
            GovernorLimits {
                min_interval_ms: 1000,
                max_concurrent: 1
            }
        );
        assert_eq!(sink.of_kind(EventKind::EmergencyBackoff).len(), 1);
    }

    #[test]
    fn test_single_first_failure_is_not_an_emergency() {
        let (gov, _, sink) = governor();
        gov.record_error(fast());
        assert_eq!(gov.limits().max_concurrent, 3);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_emergency_backoff_is_capped() {
        let (gov, _, _) = governor();
        for _ in 0..30 {
            gov.record_error(fast());
        }
        assert_eq!(
            gov.limits(),
            GovernorLimits {
                min_interval_ms: 2000,
                max_concurrent: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out() {
        let (gov, _, _) = governor();
        let (result, _) = gov
            .run(Duration::from_secs(10), async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, MarketDataError>(1)
            })
            .await;

        assert!(matches!(result, Err(MarketDataError::Timeout { .. })));
        assert_eq!(gov.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatches_are_spaced() {
        let (gov, _, _) = governor();
        let start = Instant::now();
        for _ in 0..3 {
            let (result, _) = gov
                .run(Duration::from_secs(10), async { Ok::<_, MarketDataError>(()) })
                .await;
            assert!(result.is_ok());
        }
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_capped() {
        let (gov, _, _) = governor();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let gov = gov.clone();
                let current = current.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    gov.run(Duration::from_secs(30), async {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, MarketDataError>(())
                    })
                    .await
                })
            })
            .collect();

        for task in tasks {
            let (result, _) = task.await.unwrap();
            assert!(result.is_ok());
        }
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(gov.in_flight(), 0);
    }
}
