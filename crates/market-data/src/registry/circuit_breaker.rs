//! Per-provider failure tracker and circuit breaker.
//!
//! A provider moves between two states:
//!
//! - **Active**: selectable.
//! - **Disabled**: excluded from selection until `disabled_until`.
//!
//! `failure_threshold` consecutive failures disable a provider for
//! `cooldown_secs`. There is no half-open probe: once the cooldown has
//! elapsed the provider is simply selectable again. The transition is
//! evaluated lazily against the injected [`Clock`] whenever state is read,
//! so no timers run in the background.
//!
//! The breaker is in-memory and resets on application restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::clock::{self, Clock, SystemClock};
use crate::events::{EventKind, EventSink, NoOpEventSink, ProviderEvent};
use crate::models::ProviderState;

/// Default number of consecutive failures before disabling a provider.
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default cooldown before a disabled provider becomes selectable again.
const DEFAULT_COOLDOWN_SECS: u64 = 10 * 60;

/// Internal failure state for a single provider.
#[derive(Debug, Default)]
struct Circuit {
    /// Number of consecutive failures.
    consecutive_failures: u32,
    /// Set while the provider is disabled.
    disabled_until: Option<DateTime<Utc>>,
    /// Time of the last success.
    last_success_at: Option<DateTime<Utc>>,
    /// Time of the last failure.
    last_failure_at: Option<DateTime<Utc>>,
}

/// Circuit breaker configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before disabling the provider.
    pub failure_threshold: u32,
    /// Seconds a disabled provider stays out of selection.
    pub cooldown_secs: u64,
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        clock::seconds(self.cooldown_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
        }
    }
}

/// Point-in-time copy of one provider's failure state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailureState {
    pub consecutive_failures: u32,
    pub disabled_until: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Per-provider circuit breaker.
///
/// Thread-safe; multiple instrument fetches record outcomes against the
/// same provider concurrently.
pub struct CircuitBreaker {
    /// Per-provider failure states.
    circuits: Mutex<HashMap<String, Circuit>>,
    /// Configuration.
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default settings.
    pub fn new() -> Self {
        Self::with_config(
            CircuitBreakerConfig::default(),
            Arc::new(SystemClock),
            Arc::new(NoOpEventSink),
        )
    }

    /// Create a circuit breaker with custom configuration.
    pub fn with_config(
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            config,
            clock,
            sink,
        }
    }

    /// Lock the circuits mutex, recovering from poison if necessary.
    ///
    /// The worst case after a poisoned lock is a slightly stale failure
    /// count, which is better than panicking.
    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<String, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Clear an expired cooldown. Returns true if the provider is disabled.
    fn refresh(&self, provider: &str, circuit: &mut Circuit, now: DateTime<Utc>) -> bool {
        match circuit.disabled_until {
            Some(until) if now >= until => {
                info!(
                    "Circuit breaker: re-enabling '{}' after cooldown ({} consecutive failures on record)",
                    provider, circuit.consecutive_failures
                );
                circuit.disabled_until = None;
                self.sink.emit(ProviderEvent::new(
                    now,
                    provider,
                    EventKind::ReEnabled,
                    format!("cooldown elapsed at {}", until),
                ));
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Current state for a provider.
    ///
    /// Also performs the lazy `Disabled -> Active` transition when the
    /// cooldown has elapsed.
    pub fn state(&self, provider: &str) -> ProviderState {
        let now = self.clock.now();
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(provider.to_string()).or_default();

        if self.refresh(provider, circuit, now) {
            ProviderState::Disabled
        } else {
            ProviderState::Active
        }
    }

    /// Check if requests are allowed for a provider.
    pub fn is_allowed(&self, provider: &str) -> bool {
        self.state(provider) == ProviderState::Active
    }

    /// Record a successful request for a provider.
    ///
    /// Resets the failure count. A success that arrives while the provider
    /// is disabled (e.g. a slow sibling call) does not cut the cooldown
    /// short; only the timer re-enables a provider.
    pub fn record_success(&self, provider: &str) {
        let now = self.clock.now();
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(provider.to_string()).or_default();

        let disabled = self.refresh(provider, circuit, now);
        circuit.consecutive_failures = 0;
        circuit.last_success_at = Some(now);

        if disabled {
            debug!(
                "Circuit breaker: late success for '{}' while disabled, failure count reset",
                provider
            );
        } else {
            debug!(
                "Circuit breaker: success for '{}', failure count reset",
                provider
            );
        }
    }

    /// Record a failed request for a provider.
    ///
    /// Disables the provider once the consecutive failure count reaches the
    /// threshold. Returns true if this call disabled it.
    pub fn record_failure(&self, provider: &str, reason: &str) -> bool {
        let now = self.clock.now();
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(provider.to_string()).or_default();

        let disabled = self.refresh(provider, circuit, now);
        circuit.consecutive_failures += 1;
        circuit.last_failure_at = Some(now);

        if disabled {
            debug!(
                "Circuit breaker: additional failure for '{}' (already disabled)",
                provider
            );
            return false;
        }

        if circuit.consecutive_failures >= self.config.failure_threshold {
            let until = now
                .checked_add_signed(self.config.cooldown())
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            circuit.disabled_until = Some(until);
            warn!(
                "Circuit breaker: disabling '{}' until {} after {} consecutive failures (last: {})",
                provider, until, circuit.consecutive_failures, reason
            );
            self.sink.emit(ProviderEvent::new(
                now,
                provider,
                EventKind::Disabled,
                format!(
                    "{} consecutive failures, disabled until {}: {}",
                    circuit.consecutive_failures, until, reason
                ),
            ));
            true
        } else {
            debug!(
                "Circuit breaker: failure for '{}' ({}/{})",
                provider, circuit.consecutive_failures, self.config.failure_threshold
            );
            false
        }
    }

    /// Get the consecutive failure count for a provider.
    pub fn failure_count(&self, provider: &str) -> u32 {
        self.lock_circuits()
            .get(provider)
            .map(|c| c.consecutive_failures)
            .unwrap_or(0)
    }

    /// Copy of a provider's failure state, after the lazy transition.
    pub fn snapshot(&self, provider: &str) -> FailureState {
        let now = self.clock.now();
        let mut circuits = self.lock_circuits();
        let circuit = circuits.entry(provider.to_string()).or_default();
        self.refresh(provider, circuit, now);

        FailureState {
            consecutive_failures: circuit.consecutive_failures,
            disabled_until: circuit.disabled_until,
            last_success_at: circuit.last_success_at,
            last_failure_at: circuit.last_failure_at,
        }
    }

    /// Reset the circuit for a provider to Active with no failures.
    pub fn reset(&self, provider: &str) {
        let mut circuits = self.lock_circuits();

        if let Some(circuit) = circuits.get_mut(provider) {
            info!(
                "Circuit breaker: manually resetting circuit for '{}'",
                provider
            );
            circuit.consecutive_failures = 0;
            circuit.disabled_until = None;
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::MemoryEventSink;
    use chrono::TimeZone;

    fn breaker() -> (CircuitBreaker, Arc<ManualClock>, MemoryEventSink) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 2, 0, 0).unwrap(),
        ));
        let sink = MemoryEventSink::new();
        let cb = CircuitBreaker::with_config(
            CircuitBreakerConfig::default(),
            clock.clone(),
            Arc::new(sink.clone()),
        );
        (cb, clock, sink)
    }

    #[test]
    fn test_circuit_starts_active() {
        let (cb, _, _) = breaker();
        assert!(cb.is_allowed("SINA"));
        assert_eq!(cb.state("SINA"), ProviderState::Active);
    }

    #[test]
    fn test_disables_after_threshold() {
        let (cb, _, sink) = breaker();

        assert!(!cb.record_failure("SINA", "timeout"));
        assert!(!cb.record_failure("SINA", "timeout"));
        assert!(cb.is_allowed("SINA"));

        assert!(cb.record_failure("SINA", "timeout"));
        assert!(!cb.is_allowed("SINA"));
        assert_eq!(sink.of_kind(EventKind::Disabled).len(), 1);
    }

    #[test]
    fn test_oversized_cooldown_saturates() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 2, 0, 0).unwrap(),
        ));
        let config = CircuitBreakerConfig {
            failure_threshold: 3,
            cooldown_secs: 100_000_000_000_000,
        };
        let cb = CircuitBreaker::with_config(config, clock, Arc::new(NoOpEventSink));

        for _ in 0..3 {
            cb.record_failure("SINA", "timeout");
        }

        assert!(!cb.is_allowed("SINA"));
        assert_eq!(
            cb.snapshot("SINA").disabled_until,
            Some(DateTime::<Utc>::MAX_UTC)
        );
    }

    #[test]
    fn test_success_resets_failure_count() {
        let (cb, _, _) = breaker();

        cb.record_failure("TENCENT", "HTTP 502");
        cb.record_failure("TENCENT", "HTTP 502");
        assert_eq!(cb.failure_count("TENCENT"), 2);

        cb.record_success("TENCENT");
        assert_eq!(cb.failure_count("TENCENT"), 0);
        assert!(cb.snapshot("TENCENT").last_success_at.is_some());
    }

    #[test]
    fn test_late_success_does_not_bypass_cooldown() {
        let (cb, clock, _) = breaker();
        for _ in 0..3 {
            cb.record_failure("SINA", "timeout");
        }

        clock.advance(Duration::minutes(2));
        cb.record_success("SINA");

        assert_eq!(cb.failure_count("SINA"), 0);
        assert_eq!(cb.state("SINA"), ProviderState::Disabled);
    }

    #[test]
    fn test_reenabled_exactly_at_deadline_keeps_count() {
        let (cb, clock, sink) = breaker();
        for _ in 0..3 {
            cb.record_failure("SINA", "timeout");
        }
        let until = cb.snapshot("SINA").disabled_until.unwrap();

        clock.set(until - Duration::milliseconds(1));
        assert!(!cb.is_allowed("SINA"));

        clock.set(until);
        assert!(cb.is_allowed("SINA"));
        assert_eq!(cb.failure_count("SINA"), 3);
        assert_eq!(sink.of_kind(EventKind::ReEnabled).len(), 1);
    }

    #[test]
    fn test_failure_after_reenable_disables_again() {
        let (cb, clock, _) = breaker();
        for _ in 0..3 {
            cb.record_failure("SINA", "timeout");
        }
        clock.advance(Duration::minutes(10));
        assert!(cb.is_allowed("SINA"));

        assert!(cb.record_failure("SINA", "timeout"));
        assert!(!cb.is_allowed("SINA"));
    }

    #[test]
    fn test_failures_while_disabled_do_not_extend_cooldown() {
        let (cb, clock, _) = breaker();
        for _ in 0..3 {
            cb.record_failure("SINA", "timeout");
        }
        let until = cb.snapshot("SINA").disabled_until.unwrap();

        clock.advance(Duration::minutes(5));
        assert!(!cb.record_failure("SINA", "late sibling failure"));
        assert_eq!(cb.snapshot("SINA").disabled_until, Some(until));
        assert_eq!(cb.failure_count("SINA"), 4);
    }

    #[test]
    fn test_manual_reset() {
        let (cb, _, _) = breaker();
        for _ in 0..3 {
            cb.record_failure("EASTMONEY", "timeout");
        }
        assert_eq!(cb.state("EASTMONEY"), ProviderState::Disabled);

        cb.reset("EASTMONEY");
        assert_eq!(cb.state("EASTMONEY"), ProviderState::Active);
        assert_eq!(cb.failure_count("EASTMONEY"), 0);
    }

    #[test]
    fn test_provider_isolation() {
        let (cb, _, _) = breaker();
        for _ in 0..3 {
            cb.record_failure("SINA", "timeout");
        }

        assert!(!cb.is_allowed("SINA"));
        assert!(cb.is_allowed("TENCENT"));
        assert_eq!(cb.failure_count("TENCENT"), 0);
    }
}
