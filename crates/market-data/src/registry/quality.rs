//! Rolling per-provider performance and data-quality statistics.
//!
//! Network failures go to the [`CircuitBreaker`](super::CircuitBreaker).
//! This recorder keeps the softer signal: responses that arrived but carried
//! garbage. A provider that keeps producing them has its selection priority
//! pushed back without being disabled outright.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::clock::{self, Clock, SystemClock};

/// Quality recorder configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QualityConfig {
    /// Issues older than this are pruned.
    pub window_secs: u64,
    /// Ring buffer size per provider.
    pub max_recent_issues: usize,
    /// Issue count in the window above which the penalty grows.
    pub penalty_threshold: usize,
    /// Upper bound on the priority penalty.
    pub max_penalty: i32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            window_secs: 60 * 60,
            max_recent_issues: 100,
            penalty_threshold: 10,
            max_penalty: 10,
        }
    }
}

/// One recorded quality problem.
#[derive(Clone, Debug, PartialEq)]
pub struct QualityIssue {
    pub at: DateTime<Utc>,
    pub kind: String,
    pub detail: String,
}

#[derive(Debug, Default)]
struct Metrics {
    total_requests: u64,
    successful_requests: u64,
    total_response_time_ms: u64,
    last_success_at: Option<DateTime<Utc>>,
    recent_issues: VecDeque<QualityIssue>,
    penalty: i32,
}

impl Metrics {
    fn prune(&mut self, cutoff: DateTime<Utc>) {
        while self
            .recent_issues
            .front()
            .is_some_and(|issue| issue.at < cutoff)
        {
            self.recent_issues.pop_front();
        }
    }
}

/// Derived view of a provider's metrics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PerformanceSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    /// Fraction in `[0, 1]`; `1.0` before any request.
    pub success_rate: f64,
    pub avg_response_ms: f64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub recent_quality_issues: usize,
    pub penalty: i32,
}

pub struct QualityRecorder {
    metrics: Mutex<HashMap<String, Metrics>>,
    config: QualityConfig,
    clock: Arc<dyn Clock>,
}

impl QualityRecorder {
    pub fn new() -> Self {
        Self::with_config(QualityConfig::default(), Arc::new(SystemClock))
    }

    pub fn with_config(config: QualityConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            metrics: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    fn lock_metrics(&self) -> MutexGuard<'_, HashMap<String, Metrics>> {
        self.metrics.lock().unwrap_or_else(|poisoned| {
            warn!("Quality recorder mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(clock::seconds(self.config.window_secs))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Count a request that produced a usable response.
    pub fn record_success(&self, provider: &str, latency_ms: u64) {
        let now = self.clock.now();
        let mut metrics = self.lock_metrics();
        let m = metrics.entry(provider.to_string()).or_default();
        m.total_requests += 1;
        m.successful_requests += 1;
        m.total_response_time_ms += latency_ms;
        m.last_success_at = Some(now);
    }

    /// Count a request that failed or returned unusable data.
    pub fn record_failure(&self, provider: &str, latency_ms: u64) {
        let mut metrics = self.lock_metrics();
        let m = metrics.entry(provider.to_string()).or_default();
        m.total_requests += 1;
        m.total_response_time_ms += latency_ms;
    }

    /// Append a quality issue and return the provider's resulting penalty.
    pub fn record_quality_issue(&self, provider: &str, kind: &str, detail: &str) -> i32 {
        let now = self.clock.now();
        let cutoff = self.cutoff(now);
        let mut metrics = self.lock_metrics();
        let m = metrics.entry(provider.to_string()).or_default();

        m.recent_issues.push_back(QualityIssue {
            at: now,
            kind: kind.to_string(),
            detail: detail.to_string(),
        });
        while m.recent_issues.len() > self.config.max_recent_issues {
            m.recent_issues.pop_front();
        }
        m.prune(cutoff);

        if m.recent_issues.len() > self.config.penalty_threshold
            && m.penalty < self.config.max_penalty
        {
            m.penalty += 1;
            warn!(
                "Quality: {} issues for '{}' in the last {}s, priority penalty now {}",
                m.recent_issues.len(),
                provider,
                self.config.window_secs,
                m.penalty
            );
        } else {
            debug!(
                "Quality: issue '{}' for '{}' ({} in window)",
                kind,
                provider,
                m.recent_issues.len()
            );
        }

        m.penalty
    }

    /// Current priority penalty for a provider.
    pub fn penalty(&self, provider: &str) -> i32 {
        self.lock_metrics()
            .get(provider)
            .map(|m| m.penalty)
            .unwrap_or(0)
    }

    /// Issues still inside the window, oldest first.
    pub fn recent_issues(&self, provider: &str) -> Vec<QualityIssue> {
        let cutoff = self.cutoff(self.clock.now());
        let mut metrics = self.lock_metrics();
        match metrics.get_mut(provider) {
            Some(m) => {
                m.prune(cutoff);
                m.recent_issues.iter().cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn snapshot(&self, provider: &str) -> PerformanceSnapshot {
        let cutoff = self.cutoff(self.clock.now());
        let mut metrics = self.lock_metrics();
        let Some(m) = metrics.get_mut(provider) else {
            return PerformanceSnapshot {
                success_rate: 1.0,
                ..Default::default()
            };
        };
        m.prune(cutoff);

        let (success_rate, avg_response_ms) = if m.total_requests == 0 {
            (1.0, 0.0)
        } else {
            (
                m.successful_requests as f64 / m.total_requests as f64,
                m.total_response_time_ms as f64 / m.total_requests as f64,
            )
        };

        PerformanceSnapshot {
            total_requests: m.total_requests,
            successful_requests: m.successful_requests,
            success_rate,
            avg_response_ms,
            last_success_at: m.last_success_at,
            recent_quality_issues: m.recent_issues.len(),
            penalty: m.penalty,
        }
    }

    /// Clear quality issues and the penalty. Request counters are kept.
    pub fn reset(&self, provider: &str) {
        if let Some(m) = self.lock_metrics().get_mut(provider) {
            m.recent_issues.clear();
            m.penalty = 0;
        }
    }
}

impl Default for QualityRecorder {
    fn default() -> Self {
        Self::new()
    }
}
