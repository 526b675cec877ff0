//! Per-request attempt tracking.
//!
//! Every provider considered for a request leaves one record here. When all
//! of them fail, the summary travels inside `AllSourcesUnavailable`.

use std::fmt;

/// Why a provider was not called.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Circuit breaker has the provider disabled.
    Disabled,
}

/// How one provider attempt ended.
#[derive(Clone, Debug, PartialEq)]
pub enum AttemptOutcome {
    Accepted,
    /// Data arrived but failed validation.
    Rejected(String),
    /// Transport or payload failure.
    Failed(String),
    Skipped(SkipReason),
}

/// Record of a single provider attempt during a fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderAttempt {
    pub provider_id: String,
    pub outcome: AttemptOutcome,
}

impl fmt::Display for ProviderAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Accepted => write!(f, "{}: OK", self.provider_id),
            AttemptOutcome::Rejected(reason) => {
                write!(f, "{}: REJECTED ({})", self.provider_id, reason)
            }
            AttemptOutcome::Failed(reason) => write!(f, "{}: ERROR ({})", self.provider_id, reason),
            AttemptOutcome::Skipped(reason) => {
                write!(f, "{}: SKIPPED ({:?})", self.provider_id, reason)
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FetchDiagnostics {
    pub attempts: Vec<ProviderAttempt>,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, provider_id: &str, outcome: AttemptOutcome) {
        self.attempts.push(ProviderAttempt {
            provider_id: provider_id.to_string(),
            outcome,
        });
    }

    pub fn record_accepted(&mut self, provider_id: &str) {
        self.push(provider_id, AttemptOutcome::Accepted);
    }

    pub fn record_rejected(&mut self, provider_id: &str, reason: impl Into<String>) {
        self.push(provider_id, AttemptOutcome::Rejected(reason.into()));
    }

    pub fn record_failed(&mut self, provider_id: &str, reason: impl Into<String>) {
        self.push(provider_id, AttemptOutcome::Failed(reason.into()));
    }

    pub fn record_skip(&mut self, provider_id: &str, reason: SkipReason) {
        self.push(provider_id, AttemptOutcome::Skipped(reason));
    }

    /// Summary for logging and error messages.
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "no providers available".to_string();
        }
        self.attempts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
