use chrono::{DateTime, Utc};
use serde::Serialize;

/// Whether a provider may currently be selected.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderState {
    Active,
    Disabled,
}

impl std::fmt::Display for ProviderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Read-only view of one provider for dashboards.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub id: String,
    pub name: String,
    pub status: ProviderState,
    pub failure_count: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub disabled_until: Option<DateTime<Utc>>,
    /// Static priority from configuration
    pub priority: i32,
    /// Static priority plus the quality penalty
    pub effective_priority: i32,
    pub total_requests: u64,
    pub success_rate: f64,
    pub avg_response_ms: f64,
    pub recent_quality_issues: usize,
    pub min_interval_ms: u64,
    pub max_concurrent: usize,
}

/// Snapshot returned by `AcquisitionEngine::status`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub current_source: Option<String>,
    pub providers: Vec<ProviderStatus>,
}
