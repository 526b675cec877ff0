//! Static description of a provider.

use super::template::EndpointTemplate;
use crate::errors::MarketDataError;

/// Describes one provider: identity, static priority and endpoints.
///
/// Built once at process start. The runtime `status` and priority penalty
/// live in the failure tracker and quality recorder, not here.
#[derive(Clone, Debug)]
pub struct ProviderDescriptor {
    /// Unique identifier, e.g. "SINA".
    pub id: &'static str,

    /// Human-readable name for dashboards.
    pub display_name: &'static str,

    /// Static priority. Lower values = higher priority.
    pub priority: i32,

    /// Real-time quote endpoint.
    pub realtime_endpoint: Option<EndpointTemplate>,

    /// Daily series endpoint.
    pub series_endpoint: Option<EndpointTemplate>,
}

impl ProviderDescriptor {
    /// Descriptor without endpoints, for adapters that are not HTTP-backed.
    pub fn new(id: &'static str, display_name: &'static str, priority: i32) -> Self {
        Self {
            id,
            display_name,
            priority,
            realtime_endpoint: None,
            series_endpoint: None,
        }
    }

    /// Descriptor with validated endpoint templates.
    pub fn with_endpoints(
        id: &'static str,
        display_name: &'static str,
        priority: i32,
        realtime_template: &str,
        series_template: &str,
    ) -> Result<Self, MarketDataError> {
        Ok(Self {
            id,
            display_name,
            priority,
            realtime_endpoint: Some(EndpointTemplate::parse(realtime_template)?),
            series_endpoint: Some(EndpointTemplate::parse(series_template)?),
        })
    }

    pub(crate) fn realtime(&self) -> Result<&EndpointTemplate, MarketDataError> {
        self.realtime_endpoint.as_ref().ok_or_else(|| {
            MarketDataError::Configuration(format!("{} has no realtime endpoint", self.id))
        })
    }

    pub(crate) fn series(&self) -> Result<&EndpointTemplate, MarketDataError> {
        self.series_endpoint.as_ref().ok_or_else(|| {
            MarketDataError::Configuration(format!("{} has no series endpoint", self.id))
        })
    }
}
