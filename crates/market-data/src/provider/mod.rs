//! Provider adapters.
//!
//! This module contains:
//! - The `MarketDataProvider` trait that every adapter implements
//! - `ProviderDescriptor` and endpoint template handling
//! - One adapter per backend: Sina, Tencent, East Money
//!
//! Adapters only translate. Governing, validation, failure tracking and
//! fallback all live in the registry, so a parsing change in one adapter
//! cannot affect the others.

mod descriptor;
pub(crate) mod http;
mod template;
mod traits;

pub mod eastmoney;
pub mod sina;
pub mod tencent;

use std::sync::Arc;

use log::info;

pub use descriptor::ProviderDescriptor;
pub use eastmoney::EastMoneyProvider;
pub use sina::SinaProvider;
pub use template::EndpointTemplate;
pub use tencent::TencentProvider;
pub use traits::MarketDataProvider;

use crate::config::MarketDataConfig;
use crate::errors::MarketDataError;

/// The fixed provider set, in default priority order.
pub const KNOWN_PROVIDERS: &[&str] = &[
    sina::PROVIDER_ID,
    tencent::PROVIDER_ID,
    eastmoney::PROVIDER_ID,
];

/// Build the enabled adapters with configured priorities and endpoints.
pub fn build_providers(
    config: &MarketDataConfig,
) -> Result<Vec<Arc<dyn MarketDataProvider>>, MarketDataError> {
    let mut providers: Vec<Arc<dyn MarketDataProvider>> = Vec::new();

    for id in KNOWN_PROVIDERS {
        let settings = config.provider(id);
        if !settings.enabled {
            info!("Provider '{}' disabled by configuration", id);
            continue;
        }

        let realtime = settings.realtime_template.as_deref();
        let series = settings.series_template.as_deref();

        let provider: Arc<dyn MarketDataProvider> = match *id {
            sina::PROVIDER_ID => Arc::new(SinaProvider::with_endpoints(
                settings.priority.unwrap_or(SinaProvider::default_priority()),
                realtime.unwrap_or(sina::DEFAULT_REALTIME_TEMPLATE),
                series.unwrap_or(sina::DEFAULT_SERIES_TEMPLATE),
            )?),
            tencent::PROVIDER_ID => Arc::new(TencentProvider::with_endpoints(
                settings.priority.unwrap_or(TencentProvider::default_priority()),
                realtime.unwrap_or(tencent::DEFAULT_REALTIME_TEMPLATE),
                series.unwrap_or(tencent::DEFAULT_SERIES_TEMPLATE),
            )?),
            eastmoney::PROVIDER_ID => Arc::new(EastMoneyProvider::with_endpoints(
                settings.priority.unwrap_or(EastMoneyProvider::default_priority()),
                realtime.unwrap_or(eastmoney::DEFAULT_REALTIME_TEMPLATE),
                series.unwrap_or(eastmoney::DEFAULT_SERIES_TEMPLATE),
            )?),
            other => return Err(MarketDataError::UnknownProvider(other.to_string())),
        };
        providers.push(provider);
    }

    if providers.is_empty() {
        return Err(MarketDataError::Configuration(
            "no providers enabled".to_string(),
        ));
    }

    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_all_by_default() {
        let providers = build_providers(&MarketDataConfig::default()).unwrap();
        let ids: Vec<_> = providers.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["SINA", "TENCENT", "EASTMONEY"]);
        assert_eq!(providers[2].descriptor().priority, 3);
    }

    #[test]
    fn test_applies_overrides() {
        let config = MarketDataConfig::from_json_str(
            r#"{"providers": {
                "SINA": {"enabled": false},
                "EASTMONEY": {"priority": 0, "realtimeTemplate": "https://mirror.example/q?secid={secid}"}
            }}"#,
        )
        .unwrap();
        let providers = build_providers(&config).unwrap();

        assert_eq!(providers.len(), 2);
        let eastmoney = &providers[1];
        assert_eq!(eastmoney.id(), "EASTMONEY");
        assert_eq!(eastmoney.descriptor().priority, 0);
        assert_eq!(
            eastmoney.descriptor().realtime_endpoint.as_ref().unwrap().as_str(),
            "https://mirror.example/q?secid={secid}"
        );
    }
}
