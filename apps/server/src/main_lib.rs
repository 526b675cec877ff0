use std::sync::Arc;

use anyhow::Context;
use etfpulse_market_data::{
    AcquisitionEngine, EventSink, JsonLinesFileSink, LogEventSink, MarketDataConfig,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub struct AppState {
    pub engine: Arc<AcquisitionEngine>,
}

pub fn init_tracing() {
    let log_format = std::env::var("ETFPULSE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // `init` also installs the `log` bridge, so the market data crate's
    // records land in the same output.
    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let market_data_config = match &config.market_data_config {
        Some(path) => {
            tracing::info!("Loading market data config from {}", path.display());
            MarketDataConfig::load(path)?
        }
        None => MarketDataConfig::default(),
    };

    let sink: Arc<dyn EventSink> = match &config.event_log {
        Some(path) => {
            tracing::info!("Appending provider events to {}", path.display());
            Arc::new(
                JsonLinesFileSink::open(path)
                    .with_context(|| format!("cannot open event log {}", path.display()))?,
            )
        }
        None => Arc::new(LogEventSink),
    };

    let engine = AcquisitionEngine::from_config(&market_data_config, sink)?;
    Ok(Arc::new(AppState {
        engine: Arc::new(engine),
    }))
}
