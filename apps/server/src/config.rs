use std::path::PathBuf;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8088";

/// Server settings read from the environment (and `.env`, if present).
#[derive(Clone, Debug)]
pub struct Config {
    /// `ETFPULSE_LISTEN_ADDR`
    pub listen_addr: String,
    /// `ETFPULSE_CONFIG`: JSON file with the market data configuration.
    pub market_data_config: Option<PathBuf>,
    /// `ETFPULSE_EVENT_LOG`: provider events are appended here as JSON lines.
    pub event_log: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let listen_addr = std::env::var("ETFPULSE_LISTEN_ADDR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

        Self {
            listen_addr,
            market_data_config: path_var("ETFPULSE_CONFIG"),
            event_log: path_var("ETFPULSE_EVENT_LOG"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            market_data_config: None,
            event_log: None,
        }
    }
}

fn path_var(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
