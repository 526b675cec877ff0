//! Market data models
//!
//! - `instrument` - Instrument identity and exchange inference
//! - `quote` - Quote and Candle data structures
//! - `status` - Status snapshot exposed to dashboards

mod instrument;
mod quote;
mod status;

pub use instrument::{Exchange, Instrument};
pub use quote::{Candle, Quote};
pub use status::{EngineStatus, ProviderState, ProviderStatus};
