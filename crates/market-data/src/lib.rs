//! ETF Pulse market data crate.
//!
//! A resilient acquisition layer for exchange-traded fund prices. It pulls
//! realtime quotes and daily candles from several independent,
//! unreliable, rate-limited HTTP backends and returns one trustworthy
//! answer per request, or a single typed failure.
//!
//! # Architecture
//!
//! ```text
//!   caller
//!     |  fetch_realtime / fetch_kline_data
//!     v
//! +---------------------+      +-------------------+
//! |  AcquisitionEngine  | ---> |  Source selector  |  (failures asc, priority asc)
//! +---------------------+      +-------------------+
//!     |  race top N, serial fallback
//!     v
//! +---------------------+
//! |  Governor (per id)  |  (min interval, max concurrent, self-tuning)
//! +---------------------+
//!     |
//!     v
//! +---------------------+
//! |  Provider adapter   |  (Sina, Tencent, East Money)
//! +---------------------+
//!     |
//!     v
//!  validate -> reconcile -> circuit breaker + quality recorder
//! ```
//!
//! # Core Types
//!
//! - [`AcquisitionEngine`] - Owns all per-provider state; the upward API
//! - [`Instrument`] - A six-digit fund code plus its exchange
//! - [`Quote`] / [`Candle`] - Normalized results
//! - [`MarketDataProvider`] - The adapter trait
//! - [`MarketDataConfig`] - Serde configuration for every component
//! - [`EventSink`] - Receiver for structured provider events

pub mod clock;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod provider;
pub mod registry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CrossValidationConfig, MarketDataConfig, ProviderSettings};
pub use errors::{MarketDataError, RetryClass};
pub use events::{
    EventKind, EventSink, JsonLinesFileSink, LogEventSink, MemoryEventSink, NoOpEventSink,
    ProviderEvent,
};
pub use models::{
    Candle, EngineStatus, Exchange, Instrument, ProviderState, ProviderStatus, Quote,
};
pub use provider::{
    build_providers, EastMoneyProvider, MarketDataProvider, ProviderDescriptor, SinaProvider,
    TencentProvider,
};
pub use registry::AcquisitionEngine;
