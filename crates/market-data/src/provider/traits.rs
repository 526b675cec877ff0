//! Market data provider trait definitions.
//!
//! This module defines the core `MarketDataProvider` trait that every
//! backend adapter implements.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::MarketDataError;
use crate::models::{Candle, Instrument};

use super::descriptor::ProviderDescriptor;

/// Trait for market data providers.
///
/// One implementation per backend. An adapter only translates the
/// provider's bespoke response format into normalized values; rate
/// limiting, timeouts, validation and failure accounting all happen in the
/// engine, so a parsing change in one adapter cannot affect the others.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use etfpulse_market_data::provider::{MarketDataProvider, ProviderDescriptor};
///
/// struct MyProvider {
///     descriptor: ProviderDescriptor,
/// }
///
/// #[async_trait]
/// impl MarketDataProvider for MyProvider {
///     fn descriptor(&self) -> &ProviderDescriptor {
///         &self.descriptor
///     }
///
///     // ... implement fetch methods
/// }
/// ```
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Static identity, priority and endpoints.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Unique identifier for this provider.
    ///
    /// Used for logging, failure tracking and status snapshots.
    fn id(&self) -> &'static str {
        self.descriptor().id
    }

    /// Fetch the current price for an instrument.
    ///
    /// Returns [`MarketDataError::InvalidData`] when the response is well
    /// formed but the price field is not a number.
    async fn fetch_realtime(&self, instrument: &Instrument) -> Result<Decimal, MarketDataError>;

    /// Fetch up to `lookback_days` daily candles, ascending by date.
    async fn fetch_series(
        &self,
        instrument: &Instrument,
        lookback_days: u32,
    ) -> Result<Vec<Candle>, MarketDataError>;
}
