use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A trusted real-time price for one instrument.
///
/// Constructed once by the engine after validation and reconciliation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Exchange-prefixed instrument symbol
    pub instrument_id: String,

    /// Reconciled price
    pub price: Decimal,

    /// When the engine accepted the price
    pub observed_at: DateTime<Utc>,

    /// Provider whose answer was used (or the first of the agreeing providers)
    pub source_provider_id: String,

    /// Other providers whose valid answers went into the price
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corroborated_by: Vec<String>,
}

impl Quote {
    /// Create a quote served by a single provider
    pub fn new(
        instrument_id: String,
        price: Decimal,
        observed_at: DateTime<Utc>,
        source_provider_id: String,
    ) -> Self {
        Self {
            instrument_id,
            price,
            observed_at,
            source_provider_id,
            corroborated_by: Vec::new(),
        }
    }
}

/// One daily bar of a price series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}
