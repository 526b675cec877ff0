//! East Money provider.
//!
//! # API Endpoints
//!
//! - Latest price: `https://push2.eastmoney.com/api/qt/stock/get?secid={secid}&fields=f43,f57,f58&fltt=2`
//! - Daily candles: `https://push2his.eastmoney.com/api/qt/stock/kline/get?secid={secid}&fields1=f1,f3&fields2=f51,f52,f53,f54,f55,f56&klt=101&fqt=1&end=20500101&lmt={days}`
//!
//! # Response Format
//!
//! JSON with a `data` object (null for unknown instruments). With `fltt=2`
//! the price field `f43` is already a decimal number, or `"-"` when the
//! instrument has not traded. Candles are comma-separated strings
//! `date,open,close,high,low,volume`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::MarketDataError;
use crate::models::{Candle, Instrument};
use crate::provider::http::{self, ProviderHttp};
use crate::provider::{MarketDataProvider, ProviderDescriptor};

pub const PROVIDER_ID: &str = "EASTMONEY";
const DISPLAY_NAME: &str = "East Money";
const DEFAULT_PRIORITY: i32 = 3;

pub const DEFAULT_REALTIME_TEMPLATE: &str =
    "https://push2.eastmoney.com/api/qt/stock/get?secid={secid}&fields=f43,f57,f58&fltt=2";
pub const DEFAULT_SERIES_TEMPLATE: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get?secid={secid}&fields1=f1,f3&fields2=f51,f52,f53,f54,f55,f56&klt=101&fqt=1&end=20500101&lmt={days}";

const REFERER: &str = "https://quote.eastmoney.com/";

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    data: Option<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    f43: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

pub struct EastMoneyProvider {
    descriptor: ProviderDescriptor,
    http: ProviderHttp,
}

impl EastMoneyProvider {
    /// Create the provider with the default endpoints.
    pub fn new() -> Result<Self, MarketDataError> {
        Self::with_endpoints(
            DEFAULT_PRIORITY,
            DEFAULT_REALTIME_TEMPLATE,
            DEFAULT_SERIES_TEMPLATE,
        )
    }

    /// Create the provider with overridden priority or endpoints.
    pub fn with_endpoints(
        priority: i32,
        realtime_template: &str,
        series_template: &str,
    ) -> Result<Self, MarketDataError> {
        Ok(Self {
            descriptor: ProviderDescriptor::with_endpoints(
                PROVIDER_ID,
                DISPLAY_NAME,
                priority,
                realtime_template,
                series_template,
            )?,
            http: ProviderHttp::new(PROVIDER_ID, Some(REFERER))?,
        })
    }

    pub fn default_priority() -> i32 {
        DEFAULT_PRIORITY
    }

    fn parse_realtime(body: &str) -> Result<Decimal, MarketDataError> {
        let response: QuoteResponse =
            serde_json::from_str(body).map_err(|e| http::malformed(PROVIDER_ID, e.to_string()))?;

        let data = response
            .data
            .ok_or_else(|| http::malformed(PROVIDER_ID, "null data (unknown secid?)"))?;

        match data.f43 {
            Some(Value::Number(n)) => http::parse_price(PROVIDER_ID, &n.to_string()),
            Some(Value::String(s)) => http::parse_price(PROVIDER_ID, &s),
            Some(other) => http::parse_price(PROVIDER_ID, &other.to_string()),
            None => Err(http::malformed(PROVIDER_ID, "missing f43 price field")),
        }
    }

    fn parse_series(body: &str) -> Result<Vec<Candle>, MarketDataError> {
        let response: KlineResponse =
            serde_json::from_str(body).map_err(|e| http::malformed(PROVIDER_ID, e.to_string()))?;

        let Some(data) = response.data else {
            return Ok(Vec::new());
        };

        let mut candles = Vec::with_capacity(data.klines.len());
        for line in &data.klines {
            let cells: Vec<&str> = line.split(',').collect();
            if cells.len() < 6 {
                return Err(http::malformed(
                    PROVIDER_ID,
                    format!("kline `{line}` has {} cells, expected 6", cells.len()),
                ));
            }

            candles.push(Candle {
                date: http::parse_day(PROVIDER_ID, cells[0])?,
                open: http::parse_number(PROVIDER_ID, cells[1])?,
                close: http::parse_number(PROVIDER_ID, cells[2])?,
                high: http::parse_number(PROVIDER_ID, cells[3])?,
                low: http::parse_number(PROVIDER_ID, cells[4])?,
                volume: http::parse_number(PROVIDER_ID, cells[5])?,
            });
        }

        candles.sort_by_key(|c| c.date);
        Ok(candles)
    }
}

#[async_trait]
impl MarketDataProvider for EastMoneyProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn fetch_realtime(&self, instrument: &Instrument) -> Result<Decimal, MarketDataError> {
        let url = self.descriptor.realtime()?.render(instrument, 0);
        let body = self.http.get_text(&url).await?;
        Self::parse_realtime(&body)
    }

    async fn fetch_series(
        &self,
        instrument: &Instrument,
        lookback_days: u32,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let url = self.descriptor.series()?.render(instrument, lookback_days);
        let body = self.http.get_text(&url).await?;
        Self::parse_series(&body)
    }
}
