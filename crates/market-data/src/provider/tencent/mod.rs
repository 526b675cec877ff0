//! Tencent Finance provider.
//!
//! # API Endpoints
//!
//! - Latest price: `https://qt.gtimg.cn/q={symbol}`
//! - Daily candles: `https://web.ifzq.gtimg.cn/appstock/app/fqkline/get?param={symbol},day,,,{days},qfq`
//!
//! # Response Format
//!
//! Quotes are `v_sh510300="1~name~code~price~prev_close~open~...";`, fields
//! separated by `~`. Candles are nested under `data.{symbol}` as either
//! `qfqday` (adjusted) or `day` rows of `[date, open, close, high, low, volume]`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::errors::MarketDataError;
use crate::models::{Candle, Instrument};
use crate::provider::http::{self, ProviderHttp};
use crate::provider::{MarketDataProvider, ProviderDescriptor};

pub const PROVIDER_ID: &str = "TENCENT";
const DISPLAY_NAME: &str = "Tencent Finance";
const DEFAULT_PRIORITY: i32 = 2;

pub const DEFAULT_REALTIME_TEMPLATE: &str = "https://qt.gtimg.cn/q={symbol}";
pub const DEFAULT_SERIES_TEMPLATE: &str =
    "https://web.ifzq.gtimg.cn/appstock/app/fqkline/get?param={symbol},day,,,{days},qfq";

const REFERER: &str = "https://gu.qq.com/";

/// Index of the current price in the `~`-separated quote body.
const PRICE_FIELD: usize = 3;

pub struct TencentProvider {
    descriptor: ProviderDescriptor,
    http: ProviderHttp,
}

impl TencentProvider {
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
        if body.contains("v_pv_none_match") {
            return Err(http::malformed(PROVIDER_ID, "unknown symbol"));
        }

        let quote = http::quoted_body(PROVIDER_ID, body)?;
        let fields: Vec<&str> = quote.split('~').collect();
        let price = fields.get(PRICE_FIELD).ok_or_else(|| {
            http::malformed(
                PROVIDER_ID,
                format!("expected at least {} fields, got {}", PRICE_FIELD + 1, fields.len()),
            )
        })?;

        http::parse_price(PROVIDER_ID, price)
    }

    fn parse_series(body: &str, symbol: &str) -> Result<Vec<Candle>, MarketDataError> {
        let root: Value =
            serde_json::from_str(body).map_err(|e| http::malformed(PROVIDER_ID, e.to_string()))?;

        if let Some(code) = root.get("code").and_then(Value::as_i64) {
            if code != 0 {
                let msg = root.get("msg").and_then(Value::as_str).unwrap_or_default();
                return Err(MarketDataError::ProviderError {
                    provider: PROVIDER_ID.to_string(),
                    message: format!("API code {code}: {msg}"),
                });
            }
        }

        let entry = root
            .get("data")
            .and_then(|data| data.get(symbol))
            .ok_or_else(|| http::malformed(PROVIDER_ID, format!("missing data.{symbol}")))?;

        let rows = entry
            .get("qfqday")
            .or_else(|| entry.get("day"))
            .and_then(Value::as_array)
            .ok_or_else(|| http::malformed(PROVIDER_ID, "missing daily rows"))?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let cells = row
                .as_array()
                .ok_or_else(|| http::malformed(PROVIDER_ID, "row is not an array"))?;
            if cells.len() < 6 {
                return Err(http::malformed(
                    PROVIDER_ID,
                    format!("row has {} cells, expected 6", cells.len()),
                ));
            }
            let cell = |i: usize| cell_text(&cells[i]);

            candles.push(Candle {
                date: http::parse_day(PROVIDER_ID, &cell(0))?,
                open: http::parse_number(PROVIDER_ID, &cell(1))?,
                close: http::parse_number(PROVIDER_ID, &cell(2))?,
                high: http::parse_number(PROVIDER_ID, &cell(3))?,
                low: http::parse_number(PROVIDER_ID, &cell(4))?,
                volume: http::parse_number(PROVIDER_ID, &cell(5))?,
            });
        }

        candles.sort_by_key(|c| c.date);
        Ok(candles)
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl MarketDataProvider for TencentProvider {
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
        Self::parse_series(&body, &instrument.symbol())
    }
}
