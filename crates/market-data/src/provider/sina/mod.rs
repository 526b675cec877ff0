//! Sina Finance provider.
//!
//! # API Endpoints
//!
//! - Latest price: `https://hq.sinajs.cn/list={symbol}`
//! - Daily candles: `https://money.finance.sina.com.cn/quotes_service/api/json_v2.php/CN_MarketData.getKLineData?symbol={symbol}&scale=240&ma=no&datalen={days}`
//!
//! # Response Format
//!
//! The quote endpoint answers with a JavaScript assignment,
//! `var hq_str_sh510300="name,open,prev_close,price,high,low,...";`.
//! The candle endpoint answers with a JSON array of objects whose values are
//! all strings.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::MarketDataError;
use crate::models::{Candle, Instrument};
use crate::provider::http::{self, ProviderHttp};
use crate::provider::{MarketDataProvider, ProviderDescriptor};

pub const PROVIDER_ID: &str = "SINA";
const DISPLAY_NAME: &str = "Sina Finance";
const DEFAULT_PRIORITY: i32 = 1;

pub const DEFAULT_REALTIME_TEMPLATE: &str = "https://hq.sinajs.cn/list={symbol}";
pub const DEFAULT_SERIES_TEMPLATE: &str = "https://money.finance.sina.com.cn/quotes_service/api/json_v2.php/CN_MarketData.getKLineData?symbol={symbol}&scale=240&ma=no&datalen={days}";

/// Sina rejects requests without a finance.sina.com.cn referer.
const REFERER: &str = "https://finance.sina.com.cn";

/// Index of the current price in the comma-separated quote body.
const PRICE_FIELD: usize = 3;

#[derive(Debug, Deserialize)]
struct SinaBar {
    day: String,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

pub struct SinaProvider {
    descriptor: ProviderDescriptor,
    http: ProviderHttp,
}

impl SinaProvider {
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
        let quote = http::quoted_body(PROVIDER_ID, body)?;
        if quote.is_empty() {
            return Err(http::malformed(PROVIDER_ID, "empty quote body (unknown symbol?)"));
        }

        let fields: Vec<&str> = quote.split(',').collect();
        let price = fields.get(PRICE_FIELD).ok_or_else(|| {
            http::malformed(
                PROVIDER_ID,
                format!("expected at least {} fields, got {}", PRICE_FIELD + 1, fields.len()),
            )
        })?;

        http::parse_price(PROVIDER_ID, price)
    }

    fn parse_series(body: &str) -> Result<Vec<Candle>, MarketDataError> {
        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(Vec::new());
        }

        let bars: Vec<SinaBar> = serde_json::from_str(trimmed)
            .map_err(|e| http::malformed(PROVIDER_ID, e.to_string()))?;

        let mut candles = bars
            .iter()
            .map(|bar| {
                Ok(Candle {
                    date: http::parse_day(PROVIDER_ID, &bar.day)?,
                    open: http::parse_number(PROVIDER_ID, &bar.open)?,
                    high: http::parse_number(PROVIDER_ID, &bar.high)?,
                    low: http::parse_number(PROVIDER_ID, &bar.low)?,
                    close: http::parse_number(PROVIDER_ID, &bar.close)?,
                    volume: http::parse_number(PROVIDER_ID, &bar.volume)?,
                })
            })
            .collect::<Result<Vec<_>, MarketDataError>>()?;

        candles.sort_by_key(|c| c.date);
        Ok(candles)
    }
}

#[async_trait]
impl MarketDataProvider for SinaProvider {
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const QUOTE: &str = "var hq_str_sh510300=\"300ETF,3.950,3.948,3.962,3.972,3.941,3.961,3.962,512345678,2023456789.000,1200,3.961,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,2024-03-04,14:59:59,00,\";";

    #[test]
    fn test_parse_realtime() {
        assert_eq!(SinaProvider::parse_realtime(QUOTE).unwrap(), dec!(3.962));
    }

    #[test]
    fn test_parse_realtime_unknown_symbol() {
        let err = SinaProvider::parse_realtime("var hq_str_sh999999=\"\";").unwrap_err();
        assert!(matches!(err, MarketDataError::MalformedPayload { .. }));
    }

    #[test]
    fn test_parse_realtime_non_numeric_price() {
        let body = "var hq_str_sh510300=\"300ETF,3.950,3.948,--,3.972\";";
        let err = SinaProvider::parse_realtime(body).unwrap_err();
        assert!(matches!(err, MarketDataError::InvalidData { .. }));
    }

    #[test]
    fn test_parse_realtime_too_few_fields() {
        let body = "var hq_str_sh510300=\"300ETF,3.950\";";
        let err = SinaProvider::parse_realtime(body).unwrap_err();
        assert!(matches!(err, MarketDataError::MalformedPayload { .. }));
    }

    #[test]
    fn test_parse_series_sorted_ascending() {
        let body = r#"[
            {"day":"2024-03-04","open":"3.540","high":"3.560","low":"3.500","close":"3.520","volume":"2000"},
            {"day":"2024-03-01","open":"3.500","high":"3.550","low":"3.480","close":"3.540","volume":"1000"}
        ]"#;
        let candles = SinaProvider::parse_series(body).unwrap();
        assert_eq!(candles.len(), 2);
        assert!(candles[0].date < candles[1].date);
        assert_eq!(candles[0].close, dec!(3.540));
        assert_eq!(candles[1].volume, dec!(2000));
    }

    #[test]
    fn test_parse_series_null_is_empty() {
        assert!(SinaProvider::parse_series("null").unwrap().is_empty());
    }

    #[test]
    fn test_parse_series_garbage_is_malformed() {
        let err = SinaProvider::parse_series("<html>blocked</html>").unwrap_err();
        assert!(matches!(err, MarketDataError::MalformedPayload { .. }));
    }

    #[test]
    fn test_provider_id() {
        let provider = SinaProvider::new().unwrap();
        assert_eq!(provider.id(), "SINA");
        assert_eq!(provider.descriptor().priority, 1);
    }
}
