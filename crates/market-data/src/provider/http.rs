//! Shared HTTP plumbing for the adapters.

use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use log::debug;
use reqwest::header::{REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;

use crate::errors::MarketDataError;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Default HTTP request timeout
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin wrapper around a `reqwest` client that classifies failures per provider.
#[derive(Clone, Debug)]
pub(crate) struct ProviderHttp {
    client: Client,
    provider: &'static str,
    referer: Option<&'static str>,
}

impl ProviderHttp {
    pub fn new(
        provider: &'static str,
        referer: Option<&'static str>,
    ) -> Result<Self, MarketDataError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                MarketDataError::Configuration(format!(
                    "cannot build HTTP client for {}: {}",
                    provider, e
                ))
            })?;

        Ok(Self {
            client,
            provider,
            referer,
        })
    }

    /// GET a URL and return the body as text.
    ///
    /// Bodies are decoded lossily: some endpoints answer in GBK, and only the
    /// ASCII numeric fields are read.
    pub async fn get_text(&self, url: &str) -> Result<String, MarketDataError> {
        debug!("{} GET {}", self.provider, url);

        let mut request = self.client.get(url).header(USER_AGENT, BROWSER_USER_AGENT);
        if let Some(referer) = self.referer {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited {
                provider: self.provider.to_string(),
            });
        }

        if !response.status().is_success() {
            return Err(MarketDataError::ProviderError {
                provider: self.provider.to_string(),
                message: format!("HTTP error: {}", response.status()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn classify(&self, error: reqwest::Error) -> MarketDataError {
        if error.is_timeout() {
            MarketDataError::Timeout {
                provider: self.provider.to_string(),
            }
        } else {
            MarketDataError::ProviderError {
                provider: self.provider.to_string(),
                message: error.to_string(),
            }
        }
    }
}

pub(crate) fn malformed(provider: &str, message: impl Into<String>) -> MarketDataError {
    MarketDataError::MalformedPayload {
        provider: provider.to_string(),
        message: message.into(),
    }
}

/// Parse a price field. A field that is present but not numeric is bad data,
/// not a broken response.
pub(crate) fn parse_price(provider: &str, field: &str) -> Result<Decimal, MarketDataError> {
    let trimmed = field.trim();
    Decimal::from_str(trimmed).map_err(|_| MarketDataError::InvalidData {
        provider: provider.to_string(),
        message: format!("non-numeric price `{trimmed}`"),
    })
}

/// Parse a numeric series field; unlike prices these make the row malformed.
pub(crate) fn parse_number(provider: &str, field: &str) -> Result<Decimal, MarketDataError> {
    let trimmed = field.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| malformed(provider, format!("non-numeric series field `{trimmed}`")))
}

/// Parse the date part of `YYYY-MM-DD` or `YYYY-MM-DD hh:mm:ss`.
pub(crate) fn parse_day(provider: &str, field: &str) -> Result<NaiveDate, MarketDataError> {
    let day = field.trim().get(..10).unwrap_or(field);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| malformed(provider, format!("bad date `{field}`")))
}

/// Text between the first pair of double quotes, as used by the JS-style
/// quote endpoints (`var x="...";`).
pub(crate) fn quoted_body<'a>(provider: &str, text: &'a str) -> Result<&'a str, MarketDataError> {
    let start = text
        .find('"')
        .ok_or_else(|| malformed(provider, "missing quote body"))?;
    let rest = &text[start + 1..];
    let end = rest
        .find('"')
        .ok_or_else(|| malformed(provider, "unterminated quote body"))?;
    Ok(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_client_builds_with_timeout() {
        let http = ProviderHttp::new("SINA", Some("https://finance.sina.com.cn")).unwrap();
        assert_eq!(http.provider, "SINA");
        assert_eq!(http.referer, Some("https://finance.sina.com.cn"));
    }

    #[test]
    fn test_parse_price_non_numeric_is_invalid_data() {
        let err = parse_price("SINA", "--").unwrap_err();
        assert!(matches!(err, MarketDataError::InvalidData { .. }));
        assert_eq!(parse_price("SINA", " 3.950 ").unwrap(), dec!(3.950));
    }

    #[test]
    fn test_parse_number_malformed() {
        let err = parse_number("TENCENT", "abc").unwrap_err();
        assert!(matches!(err, MarketDataError::MalformedPayload { .. }));
        assert_eq!(parse_number("TENCENT", "123456.000").unwrap(), dec!(123456.000));
    }

    #[test]
    fn test_parse_day_accepts_timestamps() {
        let day = parse_day("SINA", "2024-03-04 15:00:00").unwrap();
        assert_eq!(day, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert!(parse_day("SINA", "04/03/2024").is_err());
    }

    #[test]
    fn test_quoted_body() {
        assert_eq!(quoted_body("X", "var a=\"1,2\";").unwrap(), "1,2");
        assert!(quoted_body("X", "var a=1;").is_err());
        assert!(quoted_body("X", "var a=\"1,2;").is_err());
    }
}
