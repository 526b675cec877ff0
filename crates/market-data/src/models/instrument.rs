use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// Exchange an instrument is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Shanghai,
    Shenzhen,
}

impl Exchange {
    /// Two-letter prefix used by Sina and Tencent symbols.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Shanghai => "sh",
            Self::Shenzhen => "sz",
        }
    }

    /// Market number used by East Money `secid` parameters.
    pub fn eastmoney_market(&self) -> u8 {
        match self {
            Self::Shanghai => 1,
            Self::Shenzhen => 0,
        }
    }

    /// Infer the listing exchange from a bare six-digit code.
    fn infer(code: &str) -> Self {
        if code.starts_with(['5', '6', '9']) || code.starts_with("11") {
            Self::Shanghai
        } else {
            Self::Shenzhen
        }
    }
}

/// An exchange-traded instrument, identified by its six-digit code.
///
/// Accepted spellings: `510300`, `sh510300`, `SZ159915`, `510300.SH`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Instrument {
    code: Arc<str>,
    exchange: Exchange,
}

impl Instrument {
    /// Build an instrument from an explicit code and exchange.
    pub fn new(code: &str, exchange: Exchange) -> Result<Self, MarketDataError> {
        if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MarketDataError::InvalidInstrument(code.to_string()));
        }
        Ok(Self {
            code: Arc::from(code),
            exchange,
        })
    }

    /// Parse any of the accepted spellings.
    pub fn parse(raw: &str) -> Result<Self, MarketDataError> {
        let trimmed = raw.trim().to_ascii_lowercase();
        let invalid = || MarketDataError::InvalidInstrument(raw.to_string());

        if let Some((code, suffix)) = trimmed.split_once('.') {
            let exchange = match suffix {
                "sh" | "ss" => Exchange::Shanghai,
                "sz" => Exchange::Shenzhen,
                _ => return Err(invalid()),
            };
            return Self::new(code, exchange).map_err(|_| invalid());
        }

        if let Some(code) = trimmed.strip_prefix("sh") {
            return Self::new(code, Exchange::Shanghai).map_err(|_| invalid());
        }
        if let Some(code) = trimmed.strip_prefix("sz") {
            return Self::new(code, Exchange::Shenzhen).map_err(|_| invalid());
        }

        Self::new(&trimmed, Exchange::infer(&trimmed)).map_err(|_| invalid())
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    /// Exchange-prefixed symbol, e.g. `sh510300`.
    pub fn symbol(&self) -> String {
        format!("{}{}", self.exchange.prefix(), self.code)
    }

    /// East Money security id, e.g. `1.510300`.
    pub fn secid(&self) -> String {
        format!("{}.{}", self.exchange.eastmoney_market(), self.code)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.exchange.prefix(), self.code)
    }
}

impl FromStr for Instrument {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
