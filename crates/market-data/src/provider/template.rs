//! Endpoint URL templates.
//!
//! Templates use `{name}` placeholders. They are checked once when a provider
//! is built, so rendering at request time cannot fail.

use std::fmt;

use crate::errors::MarketDataError;
use crate::models::Instrument;

/// Placeholders an endpoint template may reference.
const KNOWN_PLACEHOLDERS: &[&str] = &["symbol", "code", "secid", "days"];

/// A validated endpoint template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointTemplate {
    raw: String,
}

impl EndpointTemplate {
    /// Validate a template string.
    ///
    /// Fails with [`MarketDataError::Configuration`] on unterminated, empty or
    /// unknown placeholders, or when the template is not an http(s) URL.
    pub fn parse(raw: &str) -> Result<Self, MarketDataError> {
        if !(raw.starts_with("http://") || raw.starts_with("https://")) {
            return Err(MarketDataError::Configuration(format!(
                "Endpoint template must be an http(s) URL: {raw}"
            )));
        }

        let mut chars = raw.chars();
        while let Some(ch) = chars.next() {
            if ch != '{' {
                continue;
            }
            let mut key = String::new();
            let mut closed = false;
            for next in chars.by_ref() {
                if next == '}' {
                    closed = true;
                    break;
                }
                key.push(next);
            }

            if !closed {
                return Err(MarketDataError::Configuration(format!(
                    "Unterminated placeholder in template: {{{key}"
                )));
            }
            if key.is_empty() {
                return Err(MarketDataError::Configuration(
                    "Encountered empty placeholder `{}` in template".to_string(),
                ));
            }
            if !KNOWN_PLACEHOLDERS.contains(&key.as_str()) {
                return Err(MarketDataError::Configuration(format!(
                    "Unknown placeholder `{key}` in template {raw}"
                )));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Render the template for an instrument.
    ///
    /// `days` is only substituted by series templates; realtime templates
    /// that reference it get `0`.
    pub fn render(&self, instrument: &Instrument, days: u32) -> String {
        self.raw
            .replace("{symbol}", &instrument.symbol())
            .replace("{code}", instrument.code())
            .replace("{secid}", &instrument.secid())
            .replace("{days}", &days.to_string())
    }
}

impl fmt::Display for EndpointTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
