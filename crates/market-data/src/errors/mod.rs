//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all market data operations
//! - [`RetryClass`]: Classification for determining how an error is absorbed

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// Errors that can occur during market data operations.
///
/// Per-provider errors are absorbed by the engine and translated into
/// failure-tracker and quality-recorder updates. Only
/// [`AllSourcesUnavailable`](Self::AllSourcesUnavailable),
/// [`InvalidInstrument`](Self::InvalidInstrument),
/// [`UnknownProvider`](Self::UnknownProvider) and
/// [`Configuration`](Self::Configuration) ever reach callers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The provider rate limited the request (HTTP 429).
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// Transport or HTTP-level failure reported by a provider.
    #[error("Provider error: {provider} - {message}")]
    ProviderError {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The provider answered with a body that could not be parsed.
    #[error("Malformed payload from {provider}: {message}")]
    MalformedPayload {
        /// The provider that sent the payload
        provider: String,
        /// What was wrong with it
        message: String,
    },

    /// The provider answered with a well-formed but implausible value.
    #[error("Invalid data from {provider}: {message}")]
    InvalidData {
        /// The provider that sent the data
        provider: String,
        /// Description of the validation failure
        message: String,
    },

    /// The caller passed an identifier that is not a valid instrument code.
    #[error("Invalid instrument: {0}")]
    InvalidInstrument(String),

    /// Every eligible provider was tried and none produced a valid result.
    #[error("All sources unavailable for {instrument} ({attempts})")]
    AllSourcesUnavailable {
        /// The instrument that could not be served
        instrument: String,
        /// Summary of the attempts made for this request
        attempts: String,
    },

    /// An operator referenced a provider id that is not registered.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Bad endpoint template, unknown provider, or inconsistent limits.
    /// Raised while building the engine and never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use etfpulse_market_data::errors::{MarketDataError, RetryClass};
    ///
    /// let error = MarketDataError::RateLimited { provider: "SINA".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::FailoverWithPenalty);
    ///
    /// let error = MarketDataError::InvalidInstrument("??".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Timeout { .. }
            | Self::RateLimited { .. }
            | Self::ProviderError { .. }
            | Self::MalformedPayload { .. } => RetryClass::FailoverWithPenalty,

            Self::InvalidData { .. } => RetryClass::QualityPenalty,

            Self::InvalidInstrument(_)
            | Self::UnknownProvider(_)
            | Self::AllSourcesUnavailable { .. }
            | Self::Configuration(_) => RetryClass::Never,
        }
    }

    /// Short machine-friendly name used in event records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::ProviderError { .. } => "provider_error",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::InvalidData { .. } => "invalid_data",
            Self::InvalidInstrument(_) => "invalid_instrument",
            Self::UnknownProvider(_) => "unknown_provider",
            Self::AllSourcesUnavailable { .. } => "all_sources_unavailable",
            Self::Configuration(_) => "configuration",
        }
    }
}
