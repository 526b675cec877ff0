//! Provider orchestration.
//!
//! This module provides:
//! - Adaptive rate/concurrency governing per provider
//! - Circuit breaking on consecutive failures
//! - Rolling quality and performance statistics
//! - Price and series validation
//! - Source selection and cross-validation
//! - The `AcquisitionEngine` that ties them together

mod circuit_breaker;
mod diagnostics;
mod engine;
mod governor;
mod quality;
mod reconcile;
mod selector;
mod validator;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, FailureState};
pub use diagnostics::{AttemptOutcome, FetchDiagnostics, ProviderAttempt, SkipReason};
pub use engine::AcquisitionEngine;
pub use governor::{Governor, GovernorConfig, GovernorLimits, GovernorSlot};
pub use quality::{PerformanceSnapshot, QualityConfig, QualityIssue, QualityRecorder};
pub use reconcile::{reconcile, Candidate, Reconciliation};
pub use selector::{order_providers, SelectionEntry};
pub use validator::{
    is_trading_hours, PriceRange, PriceValidator, ValidationIssue, ValidationSeverity,
    ValidatorConfig,
};
