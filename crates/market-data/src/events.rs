//! Structured provider events and the sinks that receive them.
//!
//! Failure and quality events are handed to a caller-supplied [`EventSink`].
//! Emission is best-effort: a sink that cannot write logs a warning and the
//! fetch carries on.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// What happened to a provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A transport-level failure was charged to the provider.
    Failure,
    /// The provider returned data that failed validation.
    QualityIssue,
    /// The breaker disabled the provider.
    Disabled,
    /// The cooldown elapsed and the provider is selectable again.
    ReEnabled,
    /// Cross-validated prices disagreed beyond tolerance.
    Discrepancy,
    /// The governor shed load immediately after an error burst.
    EmergencyBackoff,
    /// The governor's periodic check changed its limits.
    ThrottleAdjusted,
}

/// One record in the error log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEvent {
    pub timestamp: DateTime<Utc>,
    pub provider_id: String,
    pub kind: EventKind,
    pub detail: String,
}

impl ProviderEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        provider_id: impl Into<String>,
        kind: EventKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            provider_id: provider_id.into(),
            kind,
            detail: detail.into(),
        }
    }
}

/// Receiver for provider events.
///
/// `emit()` must be fast and must not fail the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ProviderEvent);
}

/// Discards every event.
#[derive(Clone, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: ProviderEvent) {}
}

/// Writes each event as a log line.
#[derive(Clone, Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: ProviderEvent) {
        info!(
            "provider event: provider={} kind={:?} detail={}",
            event.provider_id, event.kind, event.detail
        );
    }
}

/// Appends one JSON object per line to a file.
pub struct JsonLinesFileSink {
    file: Mutex<File>,
}

impl JsonLinesFileSink {
    /// Open (or create) the file in append mode.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventSink for JsonLinesFileSink {
    fn emit(&self, event: ProviderEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize provider event: {}", e);
                return;
            }
        };

        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(file, "{}", line) {
            warn!("Failed to append provider event: {}", e);
        }
    }
}

/// Collects events in memory.
#[derive(Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<ProviderEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    pub fn events(&self) -> Vec<ProviderEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns the collected events of one kind.
    pub fn of_kind(&self, kind: EventKind) -> Vec<ProviderEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: ProviderEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
