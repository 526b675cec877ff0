//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use etfpulse_market_data::{
    AcquisitionEngine, Candle, Instrument, ManualClock, MarketDataConfig, MarketDataError,
    MarketDataProvider, MemoryEventSink, ProviderDescriptor,
};

/// Provider that replays queued realtime answers, then a fallback answer.
pub struct ScriptedProvider {
    descriptor: ProviderDescriptor,
    queued: Mutex<VecDeque<Result<Decimal, MarketDataError>>>,
    fallback: Mutex<Result<Decimal, MarketDataError>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(id: &'static str, priority: i32) -> Arc<Self> {
        Arc::new(Self {
            descriptor: ProviderDescriptor::new(id, id, priority),
            queued: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Err(timeout(id))),
            calls: AtomicUsize::new(0),
        })
    }

    /// Answer every future call with `result` once the queue is drained.
    pub fn always(&self, result: Result<Decimal, MarketDataError>) {
        *self.fallback.lock().unwrap() = result;
    }

    pub fn then(&self, result: Result<Decimal, MarketDataError>) {
        self.queued.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn fetch_realtime(&self, _instrument: &Instrument) -> Result<Decimal, MarketDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.queued.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }

    async fn fetch_series(
        &self,
        _instrument: &Instrument,
        _lookback_days: u32,
    ) -> Result<Vec<Candle>, MarketDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(timeout(self.descriptor.id))
    }
}

pub fn timeout(provider: &str) -> MarketDataError {
    MarketDataError::Timeout {
        provider: provider.to_string(),
    }
}

/// Sunday 2024-03-03 18:00 CST, outside trading hours.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 3, 10, 0, 0).unwrap()
}

pub struct TestEngine {
    pub engine: Arc<AcquisitionEngine>,
    pub clock: Arc<ManualClock>,
    pub sink: MemoryEventSink,
}

pub fn engine(providers: &[Arc<ScriptedProvider>]) -> TestEngine {
    engine_with_config(providers, &MarketDataConfig::default())
}

pub fn engine_with_config(
    providers: &[Arc<ScriptedProvider>],
    config: &MarketDataConfig,
) -> TestEngine {
    let clock = Arc::new(ManualClock::new(start_time()));
    let sink = MemoryEventSink::new();
    let providers = providers
        .iter()
        .map(|p| p.clone() as Arc<dyn MarketDataProvider>)
        .collect();
    let engine =
        AcquisitionEngine::with_config(providers, config, clock.clone(), Arc::new(sink.clone()))
            .unwrap();

    TestEngine {
        engine: Arc::new(engine),
        clock,
        sink,
    }
}

pub fn etf() -> Instrument {
    Instrument::parse("510300").unwrap()
}
