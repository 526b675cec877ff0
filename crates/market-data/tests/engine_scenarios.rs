mod common;

use std::sync::Arc;

use chrono::Duration;
use rust_decimal_macros::dec;

use common::{engine, engine_with_config, etf, timeout, ScriptedProvider};
use etfpulse_market_data::{
    EventKind, Instrument, MarketDataConfig, MarketDataError, ProviderEvent, ProviderState,
};

#[tokio::test(start_paused = true)]
async fn test_disable_reconcile_and_recover() {
    let a = ScriptedProvider::new("A", 1);
    let b = ScriptedProvider::new("B", 2);
    let c = ScriptedProvider::new("C", 3);
    let t = engine(&[a.clone(), b.clone(), c.clone()]);

    // Two rounds where every provider fails.
    for _ in 0..2 {
        let err = t.engine.fetch_realtime_price(&etf()).await.unwrap_err();
        assert!(matches!(err, MarketDataError::AllSourcesUnavailable { .. }));
    }

    // A fails a third time and is disabled; B recovers.
    b.always(Ok(dec!(4.50)));
    c.always(Ok(dec!(4.56)));
    assert_eq!(t.engine.fetch_realtime_price(&etf()).await.unwrap(), dec!(4.50));
    assert_eq!(t.engine.status().providers[0].status, ProviderState::Disabled);
    assert_eq!(t.engine.selection_order(), vec!["B", "C"]);

    // B and C agree within 5%: the mean is served.
    assert_eq!(t.engine.fetch_realtime_price(&etf()).await.unwrap(), dec!(4.53));

    // Still disabled one second before the cooldown ends.
    t.clock.advance(Duration::minutes(10) - Duration::seconds(1));
    assert!(!t.engine.selection_order().contains(&"A".to_string()));

    // Once the cooldown has elapsed A is selectable again, count untouched.
    t.clock.advance(Duration::minutes(1));
    assert_eq!(t.engine.selection_order(), vec!["B", "C", "A"]);
    assert_eq!(t.engine.status().providers[0].failure_count, 3);

    // B and C stumble; serial fallback reaches A, whose success clears its count.
    b.then(Err(timeout("B")));
    c.then(Err(timeout("C")));
    a.always(Ok(dec!(4.54)));
    assert_eq!(t.engine.fetch_realtime_price(&etf()).await.unwrap(), dec!(4.54));

    let status = t.engine.status();
    assert_eq!(status.current_source.as_deref(), Some("A"));
    assert_eq!(status.providers[0].failure_count, 0);
    assert_eq!(status.providers[0].status, ProviderState::Active);
    assert_eq!(t.sink.of_kind(EventKind::ReEnabled).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_identical_prices_are_returned_exactly() {
    let a = ScriptedProvider::new("A", 1);
    let b = ScriptedProvider::new("B", 2);
    a.always(Ok(dec!(3.217)));
    b.always(Ok(dec!(3.217)));
    let t = engine(&[a, b]);

    let quote = t.engine.fetch_realtime(&etf()).await.unwrap();
    assert_eq!(quote.price, dec!(3.217));
    assert_eq!(quote.corroborated_by, vec!["B"]);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_on_garbage_returns_no_value() {
    let a = ScriptedProvider::new("A", 1);
    let b = ScriptedProvider::new("B", 2);
    let c = ScriptedProvider::new("C", 3);
    a.always(Ok(dec!(0)));
    b.always(Err(MarketDataError::InvalidData {
        provider: "B".to_string(),
        message: "price field is '-'".to_string(),
    }));
    c.always(Ok(dec!(99999)));
    let t = engine(&[a.clone(), b.clone(), c.clone()]);

    let err = t.engine.fetch_realtime(&etf()).await.unwrap_err();
    assert!(matches!(err, MarketDataError::AllSourcesUnavailable { .. }));
    assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 1));
    assert_eq!(t.sink.of_kind(EventKind::QualityIssue).len(), 3);
    assert!(t.sink.of_kind(EventKind::Failure).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wider_race_uses_all_providers() {
    let a = ScriptedProvider::new("A", 1);
    let b = ScriptedProvider::new("B", 2);
    let c = ScriptedProvider::new("C", 3);
    a.always(Ok(dec!(4.50)));
    b.always(Ok(dec!(4.52)));
    c.always(Ok(dec!(6.00)));

    let config = MarketDataConfig::from_json_str(r#"{"crossValidation": {"width": 3}}"#).unwrap();
    let t = engine_with_config(&[a, b, c], &config);

    let quote = t.engine.fetch_realtime(&etf()).await.unwrap();
    assert_eq!(quote.price, dec!(4.52));
    assert_eq!(quote.source_provider_id, "B");

    let discrepancies: Vec<ProviderEvent> = t.sink.of_kind(EventKind::Discrepancy);
    let flagged: Vec<&str> = discrepancies.iter().map(|e| e.provider_id.as_str()).collect();
    assert_eq!(flagged, vec!["A", "C"]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_instruments_share_provider_state() {
    let a = ScriptedProvider::new("A", 1);
    let b = ScriptedProvider::new("B", 2);
    a.always(Ok(dec!(2.00)));
    b.always(Ok(dec!(2.00)));
    let t = engine(&[a.clone(), b.clone()]);

    let codes = ["510300", "510500", "159915", "512880", "588000", "159919"];
    let tasks: Vec<_> = codes
        .iter()
        .map(|code| {
            let engine = Arc::clone(&t.engine);
            let instrument = Instrument::parse(code).unwrap();
            tokio::spawn(async move { engine.fetch_realtime_price(&instrument).await })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), dec!(2.00));
    }

    assert_eq!(a.calls(), codes.len());
    let status = t.engine.status();
    assert_eq!(status.providers[0].total_requests, codes.len() as u64);
    assert_eq!(status.providers[1].success_rate, 1.0);
}
