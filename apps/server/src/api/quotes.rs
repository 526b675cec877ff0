use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use etfpulse_market_data::{Candle, Instrument, Quote};
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};

const DEFAULT_KLINE_DAYS: u32 = 60;
const MAX_KLINE_DAYS: u32 = 1000;

#[derive(Deserialize)]
struct KlineQuery {
    days: Option<u32>,
}

/// Cross-validated realtime quote.
async fn get_quote(
    State(state): State<Arc<AppState>>,
    Path(instrument): Path<String>,
) -> ApiResult<Json<Quote>> {
    let instrument: Instrument = instrument.parse()?;
    let quote = state.engine.fetch_realtime(&instrument).await?;
    Ok(Json(quote))
}

/// Daily candles, oldest first.
async fn get_klines(
    State(state): State<Arc<AppState>>,
    Path(instrument): Path<String>,
    Query(query): Query<KlineQuery>,
) -> ApiResult<Json<Vec<Candle>>> {
    let instrument: Instrument = instrument.parse()?;
    let days = query.days.unwrap_or(DEFAULT_KLINE_DAYS);
    if days == 0 || days > MAX_KLINE_DAYS {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {}",
            MAX_KLINE_DAYS
        )));
    }

    let candles = state.engine.fetch_kline_data(&instrument, days).await?;
    Ok(Json(candles))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/quotes/{instrument}", get(get_quote))
        .route("/klines/{instrument}", get(get_klines))
}
