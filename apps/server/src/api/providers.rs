use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use etfpulse_market_data::EngineStatus;

use crate::{error::ApiResult, main_lib::AppState};

async fn get_status(State(state): State<Arc<AppState>>) -> Json<EngineStatus> {
    Json(state.engine.status())
}

/// Clear a provider's failure state and quality penalty.
async fn reset_provider(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.reset_provider(&provider_id)?;
    tracing::info!("Provider '{}' reset by operator", provider_id);
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(get_status))
        .route("/providers/{id}/reset", post(reset_provider))
}
