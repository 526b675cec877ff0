use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::main_lib::AppState;

mod providers;
mod quotes;

pub fn app_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(quotes::router())
        .merge(providers::router());

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
