use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use etfpulse_market_data::MarketDataError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<MarketDataError> for ApiError {
    fn from(error: MarketDataError) -> Self {
        match error {
            MarketDataError::InvalidInstrument(_) => Self::BadRequest(error.to_string()),
            MarketDataError::UnknownProvider(_) => Self::NotFound(error.to_string()),
            MarketDataError::AllSourcesUnavailable { .. } => {
                Self::ServiceUnavailable(error.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("{} {}", status.as_u16(), self);
        }
        let body = Json(json!({
            "code": status.as_u16(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
