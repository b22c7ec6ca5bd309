use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use voltnet_db::StoreError;
use voltnet_types::api::ErrorBody;

/// Wraps the store taxonomy so handlers can use `?` and still produce a
/// stable HTTP mapping with a JSON error body.
#[derive(Debug)]
pub struct ApiError(pub StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    /// For failures outside the store taxonomy (join errors, hashing).
    pub fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        ApiError(StoreError::Transient(format!("{}: {}", context, e)))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::NotAuthorized => StatusCode::FORBIDDEN,
            StoreError::NotFound => StatusCode::NOT_FOUND,
            StoreError::Conflict => StatusCode::CONFLICT,
            StoreError::Transient(msg) => {
                error!("store failure: {}", msg);
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        // Client-facing message stays generic for 5xx.
        let message = match &self.0 {
            StoreError::Transient(_) => "service unavailable".to_string(),
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Await a `spawn_blocking` store call, flattening the join error.
pub async fn run_blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal("spawn_blocking join error", e))?
        .map_err(ApiError::from)
}
