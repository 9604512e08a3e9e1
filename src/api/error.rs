use axum::{http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

/// Error body returned by all failing endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// The only error shape the API surfaces: upstream failures are absorbed
/// by engine fallbacks before they reach a handler.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn not_found(message: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}
