//! Error shaping at the HTTP edge.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cubicler_types::CubiclerError;
use serde_json::json;

/// Wrapper mapping core errors onto HTTP statuses and the JSON error body.
pub struct ApiError(pub CubiclerError);

impl From<CubiclerError> for ApiError {
    fn from(error: CubiclerError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            CubiclerError::Validation(_) | CubiclerError::JsonDecode(_) => StatusCode::BAD_REQUEST,
            CubiclerError::Auth => StatusCode::UNAUTHORIZED,
            CubiclerError::AccessDenied(_) => StatusCode::FORBIDDEN,
            CubiclerError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match self.0 {
            // The uniform body the webhook contract specifies.
            CubiclerError::Auth => json!({ "error": "Authentication failed" }),
            ref error => json!({ "error": error.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
