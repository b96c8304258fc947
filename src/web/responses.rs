use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Errors returned by the control API.
#[derive(Debug)]
pub enum ApiFailure {
    BadRequest(String),
    UnprocessableEntity(String),
    InternalServerError(String),
}

impl ApiFailure {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiFailure::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiFailure::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiFailure::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiFailure::BadRequest(_) => "BAD_REQUEST",
            ApiFailure::UnprocessableEntity(_) => "UNPROCESSABLE_ENTITY",
            ApiFailure::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiFailure::BadRequest(msg)
            | ApiFailure::UnprocessableEntity(msg)
            | ApiFailure::InternalServerError(msg) => msg,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::UnprocessableEntity(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalServerError(msg.into())
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiResponse::<()>::error(self.error_code(), self.message());
        (status, Json(body)).into_response()
    }
}

impl From<crate::AppError> for ApiFailure {
    fn from(err: crate::AppError) -> Self {
        match err {
            crate::AppError::InvalidImport(msg) => ApiFailure::bad_request(msg),
            crate::AppError::Validation(msg) => ApiFailure::unprocessable(msg),
            other => {
                tracing::error!("Request failed: {}", other);
                ApiFailure::internal(other.to_string())
            }
        }
    }
}
