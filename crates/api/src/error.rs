use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cadet_core::CadetError;
use serde_json::json;
use tracing::error;

use crate::auth::AuthError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("引擎错误: {0}")]
    Engine(#[from] CadetError),

    #[error("认证错误: {0}")]
    Authentication(#[from] AuthError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("请求处理超时: {0}秒")]
    Timeout(u64),
}

impl ApiError {
    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(err) => engine_status(err),
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        }
    }
}

fn engine_status(err: &CadetError) -> StatusCode {
    match err {
        CadetError::NotFound { .. } => StatusCode::NOT_FOUND,
        CadetError::Forbidden { .. } => StatusCode::FORBIDDEN,
        CadetError::Validation(_) => StatusCode::BAD_REQUEST,
        CadetError::Inactive { .. }
        | CadetError::AlreadyClaimed { .. }
        | CadetError::CapacityExceeded { .. }
        | CadetError::NotClaimed { .. }
        | CadetError::InvalidState { .. }
        | CadetError::Conflict(_) => StatusCode::CONFLICT,
        CadetError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CadetError::Configuration(_) | CadetError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message, retryable) = match &self {
            ApiError::Engine(err) => (
                err.error_code(),
                err.user_message().to_string(),
                err.is_retryable(),
            ),
            ApiError::Authentication(err) => ("AUTHENTICATION_ERROR", err.to_string(), false),
            ApiError::BadRequest(msg) => ("BAD_REQUEST", msg.clone(), false),
            ApiError::Timeout(_) => ("REQUEST_TIMEOUT", "请求处理超时，请稍后重试".to_string(), true),
        };

        if status.is_server_error() || matches!(self, ApiError::Timeout(_)) {
            error!(error = %self, %status, "请求处理失败");
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": message,
                "detail": self.to_string(),
                "retryable": retryable,
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
