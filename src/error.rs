use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::fmt::Display;

use crate::{
    danmaku::SendError,
    platform::PlatformError,
    room::RegistryError,
    state::CookieError,
};

pub type AppResult<T> = Result<T, AppErr>;

#[derive(thiserror::Error, Debug)]
pub enum AppErr {
    #[error("{0}")]
    Bad(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{message}")]
    PostFailed { message: String, code: i64 },
}

impl IntoResponse for AppErr {
    fn into_response(self) -> axum::response::Response {
        let code = match &self {
            AppErr::Bad(_)                             => StatusCode::BAD_REQUEST,
            AppErr::NotFound(_)                        => StatusCode::NOT_FOUND,
            AppErr::Conflict(_)                        => StatusCode::CONFLICT,
            AppErr::Upstream(_) | AppErr::PostFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &self {
            AppErr::PostFailed { message, code } => json!({
                "status":  "error",
                "error":   "Failed to send danmaku",
                "message": message,
                "code":    code,
            }),
            other => json!({ "status": "error", "message": other.to_string() }),
        };
        (code, Json(body)).into_response()
    }
}

/* ── module errors → HTTP ── */
impl From<RegistryError> for AppErr {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(_) => AppErr::NotFound(e.to_string()),
            other                      => AppErr::Upstream(other.to_string()),
        }
    }
}

impl From<CookieError> for AppErr {
    fn from(e: CookieError) -> Self {
        match e {
            CookieError::Duplicate => AppErr::Conflict(e.to_string()),
            CookieError::NotFound  => AppErr::NotFound(e.to_string()),
            CookieError::Invalid   => AppErr::Bad(e.to_string()),
        }
    }
}

impl From<SendError> for AppErr {
    fn from(e: SendError) -> Self {
        match e {
            SendError::InvalidCredential          => AppErr::Bad(e.to_string()),
            SendError::Platform(_)                => AppErr::Upstream(e.to_string()),
            SendError::PostFailed { message, code } => AppErr::PostFailed { message, code },
        }
    }
}

impl From<PlatformError> for AppErr {
    fn from(e: PlatformError) -> Self {
        AppErr::Upstream(format!("Failed to get room info: {e}"))
    }
}

impl From<JsonRejection> for AppErr {
    fn from(e: JsonRejection) -> Self {
        bad(format!("Invalid request body: {}", e.body_text()))
    }
}

/* ── helpers ── */
pub fn bad<E: Display>(e: E) -> AppErr { AppErr::Bad(e.to_string()) }
