use axum::{
    extract::{DefaultBodyLimit, Extension},
    http::Method,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::{
    error::{bad, AppResult},
    state::{Cookies, Platform, Rooms},
};

pub mod cookies;
pub mod rooms;
pub mod ws;

const BODY_LIMIT: usize = 1024 * 1024;

pub fn router() -> Router {
    Router::new().nest(
        "/api",
        Router::new()
            .route("/health", get(health))
            .merge(rooms::router())
            .merge(ws::router())
            .merge(cookies::router()),
    )
}

/// Full application: routes plus shared handles and middleware.
pub fn app(rooms: Rooms, cookies: Cookies, platform: Platform) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    router()
        .layer(Extension(rooms))
        .layer(Extension(cookies))
        .layer(Extension(platform))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "success", "message": "Service is running" }))
}

/* ---------------- shared helpers ---------------- */
pub(crate) fn success(message: &str) -> Json<Value> {
    Json(json!({ "status": "success", "message": message }))
}

pub(crate) fn success_with<T: Serialize>(message: &str, data: T) -> Json<Value> {
    Json(json!({ "status": "success", "message": message, "data": data }))
}

pub(crate) fn parse_room_id(raw: &str) -> AppResult<u32> {
    raw.parse().map_err(|_| bad("Invalid room ID"))
}
