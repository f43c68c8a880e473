//! routes/cookies.rs
use axum::{
    extract::{rejection::JsonRejection, Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Json as RespJson},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::{success, success_with};
use crate::{
    error::{bad, AppErr, AppResult},
    state::Cookies,
};

#[derive(Deserialize)]
struct NewCookie {
    id:     String,
    cookie: String,
}

#[derive(Deserialize)]
struct CookieInput {
    cookie: String,
}

pub fn router() -> Router {
    Router::new()
        .route("/cookies", get(list).post(add))
        .route("/cookies/:cookie_id", get(fetch).put(update).delete(remove))
        .route("/cookie/default", get(get_default).post(set_default))
}

async fn list(Extension(cookies): Extension<Cookies>) -> impl IntoResponse {
    let data = cookies.list().await;
    RespJson(json!({ "status": "success", "data": data }))
}

async fn fetch(
    Path(id): Path<String>,
    Extension(cookies): Extension<Cookies>,
) -> AppResult<impl IntoResponse> {
    let cookie = cookies
        .get(&id)
        .await
        .ok_or_else(|| AppErr::NotFound("Cookie not found".into()))?;
    Ok(RespJson(json!({ "status": "success", "data": { "id": id, "cookie": cookie } })))
}

async fn add(
    Extension(cookies): Extension<Cookies>,
    body: Result<Json<NewCookie>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(p) = body?;
    if p.id.is_empty() || p.cookie.is_empty() {
        return Err(bad("id and cookie are required"));
    }
    cookies.add(p.id.clone(), p.cookie).await?;
    tracing::info!(cookie_id = %p.id, "cookie added");
    Ok((StatusCode::CREATED, success_with("Cookie added successfully", json!({ "id": p.id }))))
}

async fn update(
    Path(id): Path<String>,
    Extension(cookies): Extension<Cookies>,
    body: Result<Json<CookieInput>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(p) = body?;
    cookies.update(&id, p.cookie).await?;
    Ok(success("Cookie updated successfully"))
}

async fn remove(
    Path(id): Path<String>,
    Extension(cookies): Extension<Cookies>,
) -> AppResult<impl IntoResponse> {
    cookies.remove(&id).await?;
    Ok(success("Cookie deleted successfully"))
}

/* ---------------- default ---------------- */
async fn get_default(Extension(cookies): Extension<Cookies>) -> impl IntoResponse {
    let cookie = cookies.default_cookie().await;
    RespJson(json!({ "status": "success", "cookie": cookie }))
}

async fn set_default(
    Extension(cookies): Extension<Cookies>,
    body: Result<Json<CookieInput>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(p) = body?;
    cookies.set_default(p.cookie).await;
    Ok(success("Default cookie set"))
}
