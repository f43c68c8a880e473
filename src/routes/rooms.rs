//! routes/rooms.rs
use axum::{
    extract::{rejection::JsonRejection, Extension, Json, Path, Query},
    response::{IntoResponse, Json as RespJson},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::{parse_room_id, success, success_with};
use crate::{
    danmaku::{self, DanmakuForm},
    error::{bad, AppResult},
    room::ConnectOutcome,
    state::{Cookies, Platform, Rooms},
};

#[derive(Deserialize)]
struct ConnectQuery {
    cookie: Option<String>,
    #[serde(rename = "cookieID")]
    cookie_id: Option<String>,
}

#[derive(Deserialize)]
struct CookieInput {
    cookie: String,
}

pub fn router() -> Router {
    Router::new()
        .route("/rooms", get(list))
        .route("/rooms/", get(list))
        .route("/rooms/:room_id/connect", post(connect))
        .route("/rooms/:room_id/disconnect", post(disconnect))
        .route("/rooms/:room_id/info", get(info))
        .route("/rooms/:room_id/danmaku", post(send_danmaku))
        .route("/rooms/:room_id/cookie", post(update_cookie))
}

/* ---------------- Connect ---------------- */
async fn connect(
    Path(room_id): Path<String>,
    Query(q): Query<ConnectQuery>,
    Extension(rooms): Extension<Rooms>,
    Extension(cookies): Extension<Cookies>,
) -> AppResult<impl IntoResponse> {
    let room_id = parse_room_id(&room_id)?;
    let cookie = cookies.resolve(q.cookie.as_deref(), q.cookie_id.as_deref()).await;

    let message = match rooms.connect(room_id, cookie).await? {
        ConnectOutcome::Connected        => "Connected to room",
        ConnectOutcome::AlreadyConnected => "Room already connected",
    };
    Ok(RespJson(json!({ "status": "success", "message": message, "roomID": room_id })))
}

/* ---------------- Disconnect ---------------- */
async fn disconnect(
    Path(room_id): Path<String>,
    Extension(rooms): Extension<Rooms>,
) -> AppResult<impl IntoResponse> {
    let room_id = parse_room_id(&room_id)?;
    rooms.disconnect(room_id).await?;
    Ok(RespJson(json!({ "status": "success", "message": "Disconnected from room", "roomID": room_id })))
}

async fn list(Extension(rooms): Extension<Rooms>) -> impl IntoResponse {
    let rooms = rooms.list().await;
    RespJson(json!({ "status": "success", "rooms": rooms }))
}

async fn info(
    Path(room_id): Path<String>,
    Extension(platform): Extension<Platform>,
) -> AppResult<impl IntoResponse> {
    let room_id = parse_room_id(&room_id)?;
    let data = platform.room_info(room_id).await?;
    Ok(RespJson(json!({ "status": "success", "data": data })))
}

/* ---------------- Danmaku ---------------- */
async fn send_danmaku(
    Path(room_id): Path<String>,
    Extension(platform): Extension<Platform>,
    body: Result<Json<DanmakuForm>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let room_id = parse_room_id(&room_id)?;
    let Json(form) = body?;
    if form.message.is_empty() || form.cookie.is_empty() {
        return Err(bad("Invalid request body"));
    }
    let resp = danmaku::send(platform.as_ref(), room_id, &form).await?;
    Ok(success_with("Danmaku sent", resp))
}

async fn update_cookie(
    Path(room_id): Path<String>,
    Extension(rooms): Extension<Rooms>,
    body: Result<Json<CookieInput>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let room_id = parse_room_id(&room_id)?;
    let Json(input) = body?;
    if input.cookie.is_empty() {
        return Err(bad("Invalid request body"));
    }
    rooms.update_cookie(room_id, input.cookie).await?;
    Ok(success("Cookie updated"))
}
