use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket, WebSocketUpgrade},
        Extension, Path,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::stream::StreamExt;
use tracing::{info, warn};

use super::parse_room_id;
use crate::{
    error::{bad, AppErr, AppResult},
    room::{format, ConnectionStatus, RoomSession, Subscriber},
    state::Rooms,
};

pub fn router() -> Router {
    Router::new().route("/rooms/:room_id/ws", get(ws_handler))
}

/// The room check runs before the upgrade so an unknown room is a plain 404.
async fn ws_handler(
    Path(room_id): Path<String>,
    Extension(rooms): Extension<Rooms>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    let room_id = parse_room_id(&room_id)?;
    let session = rooms.get(room_id).await?;
    if session.status() != ConnectionStatus::Connected {
        return Err(AppErr::NotFound("Room not connected".into()));
    }
    let ws = ws.map_err(|e| bad(e.body_text()))?;
    Ok(ws.on_upgrade(move |sock| subscriber_ws(sock, session)).into_response())
}

/* ---------------- per subscriber ---------------- */
async fn subscriber_ws(sock: WebSocket, session: Arc<RoomSession>) {
    let room_id = session.room_id();
    let (tx, rx) = sock.split();
    let sub = Subscriber::new(tx);

    // greeting goes out before the subscriber can see any broadcast
    if let Err(e) = sub.send(&format::signal("connected", room_id)).await {
        warn!(room_id, error = %e, "greeting failed");
        return;
    }
    session.subscribers().add(sub.clone()).await;
    if session.status() == ConnectionStatus::Disconnected {
        // disconnect ran between lookup and add
        sub.close().await;
    }
    info!(room_id, sink = %sub.id(), "subscriber attached");

    session.subscribers().serve(sub, rx).await;
    info!(room_id, "subscriber detached");
}
