// src/upstream/client.rs

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use reqwest::{
    header::{COOKIE, REFERER, USER_AGENT},
    Client,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use tokio::{net::TcpStream, time};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    event::LiveEvent,
    packet::{self, op, AuthBody, Packet},
    EventSource, EventSourceFactory, Handlers, UpstreamError,
};
use crate::utils::cookie;

type LiveWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_HOST: &str = "broadcastlv.chat.bilibili.com";
const HEARTBEAT: Duration = Duration::from_secs(30);
const UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const LIVE_REFERER: &str = "https://live.bilibili.com/";

/* ------------ factory ------------ */
#[derive(Clone)]
pub struct BiliClientFactory {
    http:     Client,
    live_api: String,
}

impl BiliClientFactory {
    pub fn new(live_api: &str) -> Self {
        Self { http: Client::new(), live_api: live_api.trim_end_matches('/').to_owned() }
    }
}

impl EventSourceFactory for BiliClientFactory {
    fn create(&self, room_id: u32, cookie: Option<String>) -> Arc<dyn EventSource> {
        Arc::new(BiliClient {
            room_id,
            live_api: self.live_api.clone(),
            http:     self.http.clone(),
            cookie:   RwLock::new(cookie),
            handlers: RwLock::new(Arc::new(Handlers::default())),
            cancel:   Mutex::new(None),
        })
    }
}

/* ------------ client ------------ */
pub struct BiliClient {
    room_id:  u32,
    live_api: String,
    http:     Client,
    cookie:   RwLock<Option<String>>,
    handlers: RwLock<Arc<Handlers>>,
    cancel:   Mutex<Option<CancellationToken>>,
}

#[derive(Deserialize)]
struct ApiReply<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Deserialize)]
struct RoomInit {
    room_id: u32,
}

#[derive(Deserialize)]
struct DanmuInfo {
    #[serde(default)]
    token: String,
    #[serde(default)]
    host_list: Vec<DanmuHost>,
}

#[derive(Deserialize)]
struct DanmuHost {
    host: String,
    wss_port: u16,
}

impl BiliClient {
    async fn get_api<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let mut req = self
            .http
            .get(format!("{}{}", self.live_api, path))
            .query(query)
            .header(USER_AGENT, UA)
            .header(REFERER, LIVE_REFERER);
        let cookie = self.cookie.read().clone();
        if let Some(c) = cookie {
            req = req.header(COOKIE, c);
        }

        let reply: ApiReply<T> = req.send().await?.error_for_status()?.json().await?;
        if reply.code != 0 {
            return Err(UpstreamError::Api { code: reply.code, message: reply.message });
        }
        reply.data.ok_or(UpstreamError::Api { code: 0, message: "missing data".into() })
    }

    /// Short ids (e.g. `6`) map to a long real room id.
    async fn real_room_id(&self) -> Result<u32, UpstreamError> {
        let init: RoomInit = self
            .get_api("/room/v1/Room/room_init", &[("id", self.room_id.to_string())])
            .await?;
        Ok(init.room_id)
    }

    async fn danmu_endpoint(&self, real_id: u32) -> (String, String) {
        let fallback = || format!("wss://{DEFAULT_HOST}:443/sub");
        let info: Result<DanmuInfo, _> = self
            .get_api(
                "/xlive/web-room/v1/index/getDanmuInfo",
                &[("id", real_id.to_string()), ("type", "0".into())],
            )
            .await;
        match info {
            Ok(info) => {
                let url = info
                    .host_list
                    .first()
                    .map(|h| format!("wss://{}:{}/sub", h.host, h.wss_port))
                    .unwrap_or_else(fallback);
                (info.token, url)
            }
            Err(e) => {
                warn!(room_id = self.room_id, error = %e, "danmu info unavailable, using default host");
                (String::new(), fallback())
            }
        }
    }

    fn auth_body(&self, real_id: u32, key: String) -> AuthBody {
        let raw = self.cookie.read().clone().unwrap_or_default();
        let fields = cookie::fields(&raw);
        AuthBody {
            uid:      fields.get(cookie::UID_KEY).and_then(|v| v.parse().ok()).unwrap_or(0),
            roomid:   real_id,
            protover: packet::protover::ZLIB,
            platform: "web",
            kind:     2,
            key,
            buvid:    fields.get(cookie::BUVID_KEY).map(|v| v.to_string()).unwrap_or_default(),
        }
    }
}

/// Wait for op 8 and check its `code`.
async fn await_auth_reply(ws: &mut LiveWs) -> Result<(), UpstreamError> {
    while let Some(msg) = ws.next().await {
        let WsMessage::Binary(frame) = msg? else { continue };
        for p in packet::decode(&frame)? {
            if p.op != op::AUTH_REPLY {
                continue;
            }
            let reply: Value = serde_json::from_slice(&p.body)?;
            return match reply.get("code").and_then(Value::as_i64) {
                Some(0) => Ok(()),
                _ => Err(UpstreamError::Auth(reply.to_string())),
            };
        }
    }
    Err(UpstreamError::Closed)
}

#[async_trait]
impl EventSource for BiliClient {
    fn register(&self, handlers: Handlers) {
        *self.handlers.write() = Arc::new(handlers);
    }

    async fn start(&self) -> Result<(), UpstreamError> {
        let real_id = self.real_room_id().await?;
        let (key, url) = self.danmu_endpoint(real_id).await;

        let (mut ws, _) = connect_async(url.as_str()).await?;
        let auth = Packet::auth(&self.auth_body(real_id, key))?;
        ws.send(WsMessage::Binary(auth.encode().to_vec())).await?;
        await_auth_reply(&mut ws).await?;

        let token = CancellationToken::new();
        let previous = self.cancel.lock().replace(token.clone());
        if let Some(old) = previous {
            old.cancel();
        }
        let handlers = self.handlers.read().clone();
        info!(room_id = self.room_id, real_id, %url, "upstream authenticated");
        tokio::spawn(run(self.room_id, ws, handlers, token));
        Ok(())
    }

    fn stop(&self) {
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
    }

    fn set_cookie(&self, cookie: Option<String>) {
        *self.cookie.write() = cookie;
    }
}

/* ------------ read loop ------------ */
async fn run(room_id: u32, ws: LiveWs, handlers: Arc<Handlers>, cancel: CancellationToken) {
    let (mut tx, mut rx) = ws.split();
    let mut beat = time::interval(HEARTBEAT);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = tx.send(WsMessage::Close(None)).await;
                debug!(room_id, "upstream stopped");
                return;
            }
            _ = beat.tick() => {
                let hb = WsMessage::Binary(Packet::heartbeat().encode().to_vec());
                if let Err(e) = tx.send(hb).await {
                    warn!(room_id, error = %e, "heartbeat failed");
                    break;
                }
            }
            msg = rx.next() => match msg {
                Some(Ok(WsMessage::Binary(frame))) => handle_frame(room_id, &frame, &handlers).await,
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!(room_id, "upstream closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(room_id, error = %e, "upstream read failed");
                    break;
                }
            }
        }
    }

    if !cancel.is_cancelled() {
        handlers.closed().await;
    }
}

async fn handle_frame(room_id: u32, frame: &[u8], handlers: &Handlers) {
    let packets = match packet::decode(frame) {
        Ok(p) => p,
        Err(e) => {
            warn!(room_id, error = %e, "undecodable frame");
            return;
        }
    };
    for p in packets {
        match p.op {
            op::COMMAND => {
                let event = serde_json::from_slice::<Value>(&p.body)
                    .map_err(|e| e.to_string())
                    .and_then(|raw| LiveEvent::from_command(raw).map_err(|e| e.to_string()));
                match event {
                    Ok(ev) => handlers.dispatch(ev).await,
                    Err(e) => debug!(room_id, error = %e, "skipping command"),
                }
            }
            op::HEARTBEAT_REPLY => debug!(room_id, popularity = ?p.popularity(), "heartbeat reply"),
            other => debug!(room_id, op = other, "ignored packet"),
        }
    }
}
