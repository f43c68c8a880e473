// src/platform.rs

use async_trait::async_trait;
use reqwest::{
    header::{COOKIE, REFERER, USER_AGENT},
    Client,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::utils::cookie::{self, Verify};

const UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(thiserror::Error, Debug)]
pub enum PlatformError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("platform error {code}: {message}")]
    Api { code: i64, message: String },
}

/// One outbound chat line, already defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanmakuRequest {
    pub room_id:   u32,
    pub message:   String,
    pub color:     String,
    pub font_size: String,
    pub mode:      String,
    pub dm_type:   String,
    pub bubble:    String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DanmakuResponse {
    pub code:    i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub msg:     String,
    #[serde(default)]
    pub data:    Value,
}

#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Raw `data` object of the room info endpoint.
    async fn room_info(&self, room_id: u32) -> Result<Value, PlatformError>;

    async fn send_danmaku(
        &self,
        req: &DanmakuRequest,
        verify: &Verify,
    ) -> Result<DanmakuResponse, PlatformError>;
}

/* ------------ live.bilibili.com ------------ */
#[derive(Clone)]
pub struct BiliApi {
    http:     Client,
    live_api: String,
}

#[derive(Deserialize)]
struct InfoReply {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

impl BiliApi {
    pub fn new(live_api: &str) -> Self {
        Self { http: Client::new(), live_api: live_api.trim_end_matches('/').to_owned() }
    }
}

#[async_trait]
impl PlatformApi for BiliApi {
    async fn room_info(&self, room_id: u32) -> Result<Value, PlatformError> {
        let reply: InfoReply = self
            .http
            .get(format!("{}/room/v1/Room/get_info", self.live_api))
            .query(&[("room_id", room_id)])
            .header(USER_AGENT, UA)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if reply.code != 0 {
            return Err(PlatformError::Api { code: reply.code, message: reply.message });
        }
        Ok(reply.data)
    }

    async fn send_danmaku(
        &self,
        req: &DanmakuRequest,
        verify: &Verify,
    ) -> Result<DanmakuResponse, PlatformError> {
        let room_id = req.room_id.to_string();
        let rnd = chrono::Utc::now().timestamp().to_string();
        let form = [
            ("bubble", req.bubble.as_str()),
            ("msg", req.message.as_str()),
            ("color", req.color.as_str()),
            ("mode", req.mode.as_str()),
            ("dm_type", req.dm_type.as_str()),
            ("fontsize", req.font_size.as_str()),
            ("rnd", rnd.as_str()),
            ("roomid", room_id.as_str()),
            ("csrf", verify.csrf.as_str()),
            ("csrf_token", verify.csrf.as_str()),
        ];
        let cookie = format!(
            "{}={}; {}={}",
            cookie::SESSION_KEY, verify.sess_data, cookie::CSRF_KEY, verify.csrf
        );

        let resp: DanmakuResponse = self
            .http
            .post(format!("{}/msg/send", self.live_api))
            .header(USER_AGENT, UA)
            .header(REFERER, format!("https://live.bilibili.com/{}", req.room_id))
            .header(COOKIE, cookie)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(room_id = req.room_id, code = resp.code, "danmaku posted");
        Ok(resp)
    }
}
