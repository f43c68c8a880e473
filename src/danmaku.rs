//! Outbound chat posting.
use serde::Deserialize;
use tracing::info;

use crate::{
    platform::{DanmakuRequest, DanmakuResponse, PlatformApi, PlatformError},
    utils::cookie::Verify,
};

pub const DEFAULT_COLOR:     &str = "16777215";
pub const DEFAULT_FONT_SIZE: &str = "25";
pub const DEFAULT_MODE:      &str = "1";

/// Request body of `POST /rooms/:room_id/danmaku`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DanmakuForm {
    pub message:     String,
    pub cookie:      String,
    #[serde(default)]
    pub color:       Option<String>,
    #[serde(default)]
    pub font_size:   Option<String>,
    #[serde(default)]
    pub mode:        Option<String>,
    #[serde(default)]
    pub is_emoticon: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum SendError {
    #[error("Invalid cookie: bili_jct or SESSDATA not found")]
    InvalidCredential,

    #[error("Failed to send danmaku: {0}")]
    Platform(#[from] PlatformError),

    #[error("Failed to send danmaku: {message}")]
    PostFailed { message: String, code: i64 },
}

fn or_default(v: &Option<String>, default: &str) -> String {
    match v.as_deref() {
        Some(s) if !s.is_empty() => s.to_owned(),
        _ => default.to_owned(),
    }
}

impl DanmakuForm {
    pub fn to_request(&self, room_id: u32) -> DanmakuRequest {
        DanmakuRequest {
            room_id,
            message:   self.message.clone(),
            color:     or_default(&self.color, DEFAULT_COLOR),
            font_size: or_default(&self.font_size, DEFAULT_FONT_SIZE),
            mode:      or_default(&self.mode, DEFAULT_MODE),
            dm_type:   if self.is_emoticon.as_deref() == Some("1") { "1" } else { "0" }.into(),
            bubble:    "0".into(),
        }
    }
}

/// Validate the credential, fill defaults and post through `api`.
pub async fn send(
    api: &dyn PlatformApi,
    room_id: u32,
    form: &DanmakuForm,
) -> Result<DanmakuResponse, SendError> {
    let verify = Verify::from_cookie(&form.cookie).ok_or(SendError::InvalidCredential)?;
    let req = form.to_request(room_id);

    let resp = api.send_danmaku(&req, &verify).await?;
    if resp.code != 0 {
        let message = if resp.message.is_empty() { resp.msg.clone() } else { resp.message.clone() };
        return Err(SendError::PostFailed { message, code: resp.code });
    }
    info!(room_id, "danmaku sent");
    Ok(resp)
}
