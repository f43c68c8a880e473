//! Typed live-room events decoded from upstream command JSON.
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Danmaku(Danmaku),
    SuperChat(SuperChat),
    Gift(Gift),
    GuardBuy(GuardBuy),
    /// Anything without a typed decoder, keyed by command name.
    Command { cmd: String, raw: Value },
}

#[derive(thiserror::Error, Debug)]
pub enum EventError {
    #[error("command has no cmd field")]
    MissingCmd,

    #[error("malformed {cmd} payload: {source}")]
    Payload { cmd: String, source: serde_json::Error },
}

/* ------------ chat message ------------ */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DanmakuKind {
    #[default]
    Text,
    Emoticon,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Medal {
    pub name:       String,
    pub level:      i64,
    pub color:      i64,
    pub up_name:    String,
    pub up_room_id: u64,
    pub up_uid:     u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sender {
    pub uid:         u64,
    pub uname:       String,
    pub admin:       bool,
    pub user_level:  i64,
    pub guard_level: i64,
    pub medal:       Option<Medal>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Emoticon {
    #[serde(default)]
    pub url:    String,
    #[serde(default)]
    pub width:  i64,
    #[serde(default)]
    pub height: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Danmaku {
    pub sender:    Sender,
    pub content:   String,
    pub kind:      DanmakuKind,
    pub emoticon:  Option<Emoticon>,
    /// Milliseconds since the epoch, as sent by the platform.
    pub timestamp: i64,
    pub raw:       Value,
}

/* ------------ paid events ------------ */
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScUser {
    pub uname:       String,
    pub face:        String,
    pub guard_level: i64,
    pub user_level:  i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SuperChat {
    pub uid:        u64,
    pub price:      i64,
    pub message:    String,
    pub start_time: i64,
    pub end_time:   i64,
    pub user_info:  ScUser,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Gift {
    pub uid:         u64,
    pub uname:       String,
    #[serde(rename = "giftId")]
    pub gift_id:     u64,
    #[serde(rename = "giftName")]
    pub gift_name:   String,
    pub price:       i64,
    pub num:         i64,
    pub total_coin:  i64,
    /// `"gold"` for paid currency, `"silver"` for the free one.
    pub coin_type:   String,
    pub guard_level: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GuardBuy {
    pub uid:         u64,
    pub username:    String,
    pub guard_level: i64,
    pub num:         i64,
    pub price:       i64,
    pub gift_id:     u64,
    pub gift_name:   String,
    pub start_time:  i64,
    pub end_time:    i64,
}

impl Gift {
    pub fn is_gold(&self) -> bool {
        self.coin_type == "gold"
    }
}

/* ------------ decoding ------------ */
impl LiveEvent {
    /// Decode one command object. Suffixed names such as
    /// `DANMU_MSG:4:0:2:2:2:0` match on the part before the first `:`.
    pub fn from_command(raw: Value) -> Result<Self, EventError> {
        let cmd = raw
            .get("cmd")
            .and_then(Value::as_str)
            .ok_or(EventError::MissingCmd)?;
        let cmd = cmd.split(':').next().unwrap_or_default().to_owned();

        let event = match cmd.as_str() {
            "DANMU_MSG"          => LiveEvent::Danmaku(Danmaku::from_raw(raw)),
            "SUPER_CHAT_MESSAGE" => LiveEvent::SuperChat(data(&cmd, &raw)?),
            "SEND_GIFT"          => LiveEvent::Gift(data(&cmd, &raw)?),
            "GUARD_BUY"          => LiveEvent::GuardBuy(data(&cmd, &raw)?),
            _                    => LiveEvent::Command { cmd, raw },
        };
        Ok(event)
    }
}

fn data<T: serde::de::DeserializeOwned>(cmd: &str, raw: &Value) -> Result<T, EventError> {
    let payload = raw.get("data").cloned().unwrap_or(Value::Null);
    serde_json::from_value(payload)
        .map_err(|source| EventError::Payload { cmd: cmd.to_owned(), source })
}

fn int(v: &Value, ptr: &str) -> i64 {
    v.pointer(ptr).and_then(Value::as_i64).unwrap_or_default()
}

fn uint(v: &Value, ptr: &str) -> u64 {
    v.pointer(ptr).and_then(Value::as_u64).unwrap_or_default()
}

fn text(v: &Value, ptr: &str) -> String {
    v.pointer(ptr).and_then(Value::as_str).unwrap_or_default().to_owned()
}

impl Danmaku {
    /// `DANMU_MSG` is positional: `info[0]` meta, `info[1]` text,
    /// `info[2]` user, `info[3]` medal, `info[4]` level, `info[7]` guard.
    fn from_raw(raw: Value) -> Self {
        let kind = match int(&raw, "/info/0/12") {
            1 => DanmakuKind::Emoticon,
            _ => DanmakuKind::Text,
        };
        let emoticon = match kind {
            DanmakuKind::Emoticon => raw
                .pointer("/info/0/13")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok()),
            DanmakuKind::Text => None,
        };
        let medal = raw
            .pointer("/info/3")
            .and_then(Value::as_array)
            .filter(|m| !m.is_empty())
            .map(|_| Medal {
                level:      int(&raw, "/info/3/0"),
                name:       text(&raw, "/info/3/1"),
                up_name:    text(&raw, "/info/3/2"),
                up_room_id: uint(&raw, "/info/3/3"),
                color:      int(&raw, "/info/3/4"),
                up_uid:     uint(&raw, "/info/3/12"),
            });

        Self {
            sender: Sender {
                uid:         uint(&raw, "/info/2/0"),
                uname:       text(&raw, "/info/2/1"),
                admin:       int(&raw, "/info/2/2") == 1,
                user_level:  int(&raw, "/info/4/0"),
                guard_level: int(&raw, "/info/7"),
                medal,
            },
            content: text(&raw, "/info/1"),
            kind,
            emoticon,
            timestamp: int(&raw, "/info/0/4"),
            raw,
        }
    }
}
