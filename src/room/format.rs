//! Envelopes pushed to subscribers: `{"event": ..., "data": ...}`.
use serde::Serialize;
use serde_json::Value;

use crate::upstream::event::{Danmaku, DanmakuKind, Emoticon, Gift, GuardBuy, Medal, SuperChat};

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub event: &'static str,
    pub data:  T,
}

/* ------------ danmaku ------------ */
#[derive(Debug, Serialize)]
pub struct DanmakuData<'a> {
    pub user:      UserData<'a>,
    pub content:   ContentData<'a>,
    pub timestamp: i64,
    pub raw:       &'a Value,
}

#[derive(Debug, Serialize)]
pub struct UserData<'a> {
    pub uid:         u64,
    pub username:    &'a str,
    pub is_admin:    bool,
    pub user_level:  i64,
    pub guard_level: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medal:       Option<MedalData<'a>>,
}

#[derive(Debug, Serialize)]
pub struct MedalData<'a> {
    pub name:       &'a str,
    pub level:      i64,
    pub color:      i64,
    pub up_name:    &'a str,
    pub up_room_id: u64,
    pub up_uid:     u64,
}

#[derive(Debug, Serialize)]
pub struct ContentData<'a> {
    pub message:  &'a str,
    #[serde(rename = "type")]
    pub kind:     &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoticon: Option<EmoticonData<'a>>,
}

#[derive(Debug, Serialize)]
pub struct EmoticonData<'a> {
    pub url:    &'a str,
    pub width:  i64,
    pub height: i64,
}

impl<'a> From<&'a Medal> for MedalData<'a> {
    fn from(m: &'a Medal) -> Self {
        Self {
            name:       &m.name,
            level:      m.level,
            color:      m.color,
            up_name:    &m.up_name,
            up_room_id: m.up_room_id,
            up_uid:     m.up_uid,
        }
    }
}

impl<'a> From<&'a Emoticon> for EmoticonData<'a> {
    fn from(e: &'a Emoticon) -> Self {
        Self { url: &e.url, width: e.width, height: e.height }
    }
}

pub fn danmaku(d: &Danmaku) -> Envelope<DanmakuData<'_>> {
    let s = &d.sender;
    let (kind, emoticon) = match d.kind {
        DanmakuKind::Text => ("text", None),
        DanmakuKind::Emoticon => (
            "emoticon",
            Some(d.emoticon.as_ref().map(EmoticonData::from).unwrap_or(EmoticonData {
                url: "",
                width: 0,
                height: 0,
            })),
        ),
    };
    Envelope {
        event: "danmaku",
        data: DanmakuData {
            user: UserData {
                uid:         s.uid,
                username:    &s.uname,
                is_admin:    s.admin,
                user_level:  s.user_level,
                guard_level: s.guard_level,
                // level 0 means the medal is not worn
                medal:       s.medal.as_ref().filter(|m| m.level > 0).map(MedalData::from),
            },
            content: ContentData { message: &d.content, kind, emoticon },
            timestamp: d.timestamp,
            raw: &d.raw,
        },
    }
}

/* ------------ paid events ------------ */
#[derive(Debug, Serialize)]
pub struct SuperChatData<'a> {
    pub uid:         u64,
    pub user:        &'a str,
    pub price:       i64,
    pub message:     &'a str,
    pub start_time:  i64,
    pub end_time:    i64,
    pub guard_level: i64,
    pub user_level:  i64,
    pub face:        &'a str,
}

pub fn super_chat(sc: &SuperChat) -> Envelope<SuperChatData<'_>> {
    Envelope {
        event: "superchat",
        data: SuperChatData {
            uid:         sc.uid,
            user:        &sc.user_info.uname,
            price:       sc.price,
            message:     &sc.message,
            start_time:  sc.start_time,
            end_time:    sc.end_time,
            guard_level: sc.user_info.guard_level,
            user_level:  sc.user_info.user_level,
            face:        &sc.user_info.face,
        },
    }
}

#[derive(Debug, Serialize)]
pub struct GiftData<'a> {
    pub uid:         u64,
    pub username:    &'a str,
    pub gift_id:     u64,
    pub gift_name:   &'a str,
    pub price:       i64,
    pub num:         i64,
    pub total_coin:  i64,
    pub guard_level: i64,
}

/// Only paid-currency gifts are relayed; silver gifts are noise.
pub fn gift(g: &Gift) -> Option<Envelope<GiftData<'_>>> {
    g.is_gold().then(|| Envelope {
        event: "gift",
        data: GiftData {
            uid:         g.uid,
            username:    &g.uname,
            gift_id:     g.gift_id,
            gift_name:   &g.gift_name,
            price:       g.price,
            num:         g.num,
            total_coin:  g.total_coin,
            guard_level: g.guard_level,
        },
    })
}

#[derive(Debug, Serialize)]
pub struct GuardData<'a> {
    pub uid:         u64,
    pub username:    &'a str,
    pub guard_level: i64,
    pub price:       i64,
    pub gift_id:     u64,
    pub gift_name:   &'a str,
    pub start_time:  i64,
    pub end_time:    i64,
}

pub fn guard_buy(g: &GuardBuy) -> Envelope<GuardData<'_>> {
    Envelope {
        event: "guard",
        data: GuardData {
            uid:         g.uid,
            username:    &g.username,
            guard_level: g.guard_level,
            price:       g.price,
            gift_id:     g.gift_id,
            gift_name:   &g.gift_name,
            start_time:  g.start_time,
            end_time:    g.end_time,
        },
    }
}

/* ------------ room signals ------------ */
#[derive(Debug, Serialize)]
pub struct RoomSignal {
    pub room_id: u32,
    /// Unix seconds, as a decimal string.
    pub time:    String,
}

/// `live_start`, `live_end` and the per-subscriber `connected` greeting.
pub fn signal(event: &'static str, room_id: u32) -> Envelope<RoomSignal> {
    Envelope { event, data: RoomSignal { room_id, time: chrono::Utc::now().timestamp().to_string() } }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::event::Sender;
    use serde_json::json;

    fn sample_danmaku(kind: DanmakuKind) -> Danmaku {
        Danmaku {
            sender: Sender {
                uid: 42,
                uname: "alice".into(),
                admin: false,
                user_level: 12,
                guard_level: 3,
                medal: Some(Medal { name: "fans".into(), level: 0, ..Default::default() }),
            },
            content: "[doge]".into(),
            kind,
            emoticon: (kind == DanmakuKind::Emoticon).then(|| Emoticon {
                url: "http://x/e.png".into(),
                width: 20,
                height: 20,
            }),
            timestamp: 1_700_000_000_000,
            raw: json!({"cmd": "DANMU_MSG"}),
        }
    }

    #[test]
    fn emoticon_danmaku_embeds_image() {
        let v = serde_json::to_value(danmaku(&sample_danmaku(DanmakuKind::Emoticon))).unwrap();
        assert_eq!(v["event"], "danmaku");
        assert_eq!(
            v["data"]["content"],
            json!({"message": "[doge]", "type": "emoticon",
                   "emoticon": {"url": "http://x/e.png", "width": 20, "height": 20}})
        );
        assert_eq!(v["data"]["user"]["username"], "alice");
        assert_eq!(v["data"]["raw"]["cmd"], "DANMU_MSG");
    }

    #[test]
    fn text_danmaku_has_no_emoticon_and_hides_unworn_medal() {
        let v = serde_json::to_value(danmaku(&sample_danmaku(DanmakuKind::Text))).unwrap();
        assert_eq!(v["data"]["content"], json!({"message": "[doge]", "type": "text"}));
        assert!(v["data"]["user"].get("medal").is_none());
    }

    #[test]
    fn worn_medal_is_included() {
        let mut d = sample_danmaku(DanmakuKind::Text);
        d.sender.medal = Some(Medal {
            name: "fans".into(), level: 21, color: 398668,
            up_name: "streamer".into(), up_room_id: 555, up_uid: 777,
        });
        let v = serde_json::to_value(danmaku(&d)).unwrap();
        assert_eq!(
            v["data"]["user"]["medal"],
            json!({"name": "fans", "level": 21, "color": 398668,
                   "up_name": "streamer", "up_room_id": 555, "up_uid": 777})
        );
    }

    #[test]
    fn silver_gifts_are_dropped() {
        let mut g = Gift { coin_type: "silver".into(), gift_name: "stick".into(), ..Default::default() };
        assert!(gift(&g).is_none());

        g.coin_type = "gold".into();
        let env = gift(&g).expect("gold gift relayed");
        assert_eq!(env.event, "gift");
        assert_eq!(env.data.gift_name, "stick");
    }

    #[test]
    fn super_chat_flattens_user_info() {
        let mut sc = SuperChat { uid: 5, price: 30, message: "hi".into(), ..Default::default() };
        sc.user_info.uname = "carol".into();
        sc.user_info.face = "http://f".into();
        let v = serde_json::to_value(super_chat(&sc)).unwrap();
        assert_eq!(v["event"], "superchat");
        assert_eq!(v["data"]["user"], "carol");
        assert_eq!(v["data"]["face"], "http://f");
        assert_eq!(v["data"]["price"], 30);
    }

    #[test]
    fn guard_and_signals() {
        let g = GuardBuy { username: "dave".into(), guard_level: 3, ..Default::default() };
        let v = serde_json::to_value(guard_buy(&g)).unwrap();
        assert_eq!(v["event"], "guard");
        assert_eq!(v["data"]["guard_level"], 3);

        let before = chrono::Utc::now().timestamp();
        let s = signal("live_start", 555);
        assert_eq!(s.data.room_id, 555);
        assert!(s.data.time.parse::<i64>().unwrap() >= before);

        let v = serde_json::to_value(signal("live_end", 555)).unwrap();
        assert_eq!(v["event"], "live_end");
        assert!(v["data"]["time"].is_string());
    }
}
