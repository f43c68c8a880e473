use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{format, subscribers::SubscriberSet};
use crate::upstream::{
    event::{Danmaku, Gift, GuardBuy, SuperChat},
    EventSource, Handlers, UpstreamError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/* ------------ one connected room ------------ */
pub struct RoomSession {
    room_id:      u32,
    cookie:       RwLock<Option<String>>,
    status:       RwLock<ConnectionStatus>,
    connected_at: DateTime<Utc>,
    source:       Arc<dyn EventSource>,
    subscribers:  SubscriberSet,
    danmaku_seen: AtomicU64,
    gifts_seen:   AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    #[serde(rename = "roomID")]
    pub room_id:       u32,
    pub status:        ConnectionStatus,
    pub connected_at:  DateTime<Utc>,
    pub subscribers:   usize,
    pub danmaku_count: u64,
    pub gift_count:    u64,
}

impl RoomSession {
    pub fn new(room_id: u32, cookie: Option<String>, source: Arc<dyn EventSource>) -> Arc<Self> {
        Arc::new(Self {
            room_id,
            cookie:       RwLock::new(cookie),
            status:       RwLock::new(ConnectionStatus::Connecting),
            connected_at: Utc::now(),
            source,
            subscribers:  SubscriberSet::default(),
            danmaku_seen: AtomicU64::new(0),
            gifts_seen:   AtomicU64::new(0),
        })
    }

    pub fn room_id(&self) -> u32 {
        self.room_id
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    pub fn cookie(&self) -> Option<String> {
        self.cookie.read().clone()
    }

    pub fn subscribers(&self) -> &SubscriberSet {
        &self.subscribers
    }

    /// Connecting → Connected. False if a disconnect got there first.
    pub(super) fn mark_connected(&self) -> bool {
        let mut status = self.status.write();
        if *status != ConnectionStatus::Connecting {
            return false;
        }
        *status = ConnectionStatus::Connected;
        true
    }

    pub(super) fn mark_disconnected(&self) {
        *self.status.write() = ConnectionStatus::Disconnected;
    }

    /// Store the new credential and hand it to the source; no reconnect.
    pub fn update_cookie(&self, cookie: String) {
        *self.cookie.write() = Some(cookie.clone());
        self.source.set_cookie(Some(cookie));
    }

    /// Install the event bridge on the source, then start it.
    pub(super) async fn start(self: &Arc<Self>) -> Result<(), UpstreamError> {
        self.source.register(self.bridge());
        self.source.start().await
    }

    /// Close all subscribers, stop the source, mark disconnected.
    pub(super) async fn shutdown(&self) {
        self.subscribers.close_all().await;
        self.source.stop();
        self.mark_disconnected();
    }

    pub async fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id:       self.room_id,
            status:        self.status(),
            connected_at:  self.connected_at,
            subscribers:   self.subscribers.len().await,
            danmaku_count: self.danmaku_seen.load(Ordering::Relaxed),
            gift_count:    self.gifts_seen.load(Ordering::Relaxed),
        }
    }

    /* ------------ event bridge ------------ */
    fn bridge(self: &Arc<Self>) -> Handlers {
        let weak = Arc::downgrade(self);
        let mut h = Handlers::default();

        h.on_danmaku(relay(&weak, |s, d: Danmaku| async move {
            s.danmaku_seen.fetch_add(1, Ordering::Relaxed);
            s.subscribers.broadcast(&format::danmaku(&d)).await;
        }))
        .on_super_chat(relay(&weak, |s, sc: SuperChat| async move {
            s.subscribers.broadcast(&format::super_chat(&sc)).await;
        }))
        .on_gift(relay(&weak, |s, g: Gift| async move {
            s.gifts_seen.fetch_add(1, Ordering::Relaxed);
            if let Some(env) = format::gift(&g) {
                s.subscribers.broadcast(&env).await;
            }
        }))
        .on_guard_buy(relay(&weak, |s, g: GuardBuy| async move {
            s.subscribers.broadcast(&format::guard_buy(&g)).await;
        }))
        .on_command("LIVE", relay(&weak, |s, _: Value| async move {
            info!(room_id = s.room_id, "live started");
            s.subscribers.broadcast(&format::signal("live_start", s.room_id)).await;
        }))
        .on_command("PREPARING", relay(&weak, |s, _: Value| async move {
            info!(room_id = s.room_id, "live ended");
            s.subscribers.broadcast(&format::signal("live_end", s.room_id)).await;
        }))
        .on_closed(relay(&weak, |s, ()| async move {
            warn!(room_id = s.room_id, "upstream connection lost");
            s.mark_disconnected();
        }));
        h
    }
}

/// Adapt `f(session, event)` into a source callback. Holds the session
/// weakly so the source (owned by the session) does not keep it alive.
fn relay<T, F, Fut>(
    weak: &Weak<RoomSession>,
    f: F,
) -> impl Fn(T) -> futures_util::future::BoxFuture<'static, ()> + Send + Sync + 'static
where
    T: Send + 'static,
    F: Fn(Arc<RoomSession>, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let weak = weak.clone();
    move |ev| {
        let fut = weak.upgrade().map(|s| f(s, ev));
        Box::pin(async move {
            if let Some(fut) = fut {
                fut.await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{channel_subscriber, FakeSource};
    use crate::upstream::event::{DanmakuKind, Emoticon};
    use crate::upstream::LiveEvent;

    async fn started_session(room_id: u32) -> (Arc<RoomSession>, Arc<FakeSource>) {
        let source = FakeSource::new(room_id, None, false);
        let session = RoomSession::new(room_id, None, source.clone());
        session.start().await.unwrap();
        assert!(session.mark_connected());
        (session, source)
    }

    #[tokio::test]
    async fn emoticon_danmaku_reaches_both_subscribers_identically() {
        let (session, source) = started_session(555).await;
        let (a, mut a_rx) = channel_subscriber();
        let (b, mut b_rx) = channel_subscriber();
        session.subscribers().add(a).await;
        session.subscribers().add(b).await;

        source
            .emit(LiveEvent::Danmaku(Danmaku {
                content: "e".into(),
                kind: DanmakuKind::Emoticon,
                emoticon: Some(Emoticon { url: "http://x/e.png".into(), width: 64, height: 64 }),
                ..Default::default()
            }))
            .await;

        let a_msg = a_rx.try_recv().unwrap();
        let b_msg = b_rx.try_recv().unwrap();
        assert_eq!(a_msg, b_msg);

        let axum::extract::ws::Message::Text(text) = a_msg else { panic!("expected text") };
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["event"], "danmaku");
        assert_eq!(v["data"]["content"]["type"], "emoticon");
        assert_eq!(v["data"]["content"]["emoticon"]["url"], "http://x/e.png");
        assert_eq!(session.summary().await.danmaku_count, 1);
    }

    #[tokio::test]
    async fn gifts_are_counted_but_only_gold_is_broadcast() {
        let (session, source) = started_session(7).await;
        let (sub, mut rx) = channel_subscriber();
        session.subscribers().add(sub).await;

        source.emit(LiveEvent::Gift(Gift { coin_type: "silver".into(), ..Default::default() })).await;
        assert!(rx.try_recv().is_err());

        source.emit(LiveEvent::Gift(Gift { coin_type: "gold".into(), ..Default::default() })).await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(session.summary().await.gift_count, 2);
    }

    #[tokio::test]
    async fn live_signals_carry_room_id() {
        let (session, source) = started_session(9).await;
        let (sub, mut rx) = channel_subscriber();
        session.subscribers().add(sub).await;

        for cmd in ["LIVE", "PREPARING"] {
            source.emit(LiveEvent::Command { cmd: cmd.into(), raw: Value::Null }).await;
        }
        let events: Vec<serde_json::Value> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|m| match m {
                axum::extract::ws::Message::Text(t) => serde_json::from_str(&t).unwrap(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event"], "live_start");
        assert_eq!(events[1]["event"], "live_end");
        assert_eq!(events[1]["data"]["room_id"], 9);
    }

    #[tokio::test]
    async fn lost_upstream_marks_disconnected() {
        let (session, source) = started_session(3).await;
        source.drop_connection().await;
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn cookie_update_is_forwarded_without_restart() {
        let (session, source) = started_session(4).await;
        session.update_cookie("SESSDATA=1; bili_jct=2".into());
        assert_eq!(session.cookie().as_deref(), Some("SESSDATA=1; bili_jct=2"));
        assert_eq!(source.cookie().as_deref(), Some("SESSDATA=1; bili_jct=2"));
        assert_eq!(source.starts(), 1);
    }

    #[tokio::test]
    async fn dropped_session_silences_bridge() {
        let (session, source) = started_session(5).await;
        drop(session);
        // no panic, nothing to deliver to
        source.emit(LiveEvent::Command { cmd: "LIVE".into(), raw: Value::Null }).await;
    }
}
