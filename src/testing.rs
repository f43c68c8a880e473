//! In-crate fakes shared by the unit tests.
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use axum::extract::ws::Message;
use futures_util::{sink, stream, Stream};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};

use crate::{
    platform::{DanmakuRequest, DanmakuResponse, PlatformApi, PlatformError},
    room::Subscriber,
    upstream::{EventSource, EventSourceFactory, Handlers, LiveEvent, UpstreamError},
    utils::cookie::Verify,
};

/* ------------ subscriber sinks ------------ */
pub fn channel_subscriber() -> (Arc<Subscriber>, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = sink::unfold(tx, |tx, msg: Message| async move {
        tx.send(msg).map_err(axum::Error::new)?;
        Ok::<_, axum::Error>(tx)
    });
    (Subscriber::new(sink), rx)
}

pub fn broken_subscriber() -> Arc<Subscriber> {
    Subscriber::new(sink::unfold((), |(), _msg: Message| async {
        Err::<(), _>(axum::Error::new("broken pipe"))
    }))
}

/// Incoming half of a subscriber; stays pending until fed or the sender drops.
pub fn open_stream() -> (
    mpsc::UnboundedSender<Result<Message, axum::Error>>,
    impl Stream<Item = Result<Message, axum::Error>> + Send + 'static,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let incoming = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|m| (m, rx)) });
    (tx, incoming)
}

/* ------------ event source ------------ */
pub struct FakeSource {
    room_id:  u32,
    handlers: RwLock<Arc<Handlers>>,
    cookie:   RwLock<Option<String>>,
    fail:     bool,
    gate:     Option<Arc<Notify>>,
    hang_up:  bool,
    starts:   AtomicUsize,
    stops:    AtomicUsize,
}

impl FakeSource {
    pub fn new(room_id: u32, cookie: Option<String>, fail: bool) -> Arc<Self> {
        Self::build(room_id, cookie, fail, None, false)
    }

    fn build(
        room_id: u32,
        cookie: Option<String>,
        fail: bool,
        gate: Option<Arc<Notify>>,
        hang_up: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            room_id,
            handlers: RwLock::new(Arc::new(Handlers::default())),
            cookie: RwLock::new(cookie),
            fail,
            gate,
            hang_up,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        })
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn cookie(&self) -> Option<String> {
        self.cookie.read().clone()
    }

    /// Deliver one event the way the upstream task would.
    pub async fn emit(&self, event: LiveEvent) {
        let handlers = self.handlers.read().clone();
        handlers.dispatch(event).await;
    }

    /// Simulate the platform hanging up.
    pub async fn drop_connection(&self) {
        let handlers = self.handlers.read().clone();
        handlers.closed().await;
    }
}

#[async_trait]
impl EventSource for FakeSource {
    fn register(&self, handlers: Handlers) {
        *self.handlers.write() = Arc::new(handlers);
    }

    async fn start(&self) -> Result<(), UpstreamError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(UpstreamError::Api { code: -400, message: format!("room {} refused", self.room_id) });
        }
        if self.hang_up {
            // the platform drops the socket right after auth
            self.drop_connection().await;
        }
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn set_cookie(&self, cookie: Option<String>) {
        *self.cookie.write() = cookie;
    }
}

#[derive(Default)]
pub struct FakeFactory {
    failing: Mutex<HashSet<u32>>,
    closing: Mutex<HashSet<u32>>,
    gates:   Mutex<HashMap<u32, Arc<Notify>>>,
    sources: Mutex<Vec<Arc<FakeSource>>>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_room(&self, room_id: u32) {
        self.failing.lock().insert(room_id);
    }

    /// Fire `closed` from inside `start`, before it returns Ok.
    pub fn close_on_start(&self, room_id: u32) {
        self.closing.lock().insert(room_id);
    }

    /// Park `start` for this room until the returned handle is notified.
    pub fn gate_room(&self, room_id: u32) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().insert(room_id, gate.clone());
        gate
    }

    /// Most recently created source for the room.
    pub fn source(&self, room_id: u32) -> Option<Arc<FakeSource>> {
        self.sources.lock().iter().rev().find(|s| s.room_id == room_id).cloned()
    }

    pub fn created(&self) -> usize {
        self.sources.lock().len()
    }
}

impl EventSourceFactory for FakeFactory {
    fn create(&self, room_id: u32, cookie: Option<String>) -> Arc<dyn EventSource> {
        let fail = self.failing.lock().contains(&room_id);
        let hang_up = self.closing.lock().remove(&room_id);
        let gate = self.gates.lock().get(&room_id).cloned();
        let source = FakeSource::build(room_id, cookie, fail, gate, hang_up);
        self.sources.lock().push(source.clone());
        source
    }
}

/* ------------ platform ------------ */
#[derive(Default)]
pub struct FakePlatform {
    reject: Option<(i64, String)>,
    sent:   Mutex<Vec<(DanmakuRequest, Verify)>>,
}

impl FakePlatform {
    pub fn rejecting(code: i64, message: &str) -> Self {
        Self { reject: Some((code, message.to_owned())), ..Default::default() }
    }

    pub fn sent(&self) -> Vec<(DanmakuRequest, Verify)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn room_info(&self, room_id: u32) -> Result<Value, PlatformError> {
        match &self.reject {
            Some((code, message)) => Err(PlatformError::Api { code: *code, message: message.clone() }),
            None => Ok(json!({"room_id": room_id, "title": "test room", "live_status": 1})),
        }
    }

    async fn send_danmaku(
        &self,
        req: &DanmakuRequest,
        verify: &Verify,
    ) -> Result<DanmakuResponse, PlatformError> {
        self.sent.lock().push((req.clone(), verify.clone()));
        Ok(match &self.reject {
            Some((code, message)) => DanmakuResponse { code: *code, message: message.clone(), ..Default::default() },
            None => DanmakuResponse::default(),
        })
    }
}
