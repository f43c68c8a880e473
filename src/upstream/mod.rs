//! Upstream live-room connection: the only producer of room events.
//!
//! The relay core only sees the [`EventSource`] trait. A source is created per
//! room by an [`EventSourceFactory`], receives its [`Handlers`] once before
//! `start`, and invokes them from its own task.
use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;

mod client;
pub mod event;
pub mod packet;

pub use client::BiliClientFactory;
pub use event::LiveEvent;
use event::{Danmaku, Gift, GuardBuy, SuperChat};

#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("platform error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("auth rejected: {0}")]
    Auth(String),

    #[error("packet: {0}")]
    Packet(#[from] packet::PacketError),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed before auth reply")]
    Closed,

    #[error("start timed out after {0:?}")]
    Timeout(Duration),
}

pub type Callback<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// Callbacks a source fires for each decoded event.
///
/// Dispatch awaits each callback in turn, so a source that awaits
/// [`Handlers::dispatch`] before decoding the next command preserves
/// per-room ordering.
#[derive(Default, Clone)]
pub struct Handlers {
    danmaku:    Vec<Callback<Danmaku>>,
    super_chat: Vec<Callback<SuperChat>>,
    gift:       Vec<Callback<Gift>>,
    guard_buy:  Vec<Callback<GuardBuy>>,
    commands:   HashMap<String, Vec<Callback<Value>>>,
    closed:     Vec<Callback<()>>,
}

fn boxed<T: 'static, F, Fut>(f: F) -> Callback<T>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ev: T| -> BoxFuture<'static, ()> { Box::pin(f(ev)) })
}

impl Handlers {
    pub fn on_danmaku<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Danmaku) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.danmaku.push(boxed(f));
        self
    }

    pub fn on_super_chat<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(SuperChat) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.super_chat.push(boxed(f));
        self
    }

    pub fn on_gift<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Gift) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.gift.push(boxed(f));
        self
    }

    pub fn on_guard_buy<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(GuardBuy) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.guard_buy.push(boxed(f));
        self
    }

    /// Handler for an untyped command such as `LIVE` or `PREPARING`.
    pub fn on_command<F, Fut>(&mut self, cmd: &str, f: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.commands.entry(cmd.to_owned()).or_default().push(boxed(f));
        self
    }

    /// Fired when the upstream connection ends without `stop` being called.
    pub fn on_closed<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(()) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.closed.push(boxed(f));
        self
    }

    pub async fn dispatch(&self, event: LiveEvent) {
        match event {
            LiveEvent::Danmaku(d)   => fire(&self.danmaku, d).await,
            LiveEvent::SuperChat(s) => fire(&self.super_chat, s).await,
            LiveEvent::Gift(g)      => fire(&self.gift, g).await,
            LiveEvent::GuardBuy(g)  => fire(&self.guard_buy, g).await,
            LiveEvent::Command { cmd, raw } => {
                if let Some(cbs) = self.commands.get(&cmd) {
                    fire(cbs, raw).await;
                }
            }
        }
    }

    pub async fn closed(&self) {
        fire(&self.closed, ()).await;
    }
}

async fn fire<T: Clone>(cbs: &[Callback<T>], ev: T) {
    for cb in cbs {
        cb(ev.clone()).await;
    }
}

/* ------------ source seam ------------ */
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Install the callbacks. Called once, before [`EventSource::start`].
    fn register(&self, handlers: Handlers);

    /// Open the connection. Returns once the upstream accepted the session;
    /// events are delivered from a background task afterwards.
    async fn start(&self) -> Result<(), UpstreamError>;

    fn stop(&self);

    /// Credential used by later authenticated requests. Does not reconnect.
    fn set_cookie(&self, cookie: Option<String>);
}

pub trait EventSourceFactory: Send + Sync {
    fn create(&self, room_id: u32, cookie: Option<String>) -> Arc<dyn EventSource>;
}
