//! Per-room set of WebSocket subscribers.
//!
//! Broadcasts hold the read lock and never remove entries. A subscriber whose
//! write fails is closed in place; its own lifecycle task ([`SubscriberSet::serve`])
//! notices and removes it under the write lock.
use std::{collections::HashMap, pin::Pin, sync::Arc};

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::format::Envelope;

pub type WsSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

pub struct Subscriber {
    id:     Uuid,
    sink:   Mutex<WsSink>,
    closed: CancellationToken,
}

impl Subscriber {
    pub fn new<S>(sink: S) -> Arc<Self>
    where
        S: Sink<Message, Error = axum::Error> + Send + 'static,
    {
        Arc::new(Self {
            id:     Uuid::new_v4(),
            sink:   Mutex::new(Box::pin(sink)),
            closed: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub async fn send_text(&self, text: String) -> Result<(), axum::Error> {
        if self.is_closed() {
            return Err(axum::Error::new("subscriber closed"));
        }
        self.sink.lock().await.send(Message::Text(text)).await
    }

    pub async fn send<T: Serialize>(&self, envelope: &Envelope<T>) -> Result<(), axum::Error> {
        let text = serde_json::to_string(envelope).map_err(axum::Error::new)?;
        self.send_text(text).await
    }

    /// Mark closed, then close the underlying sink. Idempotent.
    pub async fn close(&self) {
        self.closed.cancel();
        let _ = self.sink.lock().await.close().await;
    }
}

#[derive(Default)]
pub struct SubscriberSet {
    sinks: RwLock<HashMap<Uuid, Arc<Subscriber>>>,
}

impl SubscriberSet {
    pub async fn add(&self, sub: Arc<Subscriber>) {
        self.sinks.write().await.insert(sub.id(), sub);
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.sinks.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sinks.read().await.len()
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.sinks.read().await.contains_key(&id)
    }

    /// Write `envelope` to every open subscriber; returns how many accepted it.
    pub async fn broadcast<T: Serialize>(&self, envelope: &Envelope<T>) -> usize {
        let text = match serde_json::to_string(envelope) {
            Ok(t) => t,
            Err(e) => {
                warn!(event = envelope.event, error = %e, "failed to serialize envelope");
                return 0;
            }
        };

        let sinks = self.sinks.read().await;
        let mut delivered = 0;
        for sub in sinks.values() {
            if sub.is_closed() {
                continue;
            }
            match sub.send_text(text.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(sink = %sub.id(), event = envelope.event, error = %e, "websocket write failed");
                    // removal belongs to the subscriber's own task
                    sub.close().await;
                }
            }
        }
        debug!(event = envelope.event, delivered, total = sinks.len(), "broadcast");
        delivered
    }

    /// Close every subscriber. Entries stay until their tasks remove them.
    pub async fn close_all(&self) {
        let sinks = self.sinks.write().await;
        for sub in sinks.values() {
            sub.close().await;
        }
    }

    /// Lifecycle task of one subscriber: drain `incoming` until the peer
    /// closes, a read fails, or the subscriber is closed from elsewhere;
    /// then close it and drop it from the set.
    pub async fn serve<S>(&self, sub: Arc<Subscriber>, incoming: S)
    where
        S: Stream<Item = Result<Message, axum::Error>>,
    {
        tokio::pin!(incoming);
        loop {
            tokio::select! {
                _ = sub.closed.cancelled() => break,
                msg = incoming.next() => match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(sink = %sub.id(), error = %e, "websocket read failed");
                        break;
                    }
                }
            }
        }
        sub.close().await;
        self.remove(sub.id()).await;
        debug!(sink = %sub.id(), "subscriber removed");
    }
}
