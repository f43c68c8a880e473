use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::session::{ConnectionStatus, RoomSession, RoomSummary};
use crate::upstream::{EventSourceFactory, UpstreamError};

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("Room {0} not connected")]
    NotFound(u32),

    #[error("Failed to connect: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Room {0} was disconnected while connecting")]
    Aborted(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    AlreadyConnected,
}

/// How long a source may take to come up before the connect is rolled back.
pub const START_TIMEOUT: Duration = Duration::from_secs(15);

/// RoomID → session. At most one live session per room.
pub struct RoomRegistry {
    sessions:      RwLock<HashMap<u32, Arc<RoomSession>>>,
    factory:       Arc<dyn EventSourceFactory>,
    start_timeout: Duration,
}

impl RoomRegistry {
    pub fn new(factory: Arc<dyn EventSourceFactory>) -> Self {
        Self::with_start_timeout(factory, START_TIMEOUT)
    }

    pub fn with_start_timeout(factory: Arc<dyn EventSourceFactory>, start_timeout: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), factory, start_timeout }
    }

    pub async fn connect(
        &self,
        room_id: u32,
        cookie: Option<String>,
    ) -> Result<ConnectOutcome, RegistryError> {
        /* ---- check and insert under one write lock ---- */
        let (session, stale) = {
            let mut sessions = self.sessions.write().await;
            let stale = match sessions.get(&room_id) {
                Some(s) if s.status() != ConnectionStatus::Disconnected => {
                    return Ok(ConnectOutcome::AlreadyConnected);
                }
                Some(s) => Some(s.clone()),
                None => None,
            };
            let source = self.factory.create(room_id, cookie.clone());
            let session = RoomSession::new(room_id, cookie, source);
            sessions.insert(room_id, session.clone());
            (session, stale)
        };

        // upstream dropped earlier; its subscribers still need closing
        if let Some(old) = stale {
            old.shutdown().await;
        }

        /* ---- start outside the lock ---- */
        let started = tokio::time::timeout(self.start_timeout, session.start())
            .await
            .unwrap_or(Err(UpstreamError::Timeout(self.start_timeout)));
        if let Err(e) = started {
            warn!(room_id, error = %e, "upstream connect failed");
            session.shutdown().await;
            self.remove_if_same(room_id, &session).await;
            return Err(e.into());
        }

        if !session.mark_connected() {
            // a disconnect ran, or the upstream hung up, while the source was starting
            session.shutdown().await;
            self.remove_if_same(room_id, &session).await;
            return Err(RegistryError::Aborted(room_id));
        }
        info!(room_id, "room connected");
        Ok(ConnectOutcome::Connected)
    }

    pub async fn disconnect(&self, room_id: u32) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .read()
            .await
            .get(&room_id)
            .cloned()
            .ok_or(RegistryError::NotFound(room_id))?;

        session.shutdown().await;
        self.remove_if_same(room_id, &session).await;
        info!(room_id, "room disconnected");
        Ok(())
    }

    pub async fn get(&self, room_id: u32) -> Result<Arc<RoomSession>, RegistryError> {
        self.sessions
            .read()
            .await
            .get(&room_id)
            .cloned()
            .ok_or(RegistryError::NotFound(room_id))
    }

    pub async fn list(&self) -> Vec<RoomSummary> {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(sessions.len());
        for s in sessions {
            out.push(s.summary().await);
        }
        out
    }

    pub async fn update_cookie(&self, room_id: u32, cookie: String) -> Result<(), RegistryError> {
        self.get(room_id).await?.update_cookie(cookie);
        info!(room_id, "room cookie updated");
        Ok(())
    }

    async fn remove_if_same(&self, room_id: u32, session: &Arc<RoomSession>) {
        let mut sessions = self.sessions.write().await;
        if sessions.get(&room_id).is_some_and(|cur| Arc::ptr_eq(cur, session)) {
            sessions.remove(&room_id);
        }
    }
}
