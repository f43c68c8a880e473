use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::{platform::PlatformApi, room::RoomRegistry, utils::cookie};

/* ------------ shared handles (axum Extension) ------------ */
pub type Rooms    = Arc<RoomRegistry>;
pub type Cookies  = Arc<CookieStore>;
pub type Platform = Arc<dyn PlatformApi>;

/* ------------ credential store ------------ */
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CookieError {
    #[error("Cookie ID already exists")]
    Duplicate,

    #[error("Cookie not found")]
    NotFound,

    #[error("Cookie must contain bili_jct and SESSDATA")]
    Invalid,
}

#[derive(Debug, Clone)]
struct Entry {
    cookie:     String,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    cookies: HashMap<String, Entry>,
    default: String,
}

/// Named credentials plus one unscoped default, behind a single lock.
#[derive(Default)]
pub struct CookieStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CookieSummary {
    pub id:           String,
    pub has_bili_jct: bool,
    pub has_sessdata: bool,
    pub updated_at:   DateTime<Utc>,
}

impl CookieStore {
    pub fn with_default(default: Option<String>) -> Self {
        Self {
            inner: RwLock::new(Inner { cookies: HashMap::new(), default: default.unwrap_or_default() }),
        }
    }

    pub async fn list(&self) -> Vec<CookieSummary> {
        let inner = self.inner.read().await;
        let mut out: Vec<_> = inner
            .cookies
            .iter()
            .map(|(id, e)| {
                let (has_bili_jct, has_sessdata) = cookie::has_required(&e.cookie);
                CookieSummary { id: id.clone(), has_bili_jct, has_sessdata, updated_at: e.updated_at }
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub async fn get(&self, id: &str) -> Option<String> {
        self.inner.read().await.cookies.get(id).map(|e| e.cookie.clone())
    }

    pub async fn add(&self, id: String, value: String) -> Result<(), CookieError> {
        let mut inner = self.inner.write().await;
        if inner.cookies.contains_key(&id) {
            return Err(CookieError::Duplicate);
        }
        if !cookie::is_valid(&value) {
            return Err(CookieError::Invalid);
        }
        inner.cookies.insert(id, Entry { cookie: value, updated_at: Utc::now() });
        Ok(())
    }

    pub async fn update(&self, id: &str, value: String) -> Result<(), CookieError> {
        let mut inner = self.inner.write().await;
        let entry = inner.cookies.get_mut(id).ok_or(CookieError::NotFound)?;
        if !cookie::is_valid(&value) {
            return Err(CookieError::Invalid);
        }
        entry.cookie = value;
        entry.updated_at = Utc::now();
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> Result<(), CookieError> {
        self.inner.write().await.cookies.remove(id).map(drop).ok_or(CookieError::NotFound)
    }

    pub async fn default_cookie(&self) -> String {
        self.inner.read().await.default.clone()
    }

    /// Not validated: an empty default means "connect anonymously".
    pub async fn set_default(&self, value: String) {
        self.inner.write().await.default = value;
    }

    /// Credential for a room connect: a known `cookie_id` wins, then the
    /// explicit cookie, then the default. `None` when all are empty.
    pub async fn resolve(&self, cookie: Option<&str>, cookie_id: Option<&str>) -> Option<String> {
        let inner = self.inner.read().await;
        cookie_id
            .and_then(|id| inner.cookies.get(id))
            .map(|e| e.cookie.clone())
            .or_else(|| cookie.filter(|c| !c.is_empty()).map(str::to_owned))
            .or_else(|| Some(inner.default.clone()).filter(|d| !d.is_empty()))
    }
}
