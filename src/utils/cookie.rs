//! Cookie string helpers: `k1=v1; k2=v2` → key/value pairs.
use std::collections::HashMap;

pub const CSRF_KEY:    &str = "bili_jct";
pub const SESSION_KEY: &str = "SESSDATA";
pub const UID_KEY:     &str = "DedeUserID";
pub const BUVID_KEY:   &str = "buvid3";

/// Split on `;` then `=`, trimming both sides.
///
/// Empty segments are skipped, and a segment only counts when it has
/// exactly one non-empty key and one non-empty value.
pub fn split(cookie: &str) -> Vec<(&str, &str)> {
    cookie
        .split(';')
        .filter_map(|part| {
            let mut kv = part.split('=').map(str::trim).filter(|s| !s.is_empty());
            match (kv.next(), kv.next(), kv.next()) {
                (Some(k), Some(v), None) => Some((k, v)),
                _ => None,
            }
        })
        .collect()
}

pub fn fields(cookie: &str) -> HashMap<&str, &str> {
    split(cookie).into_iter().collect()
}

/// Whether the cookie carries the CSRF token and the session token.
pub fn has_required(cookie: &str) -> (bool, bool) {
    let f = fields(cookie);
    (f.contains_key(CSRF_KEY), f.contains_key(SESSION_KEY))
}

pub fn is_valid(cookie: &str) -> bool {
    matches!(has_required(cookie), (true, true))
}

/* ------------ posting credentials ------------ */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verify {
    pub csrf:      String,
    pub sess_data: String,
}

impl Verify {
    pub fn from_cookie(cookie: &str) -> Option<Self> {
        let f = fields(cookie);
        Some(Self {
            csrf:      f.get(CSRF_KEY)?.to_string(),
            sess_data: f.get(SESSION_KEY)?.to_string(),
        })
    }
}
