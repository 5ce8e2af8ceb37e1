//! Session-scoped cookie jar storage.
//!
//! # Responsibilities
//! - Identify the caller's session from an inbound cookie
//! - Mint a session id when a cookie-storing route has none yet
//! - Hold one cookie jar per session across requests
//!
//! # Design Decisions
//! - In-memory only; jars are lost on restart
//! - One jar per session, shared by every route that stores cookies
//! - Only ids this store issued are honoured; an unknown or expired id is
//!   treated as no session and a fresh one is minted
//! - The store is bounded: idle jars expire after `idle_timeout_secs` and
//!   at `max_sessions` the least recently used jar is evicted
//! - The store collapses repeated cookie names when saving (latest wins),
//!   so a long-lived session does not grow without bound

use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::proxy::forwarder::cookie_pair;
use crate::proxy::CookieJar;

/// Extract the session id from inbound `Cookie` header values.
pub fn session_id<'a, I>(cookie_headers: I, cookie_name: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    cookie_headers
        .into_iter()
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim() == cookie_name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Fresh random session id.
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// `Set-Cookie` value that hands a session id to the client.
pub fn session_cookie(config: &SessionConfig, id: &str) -> String {
    format!("{}={}; Path={}; HttpOnly; SameSite=Lax", config.cookie_name, id, config.cookie_path)
}

/// Keep only the last entry for each cookie name, preserving order of last
/// appearance. Unparseable entries are kept as-is.
fn compact(jar: CookieJar) -> CookieJar {
    let entries = jar.into_inner();
    let name_of = |entry: &str| {
        cookie_pair(entry).map(|pair| pair.split('=').next().unwrap_or_default().trim().to_string())
    };

    let mut kept: Vec<String> = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let superseded = match name_of(entry) {
            Some(name) => entries[idx + 1..]
                .iter()
                .any(|later| name_of(later).as_deref() == Some(name.as_str())),
            None => false,
        };
        if !superseded {
            kept.push(entry.clone());
        }
    }
    CookieJar::from(kept)
}

#[derive(Debug, Clone)]
struct Session {
    jar: CookieJar,
    last_seen: Instant,
}

/// Concurrent map of session id → cookie jar, bounded in size and idle time.
#[derive(Debug)]
pub struct CookieStore {
    jars: DashMap<String, Session>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl CookieStore {
    pub fn new(max_sessions: usize, idle_timeout: Duration) -> Self {
        Self {
            jars: DashMap::new(),
            max_sessions: max_sessions.max(1),
            idle_timeout,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.max_sessions, Duration::from_secs(config.idle_timeout_secs))
    }

    /// The live jar for `id`, refreshing its idle timer. `None` when the id
    /// is unknown or has expired.
    pub fn load(&self, id: &str) -> Option<CookieJar> {
        {
            let mut session = self.jars.get_mut(id)?;
            if session.last_seen.elapsed() <= self.idle_timeout {
                session.last_seen = Instant::now();
                return Some(session.jar.clone());
            }
        }
        let ttl = self.idle_timeout;
        self.jars.remove_if(id, |_, s| s.last_seen.elapsed() > ttl);
        None
    }

    /// Replace the jar for `id`, evicting old sessions first if a new one
    /// would exceed the capacity.
    pub fn save(&self, id: &str, jar: CookieJar) {
        let jar = compact(jar);
        if !self.jars.contains_key(id) {
            self.make_room();
        }
        tracing::debug!(session = %id, cookies = jar.len(), "Stored session cookie jar");
        self.jars.insert(
            id.to_string(),
            Session {
                jar,
                last_seen: Instant::now(),
            },
        );
    }

    /// Drop every jar idle for longer than the timeout.
    pub fn purge_expired(&self) {
        let ttl = self.idle_timeout;
        self.jars.retain(|_, s| s.last_seen.elapsed() <= ttl);
    }

    fn make_room(&self) {
        if self.jars.len() < self.max_sessions {
            return;
        }
        self.purge_expired();
        while self.jars.len() >= self.max_sessions {
            let oldest = self
                .jars
                .iter()
                .min_by_key(|entry| entry.value().last_seen)
                .map(|entry| entry.key().clone());
            let Some(id) = oldest else { break };
            self.jars.remove(&id);
            tracing::debug!(session = %id, "Evicted least recently used session");
        }
    }

    pub fn sessions(&self) -> usize {
        self.jars.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jar(items: &[&str]) -> CookieJar {
        CookieJar::from(items.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn test_session_id_from_cookie_headers() {
        let headers = ["theme=dark; fwd_session=abc123", "other=1"];
        assert_eq!(session_id(headers, "fwd_session").as_deref(), Some("abc123"));
        assert_eq!(session_id(["fwd_session="], "fwd_session"), None);
        assert_eq!(session_id(["x_fwd_session=1"], "fwd_session"), None);
        assert_eq!(session_id(Vec::<&str>::new(), "fwd_session"), None);
    }

    #[test]
    fn test_new_session_ids_are_unique() {
        assert_ne!(new_session_id(), new_session_id());
        assert_eq!(new_session_id().len(), 32);
    }

    #[test]
    fn test_session_cookie() {
        let cookie = session_cookie(&SessionConfig::default(), "abc");
        assert_eq!(cookie, "fwd_session=abc; Path=/; HttpOnly; SameSite=Lax");
    }

    #[test]
    fn test_store_roundtrip_and_compaction() {
        let store = CookieStore::from_config(&SessionConfig::default());
        assert!(store.load("s1").is_none());

        store.save(
            "s1",
            jar(&[
                "Set-Cookie: a=1; Path=/",
                "Set-Cookie: b=1",
                "garbage",
                "Set-Cookie: a=2; Path=/",
            ]),
        );
        assert_eq!(
            store.load("s1"),
            Some(jar(&["Set-Cookie: b=1", "garbage", "Set-Cookie: a=2; Path=/"]))
        );
        assert!(store.load("s2").is_none());
        assert_eq!(store.sessions(), 1);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let store = CookieStore::new(3, Duration::from_secs(60));
        for id in ["a", "b", "c"] {
            store.save(id, jar(&["Set-Cookie: x=1"]));
            std::thread::sleep(Duration::from_millis(2));
        }
        // Touching "a" makes "b" the oldest.
        assert!(store.load("a").is_some());
        store.save("d", jar(&["Set-Cookie: x=2"]));

        assert_eq!(store.sessions(), 3);
        assert!(store.load("b").is_none());
        assert!(store.load("a").is_some());
        assert!(store.load("d").is_some());

        for n in 0..500 {
            store.save(&format!("s{}", n), CookieJar::new());
        }
        assert_eq!(store.sessions(), 3);
    }

    #[test]
    fn test_resaving_known_session_does_not_evict() {
        let store = CookieStore::new(2, Duration::from_secs(60));
        store.save("a", CookieJar::new());
        store.save("b", CookieJar::new());
        store.save("a", jar(&["Set-Cookie: x=1"]));
        assert_eq!(store.sessions(), 2);
        assert!(store.load("b").is_some());
    }

    #[test]
    fn test_idle_sessions_expire() {
        let store = CookieStore::new(10, Duration::from_millis(20));
        store.save("old", jar(&["Set-Cookie: x=1"]));
        std::thread::sleep(Duration::from_millis(40));
        store.save("new", CookieJar::new());

        assert!(store.load("old").is_none());
        assert_eq!(store.sessions(), 1);

        std::thread::sleep(Duration::from_millis(40));
        store.purge_expired();
        assert_eq!(store.sessions(), 0);
    }
}
