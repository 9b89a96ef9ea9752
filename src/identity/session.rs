//! Cookie sessions for the application sign-in scheme.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap};
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

const TOKEN_LEN: usize = 32;

/// Longest session lifetime; longer configured values are clamped.
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A signed-in session.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    /// Security stamp of the user at sign-in; a changed stamp ends the session.
    pub security_stamp: String,
    pub expires_at: Instant,
}

/// In-memory session table keyed by cookie token.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl: ttl.min(MAX_SESSION_TTL),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start a session and return its token. Expired sessions are purged first.
    pub fn sign_in(&self, user_id: Uuid, security_stamp: &str) -> String {
        let purged = self.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, remaining = self.sessions.len(), "Expired sessions purged");
        }
        let token = random_token(TOKEN_LEN);
        self.sessions.insert(
            token.clone(),
            Session {
                user_id,
                security_stamp: security_stamp.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        token
    }

    /// Live session for `token`; expired sessions are dropped.
    pub fn get(&self, token: &str) -> Option<Session> {
        let session = self.sessions.get(token)?.clone();
        if session.expires_at <= Instant::now() {
            self.sessions.remove(token);
            return None;
        }
        Some(session)
    }

    pub fn sign_out(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Remove every expired session. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.expires_at > now);
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Random alphanumeric token.
pub fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Read a cookie value from request headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value for an HTTP-only cookie on `/`.
pub fn set_cookie(name: &str, value: &str, max_age: Duration) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name,
        value,
        max_age.as_secs()
    )
}

/// `Set-Cookie` value that deletes a cookie.
pub fn clear_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_sign_in_and_out() {
        let store = SessionStore::new(Duration::from_secs(60));
        let user = Uuid::new_v4();
        let token = store.sign_in(user, "stamp");
        assert_eq!(token.len(), TOKEN_LEN);

        let session = store.get(&token).unwrap();
        assert_eq!(session.user_id, user);
        assert_eq!(session.security_stamp, "stamp");

        assert!(store.sign_out(&token));
        assert!(store.get(&token).is_none());
        assert!(!store.sign_out(&token));
    }

    #[test]
    fn test_expired_sessions_are_dropped() {
        let store = SessionStore::new(Duration::ZERO);
        let token = store.sign_in(Uuid::new_v4(), "stamp");
        store.sign_in(Uuid::new_v4(), "stamp");
        assert!(store.get(&token).is_none());
        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_sign_in_purges_abandoned_sessions() {
        let store = SessionStore::new(Duration::from_millis(20));
        for _ in 0..3 {
            store.sign_in(Uuid::new_v4(), "stamp");
        }
        assert_eq!(store.len(), 3);

        std::thread::sleep(Duration::from_millis(40));
        let live = store.sign_in(Uuid::new_v4(), "stamp");
        assert_eq!(store.len(), 1);
        assert!(store.get(&live).is_some());
    }

    #[test]
    fn test_huge_ttl_is_clamped() {
        let store = SessionStore::new(Duration::from_secs(u64::MAX));
        assert_eq!(store.ttl(), MAX_SESSION_TTL);
        let token = store.sign_in(Uuid::new_v4(), "stamp");
        assert!(store.get(&token).is_some());
    }

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1; .Identity.Application=tok"));
        headers.append(header::COOKIE, HeaderValue::from_static("b=2"));

        assert_eq!(read_cookie(&headers, ".Identity.Application").as_deref(), Some("tok"));
        assert_eq!(read_cookie(&headers, "b").as_deref(), Some("2"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_cookie_strings() {
        assert_eq!(
            set_cookie("x", "y", Duration::from_secs(5)),
            "x=y; Path=/; HttpOnly; SameSite=Lax; Max-Age=5"
        );
        assert!(clear_cookie("x").ends_with("Max-Age=0"));
    }
}
