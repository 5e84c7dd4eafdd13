//! Client-held signed sessions.
//!
//! Cookie value: `base64url(json(Session)) "." base64url(HMAC-SHA256(payload))`.
//! The signing key is resolved once at startup and held for the process
//! lifetime.

use crate::auth::Account;
use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Identity snapshot carried by the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub is_authenticated: bool,
    pub username: Option<String>,
    pub is_admin: bool,
    pub display_name: Option<String>,
    /// Unix seconds.
    pub issued_at: u64,
    /// Unix seconds; the session is void at or after this instant.
    pub expires_at: u64,
}

impl Session {
    /// Snapshot `account` into a fresh session valid for `ttl_secs`.
    pub fn for_account(account: &Account, ttl_secs: u64) -> Self {
        let now = epoch_secs();
        Self {
            is_authenticated: true,
            username: Some(account.username.clone()),
            is_admin: account.is_admin,
            display_name: Some(account.display_name.clone()),
            issued_at: now,
            expires_at: now.saturating_add(ttl_secs),
        }
    }

    pub fn role(&self) -> &'static str {
        if self.is_admin {
            "admin"
        } else {
            "user"
        }
    }

    /// Name to greet the user with: display name, else username.
    pub fn greeting_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or(self.username.as_deref())
            .unwrap_or("")
    }

    fn is_well_formed(&self) -> bool {
        self.is_authenticated && self.username.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// Signs, verifies and (de)serializes session cookies.
#[derive(Clone)]
pub struct SessionCodec {
    key: Arc<[u8]>,
    cookie_name: Arc<str>,
    ttl_secs: u64,
    secure: bool,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec")
            .field("cookie_name", &self.cookie_name)
            .field("ttl_secs", &self.ttl_secs)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl SessionCodec {
    pub fn new(key: &[u8], cookie_name: &str, ttl_secs: u64, secure: bool) -> Self {
        Self {
            key: Arc::from(key),
            cookie_name: Arc::from(cookie_name),
            ttl_secs,
            secure,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Start a session for a freshly authenticated account.
    pub fn issue(&self, account: &Account) -> Session {
        Session::for_account(account, self.ttl_secs)
    }

    /// Serialize and sign.
    pub fn encode(&self, session: &Session) -> String {
        // Serializing a struct of plain fields cannot fail.
        let json = serde_json::to_vec(session).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes()));
        format!("{payload}.{signature}")
    }

    /// Verify and deserialize. Returns `None` for tampered, malformed or
    /// expired values.
    pub fn decode(&self, value: &str) -> Option<Session> {
        let (payload, signature) = value.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            tracing::debug!("Rejected session cookie with bad signature");
            return None;
        }

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let session: Session = serde_json::from_slice(&json).ok()?;
        if !session.is_well_formed() {
            return None;
        }
        if session.expires_at <= epoch_secs() {
            tracing::debug!(username = ?session.username, "Session expired");
            return None;
        }
        Some(session)
    }

    /// Current session from the request's `Cookie` headers, if any.
    pub fn from_headers(&self, headers: &HeaderMap) -> Option<Session> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == &*self.cookie_name)
            .and_then(|(_, value)| self.decode(value))
    }

    /// `Set-Cookie` value storing `session`.
    pub fn set_cookie(&self, session: &Session) -> String {
        let max_age = session.expires_at.saturating_sub(epoch_secs());
        self.cookie(&self.encode(session), max_age)
    }

    /// `Set-Cookie` value that drops the session.
    pub fn clear_cookie(&self) -> String {
        self.cookie("", 0)
    }

    fn cookie(&self, value: &str, max_age: u64) -> String {
        let mut cookie = format!(
            "{}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}",
            self.cookie_name
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        <HmacSha256 as Mac>::new_from_slice(&self.key).unwrap_or_else(|_| unreachable!())
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;

    fn account(is_admin: bool) -> Account {
        Account {
            username: "alice".into(),
            display_name: "Alice".into(),
            password_hash: String::new(),
            is_admin,
            created_at: Utc::now(),
        }
    }

    fn codec() -> SessionCodec {
        SessionCodec::new(b"test-secret", "gatehouse.sess", 3600, false)
    }

    #[test]
    fn encode_then_decode() {
        let codec = codec();
        let session = codec.issue(&account(true));
        let decoded = codec.decode(&codec.encode(&session)).unwrap();
        assert_eq!(decoded, session);
        assert!(decoded.is_admin);
        assert_eq!(decoded.role(), "admin");
        assert_eq!(decoded.greeting_name(), "Alice");
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let codec = codec();
        let token = codec.encode(&codec.issue(&account(false)));
        let (_, signature) = token.split_once('.').unwrap();

        let mut forged = codec.issue(&account(false));
        forged.is_admin = true;
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());

        assert!(codec.decode(&format!("{forged_payload}.{signature}")).is_none());
    }

    #[test]
    fn other_key_is_rejected() {
        let token = codec().encode(&codec().issue(&account(false)));
        let other = SessionCodec::new(b"another-secret", "gatehouse.sess", 3600, false);
        assert!(other.decode(&token).is_none());
    }

    #[test]
    fn expired_session_is_rejected() {
        let codec = codec();
        let mut session = codec.issue(&account(false));
        session.expires_at = session.issued_at.saturating_sub(1);
        assert!(codec.decode(&codec.encode(&session)).is_none());
    }

    #[test]
    fn anonymous_shape_is_rejected() {
        let codec = codec();
        let mut session = codec.issue(&account(false));
        session.is_authenticated = false;
        assert!(codec.decode(&codec.encode(&session)).is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        let codec = codec();
        assert!(codec.decode("").is_none());
        assert!(codec.decode("no-dot").is_none());
        assert!(codec.decode("!!!.???").is_none());
    }

    #[test]
    fn reads_session_among_other_cookies() {
        let codec = codec();
        let session = codec.issue(&account(false));
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!(
                "theme=dark; gatehouse.sess={}; lang=en",
                codec.encode(&session)
            ))
            .unwrap(),
        );
        assert_eq!(codec.from_headers(&headers), Some(session));
    }

    #[test]
    fn missing_cookie_is_anonymous() {
        assert!(codec().from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn greeting_falls_back_to_username() {
        let mut acct = account(false);
        acct.display_name.clear();
        assert_eq!(codec().issue(&acct).greeting_name(), "alice");
    }

    #[test]
    fn cookie_attributes() {
        let codec = SessionCodec::new(b"k", "sid", 60, true);
        let set = codec.set_cookie(&codec.issue(&account(false)));
        assert!(set.starts_with("sid="));
        assert!(set.contains("HttpOnly"));
        assert!(set.contains("Secure"));

        let clear = codec.clear_cookie();
        assert!(clear.starts_with("sid=;"));
        assert!(clear.contains("Max-Age=0"));
    }
}
