//! Session & capability gate.
//!
//! Per-client state machine: Anonymous → (login/register) → Authenticated
//! → (logout or expiry) → Anonymous. The gate reads the signed session
//! cookie, evaluates the capability policy and produces the cookie
//! mutations for login and logout. Rendering a denial is left to the
//! gateway.

pub mod policy;
pub mod session;

pub use policy::{CapabilityPolicy, CapabilityRule, Denial, ACCESS_MESSAGES, ADMIN};
pub use session::{Session, SessionCodec};

use axum::http::HeaderMap;

/// Session decoding plus policy evaluation in one place.
#[derive(Debug, Clone)]
pub struct Gate {
    codec: SessionCodec,
    policy: CapabilityPolicy,
}

impl Gate {
    pub fn new(codec: SessionCodec, policy: CapabilityPolicy) -> Self {
        Self { codec, policy }
    }

    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    /// Current session, or `None` for anonymous callers.
    pub fn session(&self, headers: &HeaderMap) -> Option<Session> {
        self.codec.from_headers(headers)
    }

    /// Check `capability` for the caller behind `headers`.
    pub fn authorize(
        &self,
        headers: &HeaderMap,
        capability: &str,
    ) -> Result<Option<Session>, Denial> {
        let session = self.session(headers);
        self.policy.check(session.as_ref(), capability)?;
        Ok(session)
    }
}
