//! bcrypt password hashing.
//!
//! Hashing is CPU-bound, so both operations hop onto tokio's blocking pool
//! and never run on a connection-handling worker.

use super::AuthError;

/// Salted one-way password hasher with a fixed work factor.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    /// Work factor used when none is configured.
    pub const DEFAULT_COST: u32 = 10;

    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash `plaintext` with a fresh random salt.
    pub async fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let cost = self.cost;
        let plaintext = plaintext.to_owned();
        tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Check `plaintext` against a stored hash.
    ///
    /// A malformed hash verifies as `false`.
    pub async fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let plaintext = plaintext.to_owned();
        let hash = hash.to_owned();
        match tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hash)).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                tracing::warn!("Stored password hash is unreadable: {e}");
                false
            }
            Err(e) => {
                tracing::error!("Password verification task failed: {e}");
                false
            }
        }
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimum bcrypt cost keeps the tests fast.
    fn hasher() -> PasswordHasher {
        PasswordHasher::new(4)
    }

    #[tokio::test]
    async fn hash_then_verify() {
        let h = hasher();
        let hash = h.hash("correct horse").await.unwrap();
        assert_ne!(hash, "correct horse");
        assert!(h.verify("correct horse", &hash).await);
        assert!(!h.verify("wrong horse", &hash).await);
    }

    #[tokio::test]
    async fn same_password_gets_distinct_salts() {
        let h = hasher();
        let a = h.hash("pw").await.unwrap();
        let b = h.hash("pw").await.unwrap();
        assert_ne!(a, b);
        assert!(h.verify("pw", &a).await);
        assert!(h.verify("pw", &b).await);
    }

    #[tokio::test]
    async fn hash_encodes_work_factor() {
        let hash = hasher().hash("pw").await.unwrap();
        assert!(hash.starts_with("$2b$04$"), "unexpected hash prefix: {hash}");
    }

    #[tokio::test]
    async fn malformed_hash_verifies_false() {
        assert!(!hasher().verify("pw", "not-a-bcrypt-hash").await);
    }

    #[test]
    fn default_cost_is_ten() {
        assert_eq!(PasswordHasher::default().cost, 10);
    }
}
