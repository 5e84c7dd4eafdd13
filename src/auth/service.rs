use super::{Account, AuthError, CredentialStore, PasswordHasher};
use chrono::{SubsecRound, Utc};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Plaintext behind the timing-equalization hash used for unknown users.
const DUMMY_PASSWORD: &str = "gatehouse-timing-guard";

/// Registration and login on top of the credential store.
pub struct AuthService {
    store: Arc<CredentialStore>,
    hasher: PasswordHasher,
    dummy_hash: OnceCell<String>,
}

impl AuthService {
    pub fn new(store: Arc<CredentialStore>, hasher: PasswordHasher) -> Self {
        Self {
            store,
            hasher,
            dummy_hash: OnceCell::new(),
        }
    }

    /// Create an account unless `username` is taken.
    ///
    /// The caller has already checked that username and password are present.
    pub async fn register(
        &self,
        username: &str,
        display_name: Option<&str>,
        password: &str,
        is_admin: bool,
    ) -> Result<Account, AuthError> {
        if self.store.has(username)? {
            return Err(AuthError::AlreadyExists(username.to_owned()));
        }

        let password_hash = self.hasher.hash(password).await?;
        let account = Account {
            username: username.to_owned(),
            display_name: display_name.unwrap_or_default().to_owned(),
            password_hash,
            is_admin,
            // Stored at millisecond precision.
            created_at: Utc::now().trunc_subsecs(3),
        };

        // A concurrent registration may have won while we were hashing;
        // `create` reports that as AlreadyExists.
        self.store.create(&account)?;
        tracing::info!(
            username = %account.username,
            role = account.role(),
            "Account registered"
        );
        Ok(account)
    }

    /// Verify credentials.
    ///
    /// Unknown user, empty password and wrong password all fail with
    /// [`AuthError::AuthenticationFailed`].
    pub async fn login(&self, username: &str, password: &str) -> Result<Account, AuthError> {
        let account = self.store.get(username)?;

        let Some(account) = account else {
            // Perform dummy verification to prevent timing side-channel
            let dummy = self
                .dummy_hash
                .get_or_try_init(|| self.hasher.hash(DUMMY_PASSWORD))
                .await?;
            let _ = self.hasher.verify(password, dummy).await;
            tracing::warn!(username, "Authentication failed");
            return Err(AuthError::AuthenticationFailed);
        };

        if password.is_empty() || !self.hasher.verify(password, &account.password_hash).await {
            tracing::warn!(username, "Authentication failed");
            return Err(AuthError::AuthenticationFailed);
        }

        tracing::info!(username, "User authenticated");
        Ok(account)
    }
}
