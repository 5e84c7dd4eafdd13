//! Service configuration.
//!
//! Load order, each layer overriding the previous:
//! 1. Compiled defaults
//! 2. TOML file (`--config <path>`, else `<data_dir>/config.toml` when present)
//! 3. Environment (`PORT`, `HOST`, `SECRET_KEY`, `GATEHOUSE_DATA_DIR`, `GATEHOUSE_LOG`)

pub mod schema;

pub use schema::{
    AuthConfig, Config, GateConfig, GatewayConfig, LoggingConfig, SessionConfig, StorageConfig,
};

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Name of the per-user state directory under `$HOME`.
const DATA_DIR_NAME: &str = ".gatehouse";

/// Signing secret length when none is configured.
const GENERATED_SECRET_BYTES: usize = 32;

impl Config {
    /// Load configuration from `path` (or the default location) and apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with an injectable environment lookup.
    pub fn load_with_env<F>(path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let fallback = env("GATEHOUSE_DATA_DIR")
                    .map(PathBuf::from)
                    .or_else(default_data_dir)
                    .map(|dir| dir.join("config.toml"));
                match fallback {
                    Some(p) if p.is_file() => Self::from_file(&p)?,
                    _ => Self::default(),
                }
            }
        };

        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            env(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(port) = non_empty("PORT") {
            self.gateway.port = port
                .parse()
                .with_context(|| format!("PORT must be a port number, got '{port}'"))?;
        }
        if let Some(host) = non_empty("HOST") {
            self.gateway.host = host;
        }
        if let Some(secret) = non_empty("SECRET_KEY") {
            self.session.secret_key = Some(secret);
        }
        if let Some(dir) = non_empty("GATEHOUSE_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(filter) = non_empty("GATEHOUSE_LOG") {
            self.logging.filter = filter;
        }
        Ok(())
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            bail!(
                "auth.bcrypt_cost must be between 4 and 31, got {}",
                self.auth.bcrypt_cost
            );
        }
        if self.session.cookie_name.trim().is_empty() {
            bail!("session.cookie_name cannot be empty");
        }
        if self.session.ttl_secs == 0 {
            bail!("session.ttl_secs must be greater than zero");
        }
        Ok(())
    }

    /// Directory holding persisted state.
    pub fn data_dir(&self) -> Result<PathBuf> {
        self.storage
            .data_dir
            .clone()
            .or_else(default_data_dir)
            .ok_or_else(|| anyhow::anyhow!("Could not find home directory; set storage.data_dir"))
    }

    pub fn users_db_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("users.db"))
    }

    pub fn messages_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("messages.jsonl"))
    }

    /// Resolve the session signing secret once at startup.
    ///
    /// Returns the key bytes and whether it was generated for this process.
    pub fn signing_secret(&self) -> (Vec<u8>, bool) {
        match self.session.secret_key.as_deref().map(str::trim) {
            Some(secret) if !secret.is_empty() => (secret.as_bytes().to_vec(), false),
            _ => {
                let bytes: [u8; GENERATED_SECRET_BYTES] = rand::random();
                (bytes.to_vec(), true)
            }
        }
    }
}

fn default_data_dir() -> Option<PathBuf> {
    directories::UserDirs::new().map(|u| u.home_dir().join(DATA_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.auth.bcrypt_cost, 10);
        assert_eq!(config.gate.anyone, vec!["access messages".to_string()]);
        assert!(config.gate.authenticated.is_empty());
    }

    #[test]
    fn file_values_are_loaded() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[gateway]
port = 8088

[session]
secret_key = "from-file"
ttl_secs = 60

[gate]
anyone = []
authenticated = ["access messages"]
"#,
        )
        .unwrap();

        let config = Config::load_with_env(Some(&path), env_from(&[])).unwrap();
        assert_eq!(config.gateway.port, 8088);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.session.secret_key.as_deref(), Some("from-file"));
        assert_eq!(config.session.ttl_secs, 60);
        assert!(config.gate.anyone.is_empty());
        assert_eq!(config.gate.authenticated, vec!["access messages".to_string()]);
    }

    #[test]
    fn env_overrides_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[gateway]\nport = 8088\n").unwrap();

        let config = Config::load_with_env(
            Some(&path),
            env_from(&[("PORT", "9000"), ("SECRET_KEY", "s3cret"), ("GATEHOUSE_LOG", "debug")]),
        )
        .unwrap();
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.session.secret_key.as_deref(), Some("s3cret"));
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn invalid_port_env_is_rejected() {
        let env = env_from(&[
            ("PORT", "not-a-port"),
            ("GATEHOUSE_DATA_DIR", "/nonexistent-gatehouse"),
        ]);
        let err = Config::load_with_env(None, env).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn out_of_range_bcrypt_cost_is_rejected() {
        let mut config = Config::default();
        config.auth.bcrypt_cost = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn data_dir_from_env_locates_stores() {
        let config = Config::load_with_env(
            None,
            env_from(&[("GATEHOUSE_DATA_DIR", "/nonexistent-gatehouse")]),
        )
        .unwrap();
        assert_eq!(
            config.users_db_path().unwrap(),
            PathBuf::from("/nonexistent-gatehouse/users.db")
        );
        assert_eq!(
            config.messages_path().unwrap(),
            PathBuf::from("/nonexistent-gatehouse/messages.jsonl")
        );
    }

    #[test]
    fn signing_secret_prefers_configured_key() {
        let mut config = Config::default();
        config.session.secret_key = Some("fixed".into());
        let (key, generated) = config.signing_secret();
        assert_eq!(key, b"fixed".to_vec());
        assert!(!generated);

        config.session.secret_key = None;
        let (a, generated) = config.signing_secret();
        let (b, _) = config.signing_secret();
        assert!(generated);
        assert_eq!(a.len(), GENERATED_SECRET_BYTES);
        assert_ne!(a, b);
    }
}
