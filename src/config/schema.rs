use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration, usually read from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ── Gateway ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ── Session ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// HMAC key for session cookies. When unset, a random key is
    /// generated at startup and sessions do not survive a restart.
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Session lifetime (seconds).
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
    /// Adds the `Secure` attribute to the session cookie.
    #[serde(default)]
    pub secure_cookie: bool,
}

fn default_cookie_name() -> String {
    "gatehouse.sess".into()
}

fn default_session_ttl_secs() -> u64 {
    24 * 3600
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            cookie_name: default_cookie_name(),
            ttl_secs: default_session_ttl_secs(),
            secure_cookie: false,
        }
    }
}

// ── Storage ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Directory holding `users.db` and `messages.jsonl`.
    /// Defaults to `~/.gatehouse`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

// ── Auth ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_true")]
    pub allow_registration: bool,
    /// Whether `POST /register` honours `admin = true` in the body.
    #[serde(default = "default_true")]
    pub allow_admin_signup: bool,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

fn default_true() -> bool {
    true
}

fn default_bcrypt_cost() -> u32 {
    10
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allow_registration: true,
            allow_admin_signup: true,
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

// ── Capability gate ─────────────────────────────────────────────

/// Capability grants layered in front of the built-in admin rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Capabilities granted to every caller, logged in or not.
    #[serde(default = "default_anyone_capabilities")]
    pub anyone: Vec<String>,
    /// Capabilities granted to any authenticated session.
    #[serde(default)]
    pub authenticated: Vec<String>,
}

fn default_anyone_capabilities() -> Vec<String> {
    vec!["access messages".into()]
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            anyone: default_anyone_capabilities(),
            authenticated: Vec::new(),
        }
    }
}

// ── Logging ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}
