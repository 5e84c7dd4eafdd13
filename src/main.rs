//! gatehouse CLI
//!
//! # Configuration
//!
//! Loaded from `--config <path>` or `~/.gatehouse/config.toml`, then
//! overridden by the environment:
//!
//! - `PORT`, `HOST`: listen address
//! - `SECRET_KEY`: session signing secret (random per process when unset)
//! - `GATEHOUSE_DATA_DIR`: where `users.db` and `messages.jsonl` live
//! - `GATEHOUSE_LOG`: `tracing` filter directive (falls back to `RUST_LOG`)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gatehouse::auth::{AuthService, CredentialStore, PasswordHasher};
use gatehouse::config::Config;
use gatehouse::messages::MessageLog;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Accounts, sessions and a gated message log over HTTP
#[derive(Parser, Debug)]
#[command(name = "gatehouse")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Override the listen address
        #[arg(long)]
        host: Option<String>,
        /// Override the listen port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Create an account from the command line
    AddUser {
        username: String,
        /// Display name (defaults to the username)
        #[arg(long)]
        name: Option<String>,
        /// Grant the admin role
        #[arg(long)]
        admin: bool,
        /// Password; prompted for when absent
        #[arg(long, env = "GATEHOUSE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Print message log statistics as JSON
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    init_tracing(&config);

    let command = cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    });
    match command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            gatehouse::gateway::run_gateway(config).await
        }
        Command::AddUser {
            username,
            name,
            admin,
            password,
        } => add_user(&config, &username, name.as_deref(), admin, password).await,
        Command::Stats => print_stats(&config).await,
    }
}

fn init_tracing(config: &Config) {
    // GATEHOUSE_LOG is already folded into the config; RUST_LOG only applies without it.
    let from_rust_log = std::env::var_os("GATEHOUSE_LOG")
        .is_none()
        .then(|| EnvFilter::try_from_default_env().ok())
        .flatten();
    let filter = from_rust_log
        .or_else(|| EnvFilter::try_new(&config.logging.filter).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

async fn add_user(
    config: &Config,
    username: &str,
    name: Option<&str>,
    admin: bool,
    password: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => dialoguer::Password::new()
            .with_prompt(format!("Password for {username}"))
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()
            .context("Failed to read password")?,
    };
    if username.trim().is_empty() || password.is_empty() {
        bail!("Username and password must not be empty");
    }

    let db_path = config.users_db_path()?;
    let store = CredentialStore::open(&db_path)
        .with_context(|| format!("Failed to open credential store: {}", db_path.display()))?;
    let auth = AuthService::new(Arc::new(store), PasswordHasher::new(config.auth.bcrypt_cost));

    let account = auth.register(username, name, &password, admin).await?;
    println!("Registered {} as {}", account.username, account.role());
    Ok(())
}

async fn print_stats(config: &Config) -> Result<()> {
    let path = config.messages_path()?;
    let log = MessageLog::open(&path)
        .await
        .with_context(|| format!("Failed to open message log: {}", path.display()))?;
    let stats = log.stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
