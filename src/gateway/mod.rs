//! Axum-based HTTP gateway.
//!
//! - Request body size limit (64KB) and request timeout (30s)
//! - JSON or URL-encoded bodies on every POST route
//! - Signed session cookie read by the capability gate on protected routes

pub mod extract;
pub mod render;

use crate::auth::{AuthError, AuthService, CredentialStore, PasswordHasher};
use crate::config::Config;
use crate::gate::{CapabilityPolicy, Gate, SessionCodec, ACCESS_MESSAGES, ADMIN};
use crate::messages::{MessageLog, MessageRecord};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use extract::{lenient_bool, present, Payload};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub gate: Arc<Gate>,
    pub messages: Arc<MessageLog>,
    /// Whether `POST /register` is open.
    pub allow_registration: bool,
    /// Whether `POST /register` may create admin accounts.
    pub allow_admin_signup: bool,
}

impl AppState {
    /// Open both stores and resolve the signing secret.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let users_db = config.users_db_path()?;
        let store = CredentialStore::open(&users_db)
            .with_context(|| format!("Failed to open credential store: {}", users_db.display()))?;
        tracing::info!(
            path = %users_db.display(),
            accounts = store.count().unwrap_or_default(),
            "Credential store initialized"
        );

        let messages_path = config.messages_path()?;
        let messages = MessageLog::open(&messages_path)
            .await
            .with_context(|| format!("Failed to open message log: {}", messages_path.display()))?;
        tracing::info!(path = %messages_path.display(), "Message log initialized");

        let (secret, generated) = config.signing_secret();
        if generated {
            tracing::warn!(
                "No session secret configured (SECRET_KEY); using a random key, sessions end on restart"
            );
        }

        let codec = SessionCodec::new(
            &secret,
            &config.session.cookie_name,
            config.session.ttl_secs,
            config.session.secure_cookie,
        );
        let policy = CapabilityPolicy::from_config(&config.gate);
        tracing::debug!(rules = ?policy.rules(), "Capability policy loaded");

        Ok(Self {
            auth: Arc::new(AuthService::new(
                Arc::new(store),
                PasswordHasher::new(config.auth.bcrypt_cost),
            )),
            gate: Arc::new(Gate::new(codec, policy)),
            messages: Arc::new(messages),
            allow_registration: config.auth.allow_registration,
            allow_admin_signup: config.auth.allow_admin_signup,
        })
    }
}

/// Build the router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/register", post(handle_register))
        .route("/login", post(handle_login))
        .route("/logout", get(handle_logout))
        .route("/secret", get(handle_secret))
        .route("/messages", post(handle_messages))
        .route("/stats", get(handle_stats))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Run the HTTP gateway until Ctrl+C.
pub async fn run_gateway(config: Config) -> Result<()> {
    let host = config.gateway.host.clone();
    let port = config.gateway.port;
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?;

    let state = AppState::from_config(&config).await?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let actual = listener.local_addr()?;

    tracing::info!("Server listening on port: {}", actual.port());
    println!("gatehouse listening on http://{actual}");
    println!("  POST /register  create an account {{username, password, name?, admin?}}");
    println!("  POST /login     start a session");
    println!("  GET  /logout    end the session");
    println!("  GET  /secret    logged-in users only");
    println!("  POST /messages  {{from, to, message}} (\"access messages\")");
    println!("  GET  /stats     message log stats (\"admin\")");
    println!("  Press Ctrl+C to stop.\n");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /: public banner
async fn handle_index() -> &'static str {
    "gatehouse: POST /register, POST /login, GET /logout, GET /secret, POST /messages, GET /stats\n"
}

/// GET /health: always public
async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

// ── Accounts & sessions ─────────────────────────────────────────────

/// Request body for registration.
#[derive(Debug, Deserialize)]
struct RegisterBody {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    /// Display name.
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    admin: bool,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
struct LoginBody {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

const MISSING_CREDENTIALS: &str = "Missing Username or Password";
const LOGIN_REJECTED: &str = "Nope. Not allowed, mate.";

fn text(status: StatusCode, body: impl Into<String>) -> Response {
    (status, body.into()).into_response()
}

fn redirect_with_cookie(location: &'static str, cookie: String) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string()), (header::SET_COOKIE, cookie)],
    )
        .into_response()
}

/// POST /register: create an account and start a session for it.
async fn handle_register(
    State(state): State<AppState>,
    body: Result<Payload<RegisterBody>, Response>,
) -> Response {
    let Ok(Payload(body)) = body else {
        return text(StatusCode::BAD_REQUEST, MISSING_CREDENTIALS);
    };
    let (Some(username), Some(password)) = (present(body.username), present(body.password)) else {
        return text(StatusCode::BAD_REQUEST, MISSING_CREDENTIALS);
    };

    if !state.allow_registration {
        return text(StatusCode::FORBIDDEN, AuthError::RegistrationDisabled.to_string());
    }
    if body.admin && !state.allow_admin_signup {
        tracing::warn!(username = %username, "Rejected self-service admin registration");
        return text(StatusCode::FORBIDDEN, "Admin registration is disabled");
    }

    match state
        .auth
        .register(&username, body.name.as_deref(), &password, body.admin)
        .await
    {
        Ok(account) => {
            let codec = state.gate.codec();
            let session = codec.issue(&account);
            (
                StatusCode::OK,
                [(header::SET_COOKIE, codec.set_cookie(&session))],
                format!("Registered {} as {}", account.username, account.role()),
            )
                .into_response()
        }
        Err(e @ AuthError::AlreadyExists(_)) => {
            tracing::info!(username = %username, "Registration rejected: username taken");
            text(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            tracing::error!(username = %username, "Registration failed: {e}");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Registration failed")
        }
    }
}

/// POST /login: verify credentials and start a session.
async fn handle_login(
    State(state): State<AppState>,
    body: Result<Payload<LoginBody>, Response>,
) -> Response {
    let Ok(Payload(body)) = body else {
        return text(StatusCode::BAD_REQUEST, MISSING_CREDENTIALS);
    };
    let (Some(username), Some(password)) = (present(body.username), present(body.password)) else {
        return text(StatusCode::BAD_REQUEST, MISSING_CREDENTIALS);
    };

    match state.auth.login(&username, &password).await {
        Ok(account) => {
            let codec = state.gate.codec();
            let session = codec.issue(&account);
            redirect_with_cookie("/secret", codec.set_cookie(&session))
        }
        Err(AuthError::AuthenticationFailed) => text(StatusCode::FORBIDDEN, LOGIN_REJECTED),
        Err(e) => {
            tracing::error!(username = %username, "Login failed: {e}");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Login failed")
        }
    }
}

/// GET /logout: drop the session.
async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(session) = state.gate.session(&headers) {
        tracing::info!(username = ?session.username, "User logged out");
    }
    redirect_with_cookie("/", state.gate.codec().clear_cookie())
}

/// GET /secret: any authenticated session.
async fn handle_secret(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match state.gate.session(&headers) {
        Some(session) => text(
            StatusCode::OK,
            format!(
                "Welcome {}! You are logged in as {}.",
                session.greeting_name(),
                session.role()
            ),
        ),
        None => text(StatusCode::FORBIDDEN, "Unauthorized to view this page"),
    }
}

// ── Message log ─────────────────────────────────────────────────────

/// Request body for message submission.
#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// `data` payload of `GET /stats`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsData {
    number_of_calls: u64,
    last_message: Option<MessageRecord>,
}

fn code_reply(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

/// POST /messages: append to the message log ("access messages").
async fn handle_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Payload<MessageBody>, Response>,
) -> Response {
    if let Err(denial) = state.gate.authorize(&headers, ACCESS_MESSAGES) {
        return render::denial(&headers, &denial);
    }

    let record = match body {
        Ok(Payload(MessageBody {
            from: Some(from),
            to: Some(to),
            message: Some(message),
        })) => MessageRecord { from, to, message },
        _ => {
            return code_reply(
                StatusCode::BAD_REQUEST,
                serde_json::json!({"code": -1, "msg": "Missing from, to or message"}),
            );
        }
    };

    match state.messages.append(&record).await {
        Ok(()) => code_reply(
            StatusCode::OK,
            serde_json::json!({"code": 0, "msg": "New success"}),
        ),
        Err(e) => {
            tracing::error!("Message append failed: {e}");
            code_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({"code": -1, "msg": format!("New failure: {e}")}),
            )
        }
    }
}

/// GET /stats: message count and most recent message ("admin").
async fn handle_stats(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(denial) = state.gate.authorize(&headers, ADMIN) {
        return render::denial(&headers, &denial);
    }

    match state.messages.stats().await {
        Ok(stats) => code_reply(
            StatusCode::OK,
            serde_json::json!({
                "code": 0,
                "data": StatsData {
                    number_of_calls: stats.count,
                    last_message: stats.last,
                },
            }),
        ),
        Err(e) => {
            tracing::error!("Message stats failed: {e}");
            code_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({"code": -1, "msg": format!("Query failed: {e}")}),
            )
        }
    }
}
