//! gatehouse: account registration, signed sessions, a capability gate,
//! and an append-only message log behind a small HTTP API.

pub mod auth;
pub mod config;
pub mod gate;
pub mod gateway;
pub mod messages;
