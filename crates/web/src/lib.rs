//! Virtuoso Gateway HTTP API
//!
//! Thin web layer over the executor: authentication, rate limiting,
//! sessions, and the command endpoints.

pub mod auth;
pub mod commands;
pub mod error;
pub mod health;
pub mod rate_limit;
pub mod server;
pub mod sessions;

pub use server::{router, serve, AppState};
