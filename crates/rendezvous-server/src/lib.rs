//! # Rendezvous Server
//!
//! HTTP and WebSocket front end for the signaling hub: configuration,
//! request handlers and Prometheus metrics. The `rendezvous` binary is a
//! thin wrapper over [`handlers::run_server`].

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{app, run_server, serve, AppState};
