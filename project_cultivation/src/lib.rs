//! Server wiring for the cultivation backend: configuration, the HTTP API,
//! background jobs and shutdown.

pub mod api;
pub mod config;
pub mod server;
pub mod shutdown;
