//! Cache Probe origin server library.
//!
//! This crate provides the server as a library, allowing it to be started
//! in-process by the integration tests and the demo shell.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod context;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod schema;
pub mod serve;
pub mod state;

pub use config::{ConfigError, ServerConfig};
pub use context::ServerContext;
pub use routes::{GRAPHQL_PATH, app};
pub use serve::LocalServer;
pub use state::AppState;
