//! Normalized GraphQL client cache for cache-probe.
//!
//! # Modules
//!
//! - `document` - Operation parsing, `__typename` injection, client-directive stripping
//! - `cache` - Normalized entity store, type/field policies, watchers
//! - `policies` - Policies for the probe schema (`Session` singleton, deduplicating merge)
//! - `client` - Fetch policies, mutations with cache follow-ups, watched queries
//! - `queries` - `graphql_client` generated operations
//! - `updates` - Cache follow-ups for `upsertProduct`
//!
//! # Example
//!
//! ```rust,ignore
//! use cache_probe_client::{ClientConfig, FetchPolicy, ProbeClient, probe_type_policies};
//!
//! let client = ProbeClient::new(&ClientConfig::from_env()?, probe_type_policies());
//! let mut user = client
//!     .watch_typed::<AuthenticatedUser>(authenticated_user::Variables, FetchPolicy::CacheFirst)
//!     .await?;
//! client.mutate_typed::<Login>(login::Variables, MutationOptions::new()).await?;
//! let state = user.wait_for(|s| !s.loading).await;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod observable;
pub mod policies;
pub mod queries;
pub mod transport;
pub mod updates;

pub use cache::{InMemoryCache, TypePolicies};
pub use client::{FetchPolicy, MutationOptions, ProbeClient};
pub use config::{ClientConfig, ConfigError};
pub use document::Document;
pub use error::ClientError;
pub use observable::{HISTORY_LIMIT, NetworkStatus, ObservableQuery, QueryState};
pub use policies::{dedupe_trailing_append, probe_type_policies};
