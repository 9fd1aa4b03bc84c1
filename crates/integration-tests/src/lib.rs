//! Integration tests for Cache Probe.
//!
//! Every test starts its own origin server on a loopback port, so tests run
//! in parallel without sharing the product counter or the auth flag.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cache-probe-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `server_api` - Raw GraphQL over HTTP against the origin server
//! - `cache_policies` - Merge functions, `@connection` keys and cache updates
//! - `watched_queries` - Loading state and watcher lifecycle

use serde_json::{Value, json};

use cache_probe_client::{ClientConfig, ClientError, ProbeClient, probe_type_policies};
use cache_probe_server::{AppState, LocalServer};

/// A running server plus clients pointed at it.
pub struct TestContext {
    pub server: LocalServer,
    pub state: AppState,
    pub client: ProbeClient,
    pub http: reqwest::Client,
}

impl TestContext {
    /// Start a fresh server and a client with the probe type policies.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot bind or the endpoint is invalid.
    pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let state = AppState::new();
        let server = LocalServer::spawn(state.clone()).await?;
        let config = ClientConfig::with_endpoint(&server.graphql_url())?;
        Ok(Self {
            client: ProbeClient::new(&config, probe_type_policies()),
            http: reqwest::Client::new(),
            server,
            state,
        })
    }

    /// URL for `path` on the test server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.server.addr())
    }

    /// POST a raw GraphQL request and return the whole response body.
    ///
    /// # Errors
    ///
    /// Returns the transport or decoding error.
    pub async fn post_graphql(&self, query: &str, variables: Value) -> Result<Value, ClientError> {
        let response = self
            .http
            .post(self.server.graphql_url())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        Ok(response.json().await?)
    }
}
