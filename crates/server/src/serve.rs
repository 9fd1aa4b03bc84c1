//! In-process server for tests and the demo shell.

use std::net::{Ipv4Addr, SocketAddr};

use tokio::task::JoinHandle;

use crate::routes::{GRAPHQL_PATH, app};
use crate::state::AppState;

/// A server running on a loopback port. Stops when dropped.
#[derive(Debug)]
pub struct LocalServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl LocalServer {
    /// Bind an ephemeral loopback port and serve `state` on it.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the port cannot be bound.
    pub async fn spawn(state: AppState) -> std::io::Result<Self> {
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app(state)).await {
                tracing::error!(error = %e, "local server stopped");
            }
        });
        tracing::info!("local server running at http://{addr}{GRAPHQL_PATH}");
        Ok(Self { addr, handle })
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Full URL of the GraphQL endpoint.
    #[must_use]
    pub fn graphql_url(&self) -> String {
        format!("http://{}{GRAPHQL_PATH}", self.addr)
    }
}

impl Drop for LocalServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
