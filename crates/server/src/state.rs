//! Application state shared across handlers.

use std::sync::Arc;

use crate::context::ServerContext;
use crate::schema::{ProbeSchema, build_schema};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// executable schema and the mutable server context.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    context: Arc<ServerContext>,
    schema: ProbeSchema,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Create a new application state with a fresh server context.
    #[must_use]
    pub fn new() -> Self {
        let context = Arc::new(ServerContext::new());
        let schema = build_schema(Arc::clone(&context));

        Self {
            inner: Arc::new(AppStateInner {
                context,
                schema,
            }),
        }
    }

    /// Get a reference to the id counter and authentication flag owner.
    #[must_use]
    pub fn context(&self) -> &ServerContext {
        &self.inner.context
    }

    /// Get a reference to the executable schema.
    #[must_use]
    pub fn schema(&self) -> &ProbeSchema {
        &self.inner.schema
    }
}
