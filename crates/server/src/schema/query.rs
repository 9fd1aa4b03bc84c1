//! Query root and the `Session` object.

use std::sync::Arc;

use async_graphql::{Context, Object, Result};

use super::types::{Product, User};
use crate::context::ServerContext;

/// Read entry point.
#[derive(Debug, Default)]
pub struct QueryRoot;

#[Object(name = "Query")]
impl QueryRoot {
    /// The caller's session. Always present; it carries no fields of its own.
    async fn session(&self) -> Option<Session> {
        Some(Session)
    }
}

/// Singleton marker resolved lazily through its fields.
///
/// It has no identity of its own, so clients must pin one if they want to
/// normalize it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Session;

#[Object]
impl Session {
    /// Products visible to the session.
    ///
    /// Each call hands out a fresh id; the argument is accepted but does not
    /// change the result.
    async fn products(
        &self,
        ctx: &Context<'_>,
        is_decrementing_inventory: Option<bool>,
    ) -> Result<Option<Vec<Option<Product>>>> {
        let server = ctx.data::<Arc<ServerContext>>()?;
        tracing::debug!(?is_decrementing_inventory, "Resolving session products");

        let products = server
            .fetch_products()
            .into_iter()
            .map(|product| Some(Product::from(product)))
            .collect();
        Ok(Some(products))
    }

    /// The fixed user while logged in, otherwise `null`.
    async fn authenticated_user(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        let server = ctx.data::<Arc<ServerContext>>()?;
        Ok(server.authenticated_user().map(User::from))
    }
}
