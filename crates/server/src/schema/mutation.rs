//! Mutation root.

use std::sync::Arc;

use async_graphql::{Context, Object, Result};

use cache_probe_core as core;

use super::query::Session;
use super::types::{Product, ProductInput};
use crate::context::ServerContext;

/// Write entry point.
#[derive(Debug, Default)]
pub struct MutationRoot;

#[Object(name = "Mutation")]
impl MutationRoot {
    /// Echoes the product back unchanged. Nothing is persisted.
    async fn upsert_product(&self, product: ProductInput) -> Option<Product> {
        let input = core::ProductInput::from(product);
        tracing::info!(product_id = ?input.id, "Upserting product");
        Some(Product::from(input))
    }

    /// Marks the process as authenticated and returns an empty session for
    /// the client to resolve nested fields against.
    async fn login(&self, ctx: &Context<'_>) -> Result<Option<Session>> {
        ctx.data::<Arc<ServerContext>>()?.login();
        Ok(Some(Session))
    }

    /// Clears the authentication flag.
    async fn logout(&self, ctx: &Context<'_>) -> Result<Option<Session>> {
        ctx.data::<Arc<ServerContext>>()?.logout();
        Ok(Some(Session))
    }
}
