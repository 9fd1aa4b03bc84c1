//! Product records.

use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// A product as exposed by the origin server.
///
/// Identity is `id`; the server never deletes products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
}

impl Product {
    #[must_use]
    pub const fn new(id: ProductId) -> Self {
        Self { id }
    }
}

/// Input accepted by `upsertProduct`.
///
/// `id` is optional on the wire; an absent id is echoed back as `null`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInput {
    pub id: Option<ProductId>,
}
