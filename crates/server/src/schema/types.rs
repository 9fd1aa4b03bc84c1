//! GraphQL object and input types.
//!
//! Every field is nullable on the wire, matching the published schema
//! (`Product{id:Int}`, `User{id:Int, username:String, firstName:String}`).

use async_graphql::{InputObject, SimpleObject};

use cache_probe_core as core;

/// A product record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, SimpleObject)]
pub struct Product {
    pub id: Option<i32>,
}

impl From<core::Product> for Product {
    fn from(product: core::Product) -> Self {
        Self {
            id: Some(product.id.as_i32()),
        }
    }
}

/// The authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, SimpleObject)]
pub struct User {
    pub id: Option<i32>,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

impl From<&core::User> for User {
    fn from(user: &core::User) -> Self {
        Self {
            id: Some(user.id.as_i32()),
            username: Some(user.username.clone()),
            first_name: Some(user.first_name.clone()),
        }
    }
}

/// Argument of `upsertProduct`.
#[derive(Debug, Clone, Copy, Default, InputObject)]
pub struct ProductInput {
    pub id: Option<i32>,
}

impl From<ProductInput> for core::ProductInput {
    fn from(input: ProductInput) -> Self {
        Self {
            id: input.id.map(core::ProductId::new),
        }
    }
}

impl From<core::ProductInput> for Product {
    fn from(input: core::ProductInput) -> Self {
        Self {
            id: input.id.map(|id| id.as_i32()),
        }
    }
}
