//! Cache follow-ups for the `upsertProduct` mutation.
//!
//! Two ways of getting an upserted product into the session's list: an
//! imperative append through [`InMemoryCache::modify`], and a reducer for
//! [`MutationOptions::update_query`](crate::MutationOptions::update_query)
//! that is written back through the `products` merge function.

use serde_json::Value;

use crate::cache::InMemoryCache;

/// Cache id of the session singleton under [`probe_type_policies`](crate::probe_type_policies).
pub const SESSION_ID: &str = "Session:{}";

/// Append a reference to `object` to every stored variant of `field` on `id`.
pub fn append_reference(cache: &InMemoryCache, id: &str, field: &str, object: &Value) -> bool {
    cache.modify(id, field, |current, ctx| {
        let mut items = current.as_array().cloned().unwrap_or_default();
        items.push(ctx.to_reference(object));
        Value::Array(items)
    })
}

/// `update` callback: append the upserted product to the session's products.
pub fn append_upserted_product(cache: &InMemoryCache, data: &Value) {
    if let Some(product) = upserted_product(data) {
        append_reference(cache, SESSION_ID, "products", product);
    }
}

/// `update_queries` reducer: append the upserted product to a query's
/// `session.products`.
#[must_use]
pub fn append_product_to_query(previous: Value, data: &Value) -> Option<Value> {
    let product = upserted_product(data)?.clone();
    let mut next = previous;
    next.get_mut("session")?
        .get_mut("products")?
        .as_array_mut()?
        .push(product);
    Some(next)
}

fn upserted_product(data: &Value) -> Option<&Value> {
    data.get("upsertProduct").filter(|p| !p.is_null())
}
