//! Executable GraphQL schema for the origin server.
//!
//! ```graphql
//! type Query { session: Session }
//! type Session {
//!   products(isDecrementingInventory: Boolean): [Product]
//!   authenticatedUser: User
//! }
//! type Mutation {
//!   upsertProduct(product: ProductInput!): Product
//!   login: Session
//!   logout: Session
//! }
//! ```

mod mutation;
mod query;
pub mod types;

use std::sync::Arc;

use async_graphql::{EmptySubscription, Schema};

pub use mutation::MutationRoot;
pub use query::{QueryRoot, Session};

use crate::context::ServerContext;
use crate::error::ErrorReporter;

/// The schema served at `/graphql`.
pub type ProbeSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Build the schema around a shared server context.
#[must_use]
pub fn build_schema(context: Arc<ServerContext>) -> ProbeSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(context)
        .extension(ErrorReporter)
        .finish()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_graphql::{Request, Variables};
    use serde_json::{Value, json};

    use super::*;

    fn schema() -> ProbeSchema {
        build_schema(Arc::new(ServerContext::new()))
    }

    async fn run(schema: &ProbeSchema, request: impl Into<Request>) -> Value {
        let response = schema.execute(request).await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        response.data.into_json().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_product_echoes_id() {
        let schema = schema();
        for id in [-3, 0, 2, 99] {
            let request = Request::new(
                "mutation UpsertProduct($product: ProductInput!) { upsertProduct(product: $product) { id } }",
            )
            .variables(Variables::from_json(json!({ "product": { "id": id } })));
            let data = run(&schema, request).await;
            assert_eq!(data, json!({ "upsertProduct": { "id": id } }));
        }
    }

    #[tokio::test]
    async fn test_upsert_product_without_id_echoes_null() {
        let data = run(&schema(), "mutation { upsertProduct(product: {}) { id } }").await;
        assert_eq!(data, json!({ "upsertProduct": { "id": null } }));
    }

    #[tokio::test]
    async fn test_products_counter_increments_per_read() {
        let schema = schema();
        for expected in 1..=3 {
            let data = run(&schema, "{ session { products { id } } }").await;
            assert_eq!(data, json!({ "session": { "products": [{ "id": expected }] } }));
        }
    }

    #[tokio::test]
    async fn test_products_ignores_argument() {
        let schema = schema();
        let first = run(
            &schema,
            "{ session { products(isDecrementingInventory: true) { id } } }",
        )
        .await;
        let second = run(
            &schema,
            "{ session { products(isDecrementingInventory: false) { id } } }",
        )
        .await;
        assert_eq!(first["session"]["products"][0]["id"], 1);
        assert_eq!(second["session"]["products"][0]["id"], 2);
    }

    #[tokio::test]
    async fn test_login_logout_toggles_authenticated_user() {
        let schema = schema();
        let query = "{ session { authenticatedUser { id username firstName } } }";

        let data = run(&schema, query).await;
        assert_eq!(data, json!({ "session": { "authenticatedUser": null } }));

        let data = run(&schema, "mutation { login { authenticatedUser { id } } }").await;
        assert_eq!(data, json!({ "login": { "authenticatedUser": { "id": 1 } } }));

        let data = run(&schema, query).await;
        assert_eq!(
            data,
            json!({ "session": { "authenticatedUser": { "id": 1, "username": "jt", "firstName": "Joe" } } })
        );

        let data = run(&schema, "mutation { logout { authenticatedUser { id } } }").await;
        assert_eq!(data, json!({ "logout": { "authenticatedUser": null } }));
    }

    #[tokio::test]
    async fn test_session_has_no_typename_identity() {
        let data = run(&schema(), "{ session { __typename } }").await;
        assert_eq!(data, json!({ "session": { "__typename": "Session" } }));
    }

    #[tokio::test]
    async fn test_unknown_directive_is_rejected() {
        let response = schema()
            .execute("{ session { products @connection(key: \"products\") { id } } }")
            .await;
        assert!(!response.errors.is_empty());
    }

    #[test]
    fn test_sdl_matches_published_shape() {
        let sdl = schema().sdl();
        assert!(sdl.contains("products(isDecrementingInventory: Boolean): [Product]"));
        assert!(sdl.contains("upsertProduct(product: ProductInput!): Product"));
        assert!(sdl.contains("authenticatedUser: User"));
        assert!(sdl.contains("firstName: String"));
    }
}
