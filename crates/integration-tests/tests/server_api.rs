//! Raw GraphQL requests against the origin server.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use serde_json::json;

use cache_probe_integration_tests::TestContext;

// =============================================================================
// Products
// =============================================================================

#[tokio::test]
async fn test_upsert_product_echoes_id() {
    let ctx = TestContext::new().await.unwrap();
    let body = ctx
        .post_graphql(
            "mutation ($product: ProductInput!) { upsertProduct(product: $product) { id } }",
            json!({ "product": { "id": 7 } }),
        )
        .await
        .unwrap();
    assert_eq!(body["data"], json!({ "upsertProduct": { "id": 7 } }));
}

#[tokio::test]
async fn test_product_list_advances_per_fetch() {
    let ctx = TestContext::new().await.unwrap();
    for expected in 1..=3 {
        let body = ctx
            .post_graphql("{ session { products { id } } }", json!({}))
            .await
            .unwrap();
        assert_eq!(
            body["data"]["session"]["products"],
            json!([{ "id": expected }])
        );
    }
}

#[tokio::test]
async fn test_upsert_does_not_advance_counter() {
    let ctx = TestContext::new().await.unwrap();
    ctx.post_graphql(
        "mutation { upsertProduct(product: { id: 9 }) { id } }",
        json!({}),
    )
    .await
    .unwrap();
    let body = ctx
        .post_graphql("{ session { products { id } } }", json!({}))
        .await
        .unwrap();
    assert_eq!(body["data"]["session"]["products"], json!([{ "id": 1 }]));
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_login_logout_cycle() {
    let ctx = TestContext::new().await.unwrap();
    let query = "{ session { authenticatedUser { id username firstName } } }";

    let body = ctx.post_graphql(query, json!({})).await.unwrap();
    assert_eq!(body["data"]["session"]["authenticatedUser"], json!(null));

    let body = ctx
        .post_graphql("mutation { login { authenticatedUser { id } } }", json!({}))
        .await
        .unwrap();
    assert_eq!(body["data"]["login"]["authenticatedUser"], json!({ "id": 1 }));
    assert!(ctx.state.context().is_authenticated());

    let body = ctx.post_graphql(query, json!({})).await.unwrap();
    assert_eq!(
        body["data"]["session"]["authenticatedUser"],
        json!({ "id": 1, "username": "jt", "firstName": "Joe" })
    );

    let body = ctx
        .post_graphql("mutation { logout { authenticatedUser { id } } }", json!({}))
        .await
        .unwrap();
    assert_eq!(body["data"]["logout"]["authenticatedUser"], json!(null));

    let body = ctx.post_graphql(query, json!({})).await.unwrap();
    assert_eq!(body["data"]["session"]["authenticatedUser"], json!(null));
}

// =============================================================================
// Protocol
// =============================================================================

#[tokio::test]
async fn test_client_only_directive_is_rejected() {
    let ctx = TestContext::new().await.unwrap();
    let body = ctx
        .post_graphql(
            r#"{ session { products @connection(key: "products") { id } } }"#,
            json!({}),
        )
        .await
        .unwrap();
    let errors = body["errors"].as_array().unwrap();
    assert!(!errors.is_empty());
    assert!(errors[0]["message"].as_str().unwrap().contains("connection"));
}

#[tokio::test]
async fn test_health_and_explorer() {
    let ctx = TestContext::new().await.unwrap();

    let health = ctx.http.get(ctx.url("/health")).send().await.unwrap();
    assert!(health.status().is_success());

    let explorer = ctx.http.get(ctx.server.graphql_url()).send().await.unwrap();
    assert!(explorer.status().is_success());
    assert!(explorer.text().await.unwrap().contains("graphiql"));
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let ctx = TestContext::new().await.unwrap();
    let response = ctx
        .http
        .post(ctx.server.graphql_url())
        .header("x-request-id", "probe-123")
        .json(&json!({ "query": "{ __typename }" }))
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "probe-123"
    );
}
