//! GraphQL endpoint handlers.

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use tracing::instrument;

use crate::state::AppState;

/// Path the GraphQL endpoint is mounted at.
pub const GRAPHQL_PATH: &str = "/graphql";

/// Execute a GraphQL request against the schema.
#[instrument(skip_all, fields(operation = tracing::field::Empty))]
pub async fn execute(State(state): State<AppState>, request: GraphQLRequest) -> GraphQLResponse {
    let request = request.into_inner();
    if let Some(name) = request.operation_name.as_deref() {
        tracing::Span::current().record("operation", name);
    }

    state.schema().execute(request).await.into()
}

/// Serve the GraphiQL explorer.
pub async fn explorer() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint(GRAPHQL_PATH).finish())
}
