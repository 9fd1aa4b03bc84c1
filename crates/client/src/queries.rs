//! Generated operations for the cache-probe schema.

use graphql_client::GraphQLQuery;

// Session queries
#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "graphql/schema.graphql",
    query_path = "graphql/queries/session.graphql",
    response_derives = "Debug, Clone, PartialEq",
    skip_serializing_none
)]
pub struct HydrateSession;

#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "graphql/schema.graphql",
    query_path = "graphql/queries/session.graphql",
    response_derives = "Debug, Clone, PartialEq",
    skip_serializing_none
)]
pub struct SessionProducts;

#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "graphql/schema.graphql",
    query_path = "graphql/queries/session.graphql",
    response_derives = "Debug, Clone, PartialEq"
)]
pub struct AuthenticatedUser;

// Mutations
#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "graphql/schema.graphql",
    query_path = "graphql/queries/mutations.graphql",
    response_derives = "Debug, Clone, PartialEq",
    variables_derives = "Debug, Clone",
    skip_serializing_none
)]
pub struct UpsertProduct;

#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "graphql/schema.graphql",
    query_path = "graphql/queries/mutations.graphql",
    response_derives = "Debug, Clone, PartialEq"
)]
pub struct Login;

#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "graphql/schema.graphql",
    query_path = "graphql/queries/mutations.graphql",
    response_derives = "Debug, Clone, PartialEq"
)]
pub struct Logout;

/// Operation text and name of a generated operation.
#[must_use]
pub fn operation_source<Q: GraphQLQuery>(variables: Q::Variables) -> (&'static str, &'static str) {
    let body = Q::build_query(variables);
    (body.query, body.operation_name)
}
