//! HTTP transport for GraphQL operations.
//!
//! Uses `reqwest` 0.13 directly; `graphql_client` only supplies the
//! response envelope and the generated operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use graphql_client::Response;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;
use url::Url;

use crate::error::{ClientError, GraphQLError};

/// JSON body of a GraphQL POST.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    operation_name: Option<&'a str>,
    variables: &'a Value,
}

/// Sends operations to one endpoint. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

#[derive(Debug)]
struct TransportInner {
    client: reqwest::Client,
    endpoint: Url,
    requests: AtomicU64,
}

impl Transport {
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self {
            inner: Arc::new(TransportInner {
                client: reqwest::Client::new(),
                endpoint,
                requests: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Number of requests sent so far.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.inner.requests.load(Ordering::Relaxed)
    }

    /// POST one operation and return its `data`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` on HTTP failures, non-success statuses,
    /// unparseable bodies and GraphQL errors.
    #[instrument(skip(self, query, variables), fields(endpoint = %self.inner.endpoint))]
    pub async fn execute(
        &self,
        query: &str,
        operation_name: Option<&str>,
        variables: &Value,
    ) -> Result<Value, ClientError> {
        let body = RequestBody {
            query,
            operation_name,
            variables,
        };
        self.inner.requests.fetch_add(1, Ordering::Relaxed);

        let response = self
            .inner
            .client
            .post(self.inner.endpoint.clone())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "GraphQL endpoint returned non-success status"
            );
            return Err(ClientError::Status {
                status,
                body: response_text.chars().take(200).collect(),
            });
        }

        let response: Response<Value> = match serde_json::from_str(&response_text) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %response_text.chars().take(500).collect::<String>(),
                    "Failed to parse GraphQL response"
                );
                return Err(ClientError::Parse(e));
            }
        };

        if let Some(errors) = response.errors
            && !errors.is_empty()
        {
            tracing::debug!(errors = ?errors, "GraphQL errors in response");
            return Err(ClientError::GraphQL(
                errors.into_iter().map(GraphQLError::from).collect(),
            ));
        }

        response.data.ok_or(ClientError::NoData)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_body_shape() {
        let variables = json!({ "product": { "id": 2 } });
        let body = RequestBody {
            query: "mutation UpsertProduct { upsertProduct { id } }",
            operation_name: Some("UpsertProduct"),
            variables: &variables,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap_or_default(),
            json!({
                "query": "mutation UpsertProduct { upsertProduct { id } }",
                "operationName": "UpsertProduct",
                "variables": { "product": { "id": 2 } }
            })
        );
    }

    #[test]
    fn test_anonymous_operations_omit_the_name() {
        let variables = json!({});
        let body = RequestBody {
            query: "{ session { products { id } } }",
            operation_name: None,
            variables: &variables,
        };
        let value = serde_json::to_value(&body).unwrap_or_default();
        assert!(value.get("operationName").is_none());
    }
}
