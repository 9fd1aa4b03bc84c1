//! GraphQL error reporting with Sentry integration.
//!
//! Errors are never translated or recovered from: each one is logged as
//! pretty JSON, forwarded to Sentry, and returned to the client exactly as the
//! GraphQL runtime produced it.

use std::sync::Arc;

use async_graphql::extensions::{Extension, ExtensionContext, ExtensionFactory, NextRequest};
use async_graphql::{Response, ServerError};

/// Schema extension that wraps every request and reports its errors.
///
/// Wraps the whole request, so parse and validation failures (e.g. a client
/// forgetting to strip a client-only directive) are covered as well.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorReporter;

impl ExtensionFactory for ErrorReporter {
    fn create(&self) -> Arc<dyn Extension> {
        Arc::new(ErrorReporterExtension)
    }
}

struct ErrorReporterExtension;

#[async_trait::async_trait]
impl Extension for ErrorReporterExtension {
    async fn request(&self, ctx: &ExtensionContext<'_>, next: NextRequest<'_>) -> Response {
        let response = next.run(ctx).await;
        if response.is_err() {
            report_errors(&response.errors);
        }
        response
    }
}

/// Log and report every error attached to a GraphQL response.
pub fn report_errors(errors: &[ServerError]) {
    for error in errors {
        let rendered = render_error(error);
        let event_id = sentry::capture_message(&error.message, sentry::Level::Error);
        tracing::error!(
            sentry_event_id = %event_id,
            "GraphQL error:\n{rendered}"
        );
    }
}

/// Pretty JSON rendering of one error, falling back to its message.
fn render_error(error: &ServerError) -> String {
    serde_json::to_string_pretty(error).unwrap_or_else(|_| error.message.clone())
}
