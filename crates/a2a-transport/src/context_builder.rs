//! Building a [`RequestContext`] from an inbound HTTP request.

use a2a_protocol::{requested_extensions, RequestContext, User, EXTENSIONS_HEADER};
use axum::http::request::Parts;
use serde_json::{Map, Value};

/// Turns request metadata into the per-request context handed to handlers.
pub trait CallContextBuilder: Send + Sync + 'static {
    fn build(&self, parts: &Parts) -> RequestContext;
}

/// Identity from a [`User`] request extension, headers captured into state,
/// extensions negotiated from `X-A2A-Extensions`.
///
/// Authentication runs in an outer layer that inserts the `User`; requests
/// without one are anonymous.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCallContextBuilder;

impl CallContextBuilder for DefaultCallContextBuilder {
    fn build(&self, parts: &Parts) -> RequestContext {
        let user = parts.extensions.get::<User>().cloned().unwrap_or_default();

        let mut headers = Map::new();
        for (name, value) in &parts.headers {
            let Ok(value) = value.to_str() else { continue };
            // First value wins for repeated headers.
            headers
                .entry(name.as_str())
                .or_insert_with(|| Value::String(value.to_string()));
        }

        let extensions = requested_extensions(
            parts
                .headers
                .get_all(EXTENSIONS_HEADER)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        );

        RequestContext::builder()
            .user(user)
            .state("headers", Value::Object(headers))
            .requested_extensions(extensions)
            .build()
    }
}
