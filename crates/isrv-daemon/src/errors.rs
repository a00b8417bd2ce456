// SPDX-License-Identifier: MIT OR Apache-2.0
//! Renders a [`ServerError`] as an HTTP response, negotiating the body
//! format against the request's `Accept` header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use isrv_error::ServerError;

/// The negotiated body format for an error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorBodyFormat {
    Html,
    Json,
    Text,
}

fn negotiate(accept: &str) -> ErrorBodyFormat {
    // Accept headers list preferences comma-separated; a real q-value
    // negotiation is overkill here since only three outcomes exist.
    for candidate in accept.split(',') {
        let media = candidate.split(';').next().unwrap_or("").trim();
        match media {
            "text/html" | "application/xhtml+xml" => return ErrorBodyFormat::Html,
            "application/json" => return ErrorBodyFormat::Json,
            _ => continue,
        }
    }
    ErrorBodyFormat::Text
}

/// Wraps a [`ServerError`] so it can be returned directly from an Axum
/// handler.
pub struct AppError {
    error: ServerError,
    format: ErrorBodyFormat,
}

impl AppError {
    /// Wrap `error`, defaulting to `text/plain` rendering (used where no
    /// request `Accept` header is available, e.g. middleware-level errors).
    pub fn new(error: ServerError) -> Self {
        Self { error, format: ErrorBodyFormat::Text }
    }

    /// Attach the negotiated body format from a request's `Accept` header.
    pub fn with_accept(mut self, accept: Option<&str>) -> Self {
        self.format = accept.map(negotiate).unwrap_or(ErrorBodyFormat::Text);
        self
    }
}

impl From<ServerError> for AppError {
    fn from(error: ServerError) -> Self {
        Self::new(error)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        tracing::warn!(code = %self.error.code, status = status.as_u16(), "request failed: {}", self.error.message);

        let body = match self.format {
            ErrorBodyFormat::Html => (
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                format!(
                    "<!DOCTYPE html><html><head><title>{status}</title></head><body>\
                     <h1>{status}</h1><p>{}</p></body></html>",
                    html_escape(&self.error.message)
                ),
            )
                .into_response(),
            ErrorBodyFormat::Json => (
                [(header::CONTENT_TYPE, "application/json")],
                serde_json::to_string(&serde_json::json!({
                    "status": status.as_u16(),
                    "error": self.error.message,
                }))
                .unwrap_or_else(|_| "{}".to_string()),
            )
                .into_response(),
            ErrorBodyFormat::Text => (
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                self.error.message.clone(),
            )
                .into_response(),
        };

        (status, body).into_response()
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Extracts the raw `Accept` header value, for handlers that need to
/// negotiate an error body before a [`ServerError`] is in hand (e.g. to
/// build an [`AppError`] from within a fallible handler body).
pub struct Accept(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for Accept {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Accept(
            parts
                .headers
                .get(header::ACCEPT)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isrv_error::ErrorCode;

    #[test]
    fn negotiates_html() {
        assert_eq!(negotiate("text/html,application/xhtml+xml"), ErrorBodyFormat::Html);
    }

    #[test]
    fn negotiates_json() {
        assert_eq!(negotiate("application/json"), ErrorBodyFormat::Json);
    }

    #[test]
    fn falls_back_to_text() {
        assert_eq!(negotiate("application/octet-stream"), ErrorBodyFormat::Text);
    }

    #[tokio::test]
    async fn not_found_renders_404() {
        let err = AppError::new(ServerError::not_found("no such source")).with_accept(Some("application/json"));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn status_follows_error_category() {
        let err = ServerError::new(ErrorCode::InvalidRegion, "bad region");
        assert_eq!(err.status_code(), 400);
    }
}
