//! Canonical plain-text error responses.
//!
//! Client-facing error bodies are fixed strings. Whatever detail caused
//! the failure goes to the log, never over the wire.

use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::bounded;

pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

pub fn plain_text(status: StatusCode, body: String) -> Response {
    let mut response = (status, body).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN_UTF8));
    response
}

pub fn not_found(method: &Method, path: &str) -> Response {
    plain_text(
        StatusCode::NOT_FOUND,
        format!("404 Not Found: no route matches {method} {path}"),
    )
}

pub fn server_error() -> Response {
    plain_text(
        StatusCode::INTERNAL_SERVER_ERROR,
        "500 Internal Server Error\n".to_string(),
    )
}

pub fn template_error() -> Response {
    plain_text(
        StatusCode::INTERNAL_SERVER_ERROR,
        "500 Internal Server Error: response template cannot be rendered due to an error in the template\n"
            .to_string(),
    )
}

pub fn request_timeout(elapsed: Duration) -> Response {
    plain_text(
        StatusCode::REQUEST_TIMEOUT,
        format!(
            "408 Request Timeout\n\nThe request exceeded the configured timeout and was terminated.\nTimeout occurred after: {}",
            bounded::format_elapsed(elapsed)
        ),
    )
}
