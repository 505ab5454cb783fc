//! Request timeout middleware.
//!
//! Races the rest of the chain against a wall-clock budget. Requests
//! that exceed it are answered with 408; a panicking handler yields 500
//! instead of tearing down the connection task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::bounded::{self, Outcome};
use crate::middleware::{Handler, Middleware};

/// Timeout middleware configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub duration_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            duration_ms: 30_000,
        }
    }
}

pub struct RequestTimeout {
    bound: Duration,
}

impl RequestTimeout {
    pub fn new(config: TimeoutConfig) -> Self {
        let millis = if config.duration_ms == 0 {
            30_000
        } else {
            config.duration_ms
        };
        Self {
            bound: Duration::from_millis(millis),
        }
    }
}

impl Middleware for RequestTimeout {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let bound = self.bound;
        Arc::new(move |request| {
            let next = Arc::clone(&next);
            Box::pin(async move {
                let method = request.method().clone();
                let path = request.uri().path().to_string();
                let remote_addr = request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|info| info.0.to_string())
                    .unwrap_or_else(|| "unknown".to_string());

                match bounded::run((*next)(request), bound).await {
                    Outcome::Completed(response) => response,
                    Outcome::TimedOut { elapsed } => {
                        tracing::warn!(
                            method = %method,
                            path = %path,
                            duration = %bounded::format_elapsed(elapsed),
                            timeout = %bounded::format_elapsed(bound),
                            remote_addr = %remote_addr,
                            "request timeout"
                        );
                        plain(StatusCode::REQUEST_TIMEOUT, "request timeout\n")
                    }
                    Outcome::Panicked(message) => {
                        tracing::error!(
                            method = %method,
                            path = %path,
                            remote_addr = %remote_addr,
                            error = %message,
                            "request handler panicked"
                        );
                        plain(StatusCode::INTERNAL_SERVER_ERROR, "internal server error\n")
                    }
                }
            })
        })
    }
}

fn plain(status: StatusCode, body: &'static str) -> Response {
    let mut response = (status, body).into_response();
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
