//! Request logging middleware.
//!
//! Emits one structured line per completed request. Paths listed in
//! `skip_paths` (exact match) bypass logging entirely, which keeps the
//! health probe out of the logs.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::HttpBody;
use axum::extract::ConnectInfo;
use axum::http::header::USER_AGENT;
use serde::{Deserialize, Serialize};

use crate::middleware::{Handler, Middleware};

/// Logger middleware configuration. Output format and level are owned by
/// the process-wide tracing subscriber, not configured per middleware.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LoggerConfig {
    pub skip_paths: Vec<String>,
}

pub struct RequestLogger {
    skip: Arc<HashSet<String>>,
}

impl RequestLogger {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            skip: Arc::new(config.skip_paths.into_iter().collect()),
        }
    }
}

impl Middleware for RequestLogger {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let skip = Arc::clone(&self.skip);
        Arc::new(move |request| {
            let next = Arc::clone(&next);
            let skip = Arc::clone(&skip);
            Box::pin(async move {
                if skip.contains(request.uri().path()) {
                    return (*next)(request).await;
                }

                let started = Instant::now();
                let method = request.method().clone();
                let path = request.uri().path().to_string();
                let user_agent = request
                    .headers()
                    .get(USER_AGENT)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let remote_addr = request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|info| info.0.to_string())
                    .unwrap_or_else(|| "unknown".to_string());

                let response = (*next)(request).await;

                let size = response.body().size_hint().exact().unwrap_or(0);
                tracing::info!(
                    method = %method,
                    path = %path,
                    status = response.status().as_u16(),
                    size,
                    duration_ms = started.elapsed().as_millis() as u64,
                    remote_addr = %remote_addr,
                    user_agent = %user_agent,
                    "request processed"
                );
                response
            })
        })
    }
}
