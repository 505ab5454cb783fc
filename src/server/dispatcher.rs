//! Per-request dispatch.
//!
//! The dispatcher is the innermost handler of the middleware chain. For
//! each request it answers the built-in health endpoint, finds the first
//! matching rule, buffers the request body, renders response headers and
//! then the body template under a render deadline, and maps every
//! failure mode to its canonical status. One structured log line is
//! emitted per request at every exit path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ConnectInfo;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::bounded::{self, Outcome};
use crate::config::schema::ServerConfig;
use crate::middleware::Handler;
use crate::routing::RuleSet;
use crate::server::{responses, InstanceInfo};
use crate::template::{Engine, TemplateContext};

/// Builds the innermost request handler over one compiled snapshot.
pub fn handler(
    rules: Arc<RuleSet>,
    engine: Arc<Engine>,
    server: &ServerConfig,
    info: Arc<InstanceInfo>,
) -> Handler {
    let render_bound = Duration::from_secs(server.timeouts.request_secs);
    let max_body_bytes = server.max_body_bytes;

    Arc::new(move |request| {
        let rules = Arc::clone(&rules);
        let engine = Arc::clone(&engine);
        let info = Arc::clone(&info);
        Box::pin(dispatch(request, rules, engine, render_bound, max_body_bytes, info))
    })
}

async fn dispatch(
    request: axum::http::Request<axum::body::Body>,
    rules: Arc<RuleSet>,
    engine: Arc<Engine>,
    render_bound: Duration,
    max_body_bytes: usize,
    info: Arc<InstanceInfo>,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|connect| connect.0.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if path == "/health" && method == Method::GET {
        let response = health_response(rules.len(), &info);
        log_request(&method, &path, StatusCode::OK, started.elapsed(), None, &remote_addr);
        return response;
    }

    let Some((rule, params)) = rules.find_match(&method, &path, request.headers()) else {
        let response = responses::not_found(&method, &path);
        log_request(
            &method,
            &path,
            StatusCode::NOT_FOUND,
            started.elapsed(),
            None,
            &remote_addr,
        );
        return response;
    };
    let route = rule.pattern.as_str();

    // Buffer the whole body up front; templates may reference any part
    // of it.
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(method = %method, path = %path, error = %err, "server error");
            let response = responses::server_error();
            log_request(
                &method,
                &path,
                StatusCode::INTERNAL_SERVER_ERROR,
                started.elapsed(),
                Some(route),
                &remote_addr,
            );
            return response;
        }
    };

    let context = TemplateContext::build(&parts, &bytes, params);

    // Response headers render first. A failing header template fails the
    // whole response while the status line is still unwritten.
    let mut rendered_headers = Vec::with_capacity(rule.response_headers.len());
    for header in &rule.response_headers {
        let value = match engine.render(&header.template_name, &context) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(method = %method, path = %path, error = %err, "template execution error");
                let response = responses::template_error();
                log_request(
                    &method,
                    &path,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    started.elapsed(),
                    Some(route),
                    &remote_addr,
                );
                return response;
            }
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match (
            HeaderName::from_bytes(header.name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => rendered_headers.push((name, value)),
            _ => {
                tracing::warn!(
                    header = %header.name,
                    "skipping response header with invalid name or value"
                );
            }
        }
    }

    // The body template runs on a blocking thread under a deadline, so a
    // slow or stuck template cannot wedge the runtime.
    let render_started = Instant::now();
    let render_engine = Arc::clone(&engine);
    let template_name = rule.template_name.clone();
    let render_context = context.clone();
    let outcome = bounded::run_blocking(
        move || render_engine.render(&template_name, &render_context),
        render_bound,
    )
    .await;

    match outcome {
        Outcome::Completed(Ok(body)) => {
            tracing::info!(
                method = %method,
                path = %path,
                template_duration = %bounded::format_elapsed(render_started.elapsed()),
                buffer_size = body.len(),
                remote_addr = %remote_addr,
                "template execution completed"
            );
            let mut response = (StatusCode::OK, body).into_response();
            for (name, value) in rendered_headers {
                response.headers_mut().insert(name, value);
            }
            log_request(
                &method,
                &path,
                StatusCode::OK,
                started.elapsed(),
                Some(route),
                &remote_addr,
            );
            response
        }
        Outcome::Completed(Err(err)) => {
            tracing::error!(method = %method, path = %path, error = %err, "template execution error");
            let response = responses::template_error();
            log_request(
                &method,
                &path,
                StatusCode::INTERNAL_SERVER_ERROR,
                started.elapsed(),
                Some(route),
                &remote_addr,
            );
            response
        }
        Outcome::Panicked(message) => {
            tracing::error!(method = %method, path = %path, error = %message, "template execution error");
            let response = responses::template_error();
            log_request(
                &method,
                &path,
                StatusCode::INTERNAL_SERVER_ERROR,
                started.elapsed(),
                Some(route),
                &remote_addr,
            );
            response
        }
        Outcome::TimedOut { .. } => {
            let elapsed = started.elapsed();
            tracing::warn!(
                method = %method,
                path = %path,
                duration = %bounded::format_elapsed(elapsed),
                timeout = %bounded::format_elapsed(render_bound),
                remote_addr = %remote_addr,
                "request timeout - terminating"
            );
            let response = responses::request_timeout(elapsed);
            log_request(
                &method,
                &path,
                StatusCode::REQUEST_TIMEOUT,
                started.elapsed(),
                Some(route),
                &remote_addr,
            );
            response
        }
    }
}

fn log_request(
    method: &Method,
    path: &str,
    status: StatusCode,
    elapsed: Duration,
    route: Option<&str>,
    remote_addr: &str,
) {
    tracing::info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = elapsed.as_millis() as u64,
        route = route.unwrap_or("no match"),
        remote_addr = %remote_addr,
        "request processed"
    );
}

#[derive(Serialize)]
struct HealthPayload<'a> {
    status: &'static str,
    version: &'a str,
    uptime: String,
    routes: usize,
    config_file: &'a str,
    memory: MemoryUsage,
}

#[derive(Serialize)]
struct MemoryUsage {
    resident_bytes: u64,
    virtual_bytes: u64,
}

fn health_response(route_count: usize, info: &InstanceInfo) -> Response {
    let payload = HealthPayload {
        status: "healthy",
        version: &info.version,
        uptime: bounded::format_elapsed(info.started_at.elapsed()),
        routes: route_count,
        config_file: &info.config_path,
        memory: memory_usage(),
    };
    Json(payload).into_response()
}

/// Process memory from `/proc/self/statm`, zeros where unavailable.
fn memory_usage() -> MemoryUsage {
    read_statm().unwrap_or(MemoryUsage {
        resident_bytes: 0,
        virtual_bytes: 0,
    })
}

fn read_statm() -> Option<MemoryUsage> {
    const PAGE_SIZE: u64 = 4096;
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let mut fields = statm.split_whitespace();
    let virtual_pages: u64 = fields.next()?.parse().ok()?;
    let resident_pages: u64 = fields.next()?.parse().ok()?;
    Some(MemoryUsage {
        resident_bytes: resident_pages * PAGE_SIZE,
        virtual_bytes: virtual_pages * PAGE_SIZE,
    })
}
