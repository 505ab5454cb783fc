//! CORS middleware.
//!
//! Sets the access-control headers on every response and short-circuits
//! preflight OPTIONS requests with 204 before they reach the dispatcher.

use std::sync::Arc;

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE, ORIGIN,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::middleware::{Handler, Middleware};

/// CORS middleware configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: u32,
}

// Precomputed header values shared by every request.
struct HeaderSet {
    wildcard: bool,
    allow_origins: Vec<String>,
    allow_methods: Option<HeaderValue>,
    allow_headers: Option<HeaderValue>,
    expose_headers: Option<HeaderValue>,
    allow_credentials: bool,
    max_age: Option<HeaderValue>,
}

pub struct Cors {
    headers: Arc<HeaderSet>,
}

impl Cors {
    /// Empty lists and a zero max age fall back to permissive defaults:
    /// any origin, the common verbs, Content-Type and Authorization, one
    /// hour of preflight caching.
    pub fn new(mut config: CorsConfig) -> Self {
        if config.allow_origins.is_empty() {
            config.allow_origins = vec!["*".to_string()];
        }
        if config.allow_methods.is_empty() {
            config.allow_methods = ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .map(String::from)
                .to_vec();
        }
        if config.allow_headers.is_empty() {
            config.allow_headers = ["Content-Type", "Authorization"].map(String::from).to_vec();
        }
        if config.max_age == 0 {
            config.max_age = 3600;
        }

        let headers = HeaderSet {
            wildcard: config.allow_origins.len() == 1 && config.allow_origins[0] == "*",
            allow_methods: joined_value(&config.allow_methods),
            allow_headers: joined_value(&config.allow_headers),
            expose_headers: joined_value(&config.expose_headers),
            allow_credentials: config.allow_credentials,
            max_age: HeaderValue::from_str(&config.max_age.to_string()).ok(),
            allow_origins: config.allow_origins,
        };
        Self {
            headers: Arc::new(headers),
        }
    }
}

impl Middleware for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let set = Arc::clone(&self.headers);
        Arc::new(move |request| {
            let next = Arc::clone(&next);
            let set = Arc::clone(&set);
            Box::pin(async move {
                let origin = request.headers().get(ORIGIN).cloned();

                if request.method() == Method::OPTIONS {
                    let mut response = StatusCode::NO_CONTENT.into_response();
                    apply(&set, origin.as_ref(), response.headers_mut());
                    return response;
                }

                let mut response = (*next)(request).await;
                apply(&set, origin.as_ref(), response.headers_mut());
                response
            })
        })
    }
}

fn apply(set: &HeaderSet, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
    if set.wildcard {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    } else if let Some(origin) = origin {
        let allowed = origin
            .to_str()
            .map(|o| set.allow_origins.iter().any(|a| a == "*" || a == o))
            .unwrap_or(false);
        if allowed {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        }
    }

    if let Some(value) = &set.allow_methods {
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, value.clone());
    }
    if let Some(value) = &set.allow_headers {
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, value.clone());
    }
    if let Some(value) = &set.expose_headers {
        headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, value.clone());
    }
    if set.allow_credentials {
        headers.insert(
            ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
    if let Some(value) = &set.max_age {
        headers.insert(ACCESS_CONTROL_MAX_AGE, value.clone());
    }
}

fn joined_value(values: &[String]) -> Option<HeaderValue> {
    if values.is_empty() {
        return None;
    }
    HeaderValue::from_str(&values.join(", ")).ok()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;

    use super::*;

    fn terminal() -> Handler {
        Arc::new(|_request| Box::pin(async { StatusCode::OK.into_response() }))
    }

    fn get(origin: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(Method::GET).uri("/x");
        if let Some(origin) = origin {
            builder = builder.header("Origin", origin);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn defaults_allow_any_origin() {
        let handler = Cors::new(CorsConfig::default()).wrap(terminal());
        let response = (*handler)(get(Some("https://app.test"))).await;

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            headers[ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, PUT, DELETE, OPTIONS"
        );
        assert_eq!(
            headers[ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type, Authorization"
        );
        assert_eq!(headers[ACCESS_CONTROL_MAX_AGE], "3600");
        assert!(!headers.contains_key(ACCESS_CONTROL_ALLOW_CREDENTIALS));
    }

    #[tokio::test]
    async fn preflight_short_circuits_with_204() {
        let handler = Cors::new(CorsConfig::default()).wrap(Arc::new(|_request| {
            Box::pin(async { panic!("dispatcher must not run for preflight") })
        }));
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/anything")
            .header("Origin", "https://app.test")
            .body(Body::empty())
            .unwrap();

        let response = (*handler)(request).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn listed_origin_is_echoed_back() {
        let config = CorsConfig {
            allow_origins: vec!["https://good.test".to_string()],
            ..CorsConfig::default()
        };
        let handler = Cors::new(config).wrap(terminal());

        let allowed = (*handler)(get(Some("https://good.test"))).await;
        assert_eq!(
            allowed.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://good.test"
        );

        let denied = (*handler)(get(Some("https://evil.test"))).await;
        assert!(!denied.headers().contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn credentials_and_exposed_headers_are_advertised() {
        let config = CorsConfig {
            allow_credentials: true,
            expose_headers: vec!["X-Request-Id".to_string()],
            ..CorsConfig::default()
        };
        let handler = Cors::new(config).wrap(terminal());
        let response = (*handler)(get(None)).await;

        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(
            response.headers()[ACCESS_CONTROL_EXPOSE_HEADERS],
            "X-Request-Id"
        );
    }
}
