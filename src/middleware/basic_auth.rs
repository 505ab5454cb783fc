//! HTTP basic authentication middleware.
//!
//! Challenges unauthenticated requests with 401 and a `WWW-Authenticate`
//! header. Path rules decide which requests are protected: with no
//! include list everything is protected except the excludes, otherwise a
//! request must match an include and no exclude. Rules use the same
//! literal-or-`/regex/` convention as route paths.

use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::middleware::{Handler, Middleware, StageError};
use crate::routing::rule::ValuePattern;

/// Basic auth middleware configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: String,
    pub realm: String,
    pub paths: PathRules,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PathRules {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

struct Inner {
    username: String,
    password: String,
    challenge: Option<HeaderValue>,
    include: Vec<ValuePattern>,
    exclude: Vec<ValuePattern>,
}

pub struct BasicAuth {
    inner: Arc<Inner>,
}

impl BasicAuth {
    pub fn new(config: BasicAuthConfig) -> Result<Self, StageError> {
        if config.username.is_empty() {
            return Err(StageError::MissingUsername);
        }
        if config.password.is_empty() {
            return Err(StageError::MissingPassword);
        }

        let realm = if config.realm.is_empty() {
            "Restricted Area".to_string()
        } else {
            config.realm
        };

        Ok(Self {
            inner: Arc::new(Inner {
                username: config.username,
                password: config.password,
                challenge: HeaderValue::from_str(&format!("Basic realm=\"{realm}\"")).ok(),
                include: compile_rules(&config.paths.include)?,
                exclude: compile_rules(&config.paths.exclude)?,
            }),
        })
    }
}

fn compile_rules(patterns: &[String]) -> Result<Vec<ValuePattern>, StageError> {
    patterns
        .iter()
        .map(|pattern| {
            ValuePattern::parse(pattern).map_err(|source| StageError::PathPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

impl Inner {
    fn protects(&self, path: &str) -> bool {
        if self.exclude.iter().any(|rule| rule.matches(path)) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|rule| rule.matches(path))
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
            return false;
        };
        let Some(encoded) = value.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = BASE64.decode(encoded) else {
            return false;
        };
        let Ok(credentials) = String::from_utf8(decoded) else {
            return false;
        };
        match credentials.split_once(':') {
            Some((user, pass)) => user == self.username && pass == self.password,
            None => false,
        }
    }

    fn challenge_response(&self) -> Response {
        let mut response = (StatusCode::UNAUTHORIZED, "401 Unauthorized").into_response();
        if let Some(challenge) = &self.challenge {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, challenge.clone());
        }
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

impl Middleware for BasicAuth {
    fn name(&self) -> &'static str {
        "basicauth"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let inner = Arc::clone(&self.inner);
        Arc::new(move |request| {
            let next = Arc::clone(&next);
            let inner = Arc::clone(&inner);
            Box::pin(async move {
                if !inner.protects(request.uri().path()) {
                    return (*next)(request).await;
                }
                if inner.authorized(request.headers()) {
                    return (*next)(request).await;
                }
                inner.challenge_response()
            })
        })
    }
}
