//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check each route declares a matchable shape and exactly one template source
//! - Reject malformed header names early
//!
//! # Design Decisions
//! - Validation is a pure function over the parsed config; regex syntax and
//!   template files are checked later by the rule compiler, which touches
//!   them anyway
//! - Stops at the first error so the report points at a single route

use thiserror::Error;

use crate::config::schema::{MockConfig, RouteSpec};

/// HTTP verbs accepted in route definitions.
pub const VALID_VERBS: [&str; 9] = [
    "GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "CONNECT", "TRACE",
];

/// Semantic error in a parsed configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("at least one route must be defined")]
    NoRoutes,

    #[error("route[{index}]: validation error in field \"{field}\": {message}")]
    Route {
        index: usize,
        field: &'static str,
        message: String,
    },
}

/// Checks a parsed configuration for semantic problems.
pub fn validate(config: &MockConfig) -> Result<(), ValidationError> {
    if config.routes.is_empty() {
        return Err(ValidationError::NoRoutes);
    }

    for (index, route) in config.routes.iter().enumerate() {
        validate_route(index, route)?;
    }

    Ok(())
}

fn validate_route(index: usize, route: &RouteSpec) -> Result<(), ValidationError> {
    let route_error = |field, message: String| ValidationError::Route {
        index,
        field,
        message,
    };

    if route.path.trim().is_empty() {
        return Err(route_error("path", "path cannot be empty".to_string()));
    }

    let verb = route.normalized_verb();
    if verb.is_empty() {
        return Err(route_error("verb", "HTTP verb cannot be empty".to_string()));
    }
    if !VALID_VERBS.contains(&verb.as_str()) {
        return Err(route_error(
            "verb",
            format!(
                "invalid HTTP verb \"{}\", must be one of: {}",
                verb,
                VALID_VERBS.join(", ")
            ),
        ));
    }

    let has_template = route
        .template
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty());
    let has_template_file = route
        .template_file
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty());
    if !has_template && !has_template_file {
        return Err(route_error(
            "template",
            "either 'template' or 'template_file' must be specified".to_string(),
        ));
    }
    if has_template && has_template_file {
        return Err(route_error(
            "template",
            "only one of 'template' or 'template_file' can be specified, not both".to_string(),
        ));
    }

    for name in route.match_headers.keys() {
        validate_header_name(name).map_err(|message| route_error("matchHeaders", message))?;
    }
    for name in route.response_headers.keys() {
        validate_header_name(name).map_err(|message| route_error("responseHeaders", message))?;
    }

    Ok(())
}

fn validate_header_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("header name cannot be empty".to_string());
    }
    for ch in trimmed.chars() {
        if !is_header_name_char(ch) {
            return Err(format!(
                "invalid character {:?} in header name \"{}\"",
                ch, name
            ));
        }
    }
    Ok(())
}

// RFC 7230 token characters.
fn is_header_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' | '^' | '_' | '`' | '|'
                | '~'
        )
}
