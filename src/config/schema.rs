//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the mock
//! server. All types derive Serde traits for deserialization from YAML
//! config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the mock server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MockConfig {
    /// Route definitions mapping requests to response templates.
    pub routes: Vec<RouteSpec>,

    /// Middleware applied around every request, in listed order.
    pub middleware: MiddlewareConfig,

    /// Server-level settings (timeouts, body limits).
    pub server: ServerConfig,
}

/// One route: a request shape to match and the response to produce.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouteSpec {
    /// Request path to match. Values of the form `/.../` (leading and
    /// trailing slash around a non-empty body) are treated as regular
    /// expressions; anything else is an exact match.
    pub path: String,

    /// HTTP verb to match (case-insensitive in config).
    pub verb: String,

    /// Inline response template body.
    pub template: Option<String>,

    /// Path to a file containing the response template. Exactly one of
    /// `template` or `template_file` must be set.
    pub template_file: Option<String>,

    /// Request headers that must also match, name to expected value.
    /// Values use the same `/.../` regex convention as `path`.
    #[serde(rename = "matchHeaders")]
    pub match_headers: BTreeMap<String, String>,

    /// Headers set on the response. Values are templates rendered against
    /// the same context as the body.
    #[serde(rename = "responseHeaders")]
    pub response_headers: BTreeMap<String, String>,
}

impl RouteSpec {
    /// Verb normalized to the uppercase form used for matching.
    pub fn normalized_verb(&self) -> String {
        self.verb.trim().to_ascii_uppercase()
    }
}

/// Middleware section of the config file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Middleware entries, outermost first.
    pub enabled: Vec<MiddlewareSpec>,
}

/// One middleware entry: a type tag plus a free-form settings block that
/// the named middleware decodes itself.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MiddlewareSpec {
    /// Middleware discriminator: "cors", "logger", "basicauth" or "timeout".
    #[serde(rename = "type")]
    pub kind: String,

    /// Type-specific settings. May be omitted, in which case the
    /// middleware's defaults apply.
    pub config: serde_yaml::Value,
}

/// Server-level settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Timeout configuration.
    pub timeouts: ServerTimeouts,

    /// Maximum request body size buffered per request, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            timeouts: ServerTimeouts::default(),
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerTimeouts {
    /// Upper bound on rendering a single response, in seconds.
    pub request_secs: u64,

    /// How long graceful shutdown waits for in-flight requests, in seconds.
    pub shutdown_secs: u64,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = MockConfig::default();
        assert!(config.routes.is_empty());
        assert!(config.middleware.enabled.is_empty());
        assert_eq!(config.server.timeouts.request_secs, 30);
        assert_eq!(config.server.timeouts.shutdown_secs, 30);
        assert_eq!(config.server.max_body_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn parses_full_document() {
        let yaml = r#"
routes:
  - path: /api/users
    verb: get
    template: '{"users": []}'
    matchHeaders:
      Accept: application/json
    responseHeaders:
      X-Request-Id: "{{uuid}}"
  - path: /^/user/(?P<name>[^/]+)$/
    verb: GET
    template_file: templates/user.hbs
middleware:
  enabled:
    - type: cors
    - type: basicauth
      config:
        username: admin
        password: s3cret
server:
  timeouts:
    request_secs: 5
  max_body_bytes: 1024
"#;
        let config: MockConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.routes[0].normalized_verb(), "GET");
        assert_eq!(
            config.routes[0].match_headers.get("Accept").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(
            config.routes[1].template_file.as_deref(),
            Some("templates/user.hbs")
        );
        assert_eq!(config.middleware.enabled.len(), 2);
        assert_eq!(config.middleware.enabled[0].kind, "cors");
        assert!(config.middleware.enabled[0].config.is_null());
        assert_eq!(config.server.timeouts.request_secs, 5);
        assert_eq!(config.server.timeouts.shutdown_secs, 30);
        assert_eq!(config.server.max_body_bytes, 1024);
    }
}
