//! Compiled route rules and request matching.
//!
//! # Responsibilities
//! - Decide whether a request matches a rule (verb, then path, then headers)
//! - Extract named captures from regex paths
//! - Hold the response recipe (template names, response headers) for the
//!   dispatcher
//!
//! # Design Decisions
//! - Conditions are checked cheapest first: verb, path, headers
//! - Path regexes must match the full path; header regexes match anywhere
//!   in the value
//! - A request missing a matched header never matches the rule
//! - First match wins (config order)

use std::collections::HashMap;

use axum::http::{HeaderMap, Method};
use regex::Regex;

/// Named captures extracted from a regex path match.
pub type PathParams = HashMap<String, String>;

/// Returns the regex body when a config value uses the `/.../` convention:
/// a leading and trailing slash around a non-empty body.
pub fn regex_source(value: &str) -> Option<&str> {
    if value.len() > 2 && value.starts_with('/') && value.ends_with('/') {
        Some(&value[1..value.len() - 1])
    } else {
        None
    }
}

/// An expected value for a header or similar field: exact string, or a
/// regex searched within the observed value.
#[derive(Debug, Clone)]
pub enum ValuePattern {
    Literal(String),
    Regex(Regex),
}

impl ValuePattern {
    pub fn parse(value: &str) -> Result<Self, regex::Error> {
        match regex_source(value) {
            Some(source) => Ok(Self::Regex(Regex::new(source)?)),
            None => Ok(Self::Literal(value.to_string())),
        }
    }

    pub fn matches(&self, observed: &str) -> bool {
        match self {
            Self::Literal(expected) => expected == observed,
            Self::Regex(re) => re.is_match(observed),
        }
    }
}

/// A request path pattern: exact string, or a regex that must match the
/// full path.
#[derive(Debug, Clone)]
pub enum PathPattern {
    Literal(String),
    Regex(Regex),
}

impl PathPattern {
    /// Parses a config path value. Regex patterns are anchored so that a
    /// partial match never selects a route.
    pub fn parse(value: &str) -> Result<Self, regex::Error> {
        match regex_source(value) {
            Some(source) => {
                let anchored = format!("^(?:{})$", source);
                Ok(Self::Regex(Regex::new(&anchored)?))
            }
            None => Ok(Self::Literal(value.to_string())),
        }
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, Self::Regex(_))
    }

    /// Matches the whole request path. Regex patterns yield their named
    /// captures; literal patterns yield an empty map.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        match self {
            Self::Literal(expected) => (expected == path).then(PathParams::new),
            Self::Regex(re) => {
                let caps = re.captures(path)?;
                let mut params = PathParams::new();
                for name in re.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        params.insert(name.to_string(), m.as_str().to_string());
                    }
                }
                Some(params)
            }
        }
    }
}

/// A header that must be present on the request with a matching value.
#[derive(Debug, Clone)]
pub struct HeaderPredicate {
    /// Header name, stored lowercase.
    pub name: String,
    pub expected: ValuePattern,
}

impl HeaderPredicate {
    pub fn new(name: &str, expected: ValuePattern) -> Self {
        Self {
            name: name.trim().to_ascii_lowercase(),
            expected,
        }
    }

    /// Only the first value of a repeated header is examined. A request
    /// without the header never matches.
    pub fn matches(&self, headers: &HeaderMap) -> bool {
        headers
            .get(self.name.as_str())
            .and_then(|value| value.to_str().ok())
            .map(|value| self.expected.matches(value))
            .unwrap_or(false)
    }
}

/// A response header to set, rendered from a registered template.
#[derive(Debug, Clone)]
pub struct ResponseHeader {
    pub name: String,
    pub template_name: String,
}

/// One compiled route: the request shape to match and the response recipe.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Original path value from the config, for logs.
    pub pattern: String,
    pub verb: Method,
    pub path: PathPattern,
    pub headers: Vec<HeaderPredicate>,
    /// Name the body template is registered under in the engine.
    pub template_name: String,
    /// Where the body template came from: "inline" or a file path.
    pub template_source: String,
    pub response_headers: Vec<ResponseHeader>,
}

impl Rule {
    /// Checks the rule against a request, returning path captures on a hit.
    pub fn matches(&self, method: &Method, path: &str, headers: &HeaderMap) -> Option<PathParams> {
        if *method != self.verb {
            return None;
        }
        let params = self.path.matches(path)?;
        if !self.headers.iter().all(|h| h.matches(headers)) {
            return None;
        }
        Some(params)
    }
}

/// All compiled rules, in config order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Scans rules in config order and returns the first hit.
    pub fn find_match(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
    ) -> Option<(&Rule, PathParams)> {
        self.rules
            .iter()
            .find_map(|rule| rule.matches(method, path, headers).map(|p| (rule, p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(verb: &str, path: &str) -> Rule {
        Rule {
            pattern: path.to_string(),
            verb: Method::from_bytes(verb.as_bytes()).unwrap(),
            path: PathPattern::parse(path).unwrap(),
            headers: Vec::new(),
            template_name: "t".to_string(),
            template_source: "inline".to_string(),
            response_headers: Vec::new(),
        }
    }

    #[test]
    fn regex_source_requires_both_slashes_and_a_body() {
        assert_eq!(regex_source("/^/user/.+$/"), Some("^/user/.+$"));
        assert_eq!(regex_source("/api/users"), None);
        assert_eq!(regex_source("/"), None);
        assert_eq!(regex_source("//"), None);
        assert_eq!(regex_source("/x/"), Some("x"));
        assert_eq!(regex_source("x/"), None);
    }

    #[test]
    fn literal_path_is_exact() {
        let pattern = PathPattern::parse("/api/users").unwrap();
        assert!(pattern.matches("/api/users").is_some());
        assert!(pattern.matches("/api/users/7").is_none());
        assert!(pattern.matches("/api").is_none());
        assert!(!pattern.is_regex());
    }

    #[test]
    fn regex_path_must_match_the_full_path() {
        let pattern = PathPattern::parse("/^/user/(?P<name>[^/]+)$/").unwrap();
        let params = pattern.matches("/user/alice").unwrap();
        assert_eq!(params.get("name").map(String::as_str), Some("alice"));
        assert!(pattern.matches("/user/alice/more").is_none());
        assert!(pattern.matches("/prefix/user/alice").is_none());
    }

    #[test]
    fn unanchored_regex_path_is_anchored_on_compile() {
        let pattern = PathPattern::parse("//status/\\d+/").unwrap();
        assert!(pattern.matches("/status/42").is_some());
        assert!(pattern.matches("/status/42/extra").is_none());
    }

    #[test]
    fn header_value_regex_matches_anywhere() {
        let expected = ValuePattern::parse("/^Bearer .+$/").unwrap();
        assert!(expected.matches("Bearer abc123"));
        assert!(!expected.matches("Basic abc123"));

        let partial = ValuePattern::parse("/json/").unwrap();
        assert!(partial.matches("application/json; charset=utf-8"));
    }

    #[test]
    fn header_predicate_is_case_insensitive_on_names() {
        let predicate = HeaderPredicate::new(
            "Authorization",
            ValuePattern::parse("/^Bearer .+$/").unwrap(),
        );
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer tok".parse().unwrap());
        assert!(predicate.matches(&headers));
    }

    #[test]
    fn missing_header_never_matches() {
        let predicate = HeaderPredicate::new("X-Required", ValuePattern::parse("yes").unwrap());
        assert!(!predicate.matches(&HeaderMap::new()));
    }

    #[test]
    fn rule_requires_verb_path_and_headers() {
        let mut r = rule("POST", "/api/users");
        r.headers.push(HeaderPredicate::new(
            "Content-Type",
            ValuePattern::parse("/json/").unwrap(),
        ));

        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());

        assert!(r.matches(&Method::POST, "/api/users", &headers).is_some());
        assert!(r.matches(&Method::GET, "/api/users", &headers).is_none());
        assert!(r.matches(&Method::POST, "/api/user", &headers).is_none());
        assert!(r
            .matches(&Method::POST, "/api/users", &HeaderMap::new())
            .is_none());
    }

    #[test]
    fn first_match_wins() {
        let rules = RuleSet::new(vec![
            rule("GET", "/^/user/(?P<name>.+)$/"),
            rule("GET", "/user/alice"),
        ]);
        let (hit, params) = rules
            .find_match(&Method::GET, "/user/alice", &HeaderMap::new())
            .unwrap();
        assert_eq!(hit.pattern, "/^/user/(?P<name>.+)$/");
        assert_eq!(params.get("name").map(String::as_str), Some("alice"));
    }
}
