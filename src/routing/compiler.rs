//! Route compilation: config specs into matchable rules.
//!
//! Compilation is fail-fast. The first broken route aborts the whole pass
//! and the error carries the route's position and pattern so the report
//! points straight at the config file.

use std::path::Path;

use axum::http::Method;
use thiserror::Error;

use crate::config::schema::RouteSpec;
use crate::routing::rule::{
    HeaderPredicate, PathPattern, ResponseHeader, Rule, RuleSet, ValuePattern,
};
use crate::template::{Engine, TemplateError};

/// Error compiling one route.
#[derive(Debug, Error)]
#[error("failed to compile route {index} ({verb} {path}): {cause}")]
pub struct CompileError {
    pub index: usize,
    pub verb: String,
    pub path: String,
    #[source]
    pub cause: RuleError,
}

/// What went wrong inside a single route.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid path pattern: {0}")]
    PathRegex(#[from] regex::Error),

    #[error("invalid regex for matched header {name:?}: {source}")]
    HeaderRegex {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid HTTP verb {0:?}")]
    Verb(String),

    #[error("either 'template' or 'template_file' must be specified")]
    MissingTemplate,

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Compiles route specs into a rule set plus the template engine holding
/// every template the rules reference.
pub struct RuleCompiler {
    engine: Engine,
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self {
            engine: Engine::new(),
        }
    }

    /// Compiles all routes in config order. Consumes the compiler so a
    /// failed pass cannot leak a half-populated engine.
    pub fn compile(mut self, specs: &[RouteSpec]) -> Result<(RuleSet, Engine), CompileError> {
        let mut rules = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            let rule = self
                .compile_route(index, spec)
                .map_err(|cause| CompileError {
                    index,
                    verb: spec.normalized_verb(),
                    path: spec.path.clone(),
                    cause,
                })?;
            tracing::debug!(
                index,
                pattern = %rule.pattern,
                method = %rule.verb,
                is_regex = rule.path.is_regex(),
                template_source = %rule.template_source,
                "compiled route"
            );
            rules.push(rule);
        }
        Ok((RuleSet::new(rules), self.engine))
    }

    fn compile_route(&mut self, index: usize, spec: &RouteSpec) -> Result<Rule, RuleError> {
        let verb = Method::from_bytes(spec.normalized_verb().as_bytes())
            .map_err(|_| RuleError::Verb(spec.verb.clone()))?;
        let path = PathPattern::parse(&spec.path)?;

        let mut headers = Vec::with_capacity(spec.match_headers.len());
        for (name, value) in &spec.match_headers {
            let expected = ValuePattern::parse(value).map_err(|source| RuleError::HeaderRegex {
                name: name.clone(),
                source,
            })?;
            headers.push(HeaderPredicate::new(name, expected));
        }

        let template_name = format!("route_{}_{}_{}", index, verb, sanitize(&spec.path));
        let template_source = match (&spec.template, &spec.template_file) {
            (Some(text), _) if !text.trim().is_empty() => {
                self.engine.compile_inline(&template_name, text)?;
                "inline".to_string()
            }
            (_, Some(file)) if !file.trim().is_empty() => {
                self.engine.compile_file(&template_name, Path::new(file))?;
                file.clone()
            }
            _ => return Err(RuleError::MissingTemplate),
        };

        let mut response_headers = Vec::with_capacity(spec.response_headers.len());
        for (name, template) in &spec.response_headers {
            let header_template = format!("hdr_{}_{}", index, sanitize(name));
            self.engine.compile_inline(&header_template, template)?;
            response_headers.push(ResponseHeader {
                name: name.clone(),
                template_name: header_template,
            });
        }

        Ok(Rule {
            pattern: spec.path.clone(),
            verb,
            path,
            headers,
            template_name,
            template_source,
            response_headers,
        })
    }
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new()
    }
}

// Template names must be unique per registry and readable in error output.
fn sanitize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}
