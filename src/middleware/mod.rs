//! Middleware subsystem.
//!
//! # Data Flow
//! ```text
//! config middleware.enabled[]
//!     → Chain::from_specs (decode each entry, build stages)
//!     → Chain::around(dispatcher) at startup and on every reload
//!     → Handler (outermost stage first, dispatcher innermost)
//! ```
//!
//! # Design Decisions
//! - Stages wrap a shared `Handler` function type instead of a tower stack
//!   so the whole pipeline can be rebuilt and swapped atomically on reload
//! - Config entries decode their own settings block; an unknown type fails
//!   the whole chain

pub mod basic_auth;
pub mod cors;
pub mod logger;
pub mod timeout;

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::schema::MiddlewareSpec;

/// A request handler: the dispatcher, possibly wrapped by middleware.
pub type Handler = Arc<dyn Fn(Request<Body>) -> BoxFuture<'static, Response> + Send + Sync>;

/// One stage that can wrap a handler with extra behavior.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;
    fn wrap(&self, next: Handler) -> Handler;
}

/// Error building the middleware chain from config.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("unknown middleware type {0:?}")]
    UnknownType(String),

    #[error("failed to create middleware {kind}: {source}")]
    Create {
        kind: String,
        #[source]
        source: StageError,
    },
}

/// What went wrong inside a single middleware entry.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("invalid config: {0}")]
    Decode(#[from] serde_yaml::Error),

    #[error("basic auth username is required")]
    MissingUsername,

    #[error("basic auth password is required")]
    MissingPassword,

    #[error("invalid path pattern {pattern:?}: {source}")]
    PathPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Ordered middleware stages built from config.
#[derive(Default)]
pub struct Chain {
    stages: Vec<Box<dyn Middleware>>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain").field("stages", &self.names()).finish()
    }
}

impl Chain {
    /// Builds the chain in config order. The first entry becomes the
    /// outermost stage.
    pub fn from_specs(specs: &[MiddlewareSpec]) -> Result<Self, MiddlewareError> {
        let mut stages: Vec<Box<dyn Middleware>> = Vec::with_capacity(specs.len());
        for spec in specs {
            stages.push(build_stage(spec)?);
        }
        Ok(Self { stages })
    }

    /// Wraps the innermost handler with every stage.
    pub fn around(&self, innermost: Handler) -> Handler {
        self.stages
            .iter()
            .rev()
            .fold(innermost, |next, stage| stage.wrap(next))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

fn build_stage(spec: &MiddlewareSpec) -> Result<Box<dyn Middleware>, MiddlewareError> {
    let kind = spec.kind.as_str();
    let wrap = |source| MiddlewareError::Create {
        kind: kind.to_string(),
        source,
    };
    match kind {
        "cors" => Ok(Box::new(cors::Cors::new(
            decode(&spec.config).map_err(wrap)?,
        ))),
        "logger" => Ok(Box::new(logger::RequestLogger::new(
            decode(&spec.config).map_err(wrap)?,
        ))),
        "basicauth" => Ok(Box::new(
            basic_auth::BasicAuth::new(decode(&spec.config).map_err(wrap)?).map_err(wrap)?,
        )),
        "timeout" => Ok(Box::new(timeout::RequestTimeout::new(
            decode(&spec.config).map_err(wrap)?,
        ))),
        other => Err(MiddlewareError::UnknownType(other.to_string())),
    }
}

fn decode<T>(value: &serde_yaml::Value) -> Result<T, StageError>
where
    T: DeserializeOwned + Default,
{
    if value.is_null() {
        return Ok(T::default());
    }
    Ok(serde_yaml::from_value(value.clone())?)
}
