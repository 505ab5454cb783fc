//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (verb, path, headers)
//!     → rule.rs (evaluate rules in config order)
//!     → Return: matched Rule + path captures, or NoMatch
//!
//! Route Compilation (at startup and on reload):
//!     RouteSpec[]
//!     → Compile path/header patterns and templates
//!     → Freeze as immutable RuleSet + Engine
//! ```
//!
//! # Design Decisions
//! - Rules compiled up front, immutable at runtime
//! - Deterministic: same input always matches same rule
//! - First match wins (config order)

pub mod compiler;
pub mod rule;

pub use compiler::{CompileError, RuleCompiler};
pub use rule::{PathParams, Rule, RuleSet};
