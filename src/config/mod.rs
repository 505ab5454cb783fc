//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (YAML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → MockConfig (validated, immutable)
//!     → compiled into a route table by the server
//!
//! On file change:
//!     watcher.rs reports the event
//!     → reload coordinator debounces, loads and compiles off-path
//!     → atomic swap of the active configuration snapshot
//!     → in-flight requests finish on the snapshot they started with
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::MockConfig;
pub use schema::RouteSpec;
