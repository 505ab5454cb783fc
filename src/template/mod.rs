//! Response templating subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation:
//!     template text (inline or file)
//!     → engine.rs (compile, register under a unique name)
//!
//! Request:
//!     matched request (parts, buffered body, path captures)
//!     → context.rs (build serializable context)
//!     → engine.rs (render body + response header templates)
//! ```
//!
//! # Design Decisions
//! - One engine per configuration generation; templates never change after
//!   compilation
//! - Rendering is synchronous and runs on a blocking thread under a
//!   deadline owned by the dispatcher

pub mod context;
pub mod engine;
pub mod helpers;

pub use context::TemplateContext;
pub use engine::{Engine, TemplateError};
