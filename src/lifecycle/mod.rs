//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain in-flight → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One broadcast channel fans the shutdown signal out to server,
//!   watcher and coordinator tasks
//! - Config reload is file-watch driven and independent of signals, so
//!   neither can block the other
//! - Shutdown drain is deadline-bounded: forced exit after the
//!   configured timeout

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
