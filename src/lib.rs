//! Configuration-Driven Mock HTTP Server Library

pub mod bounded;
pub mod config;
pub mod lifecycle;
pub mod middleware;
pub mod routing;
pub mod server;
pub mod template;

pub use config::schema::MockConfig;
pub use lifecycle::Shutdown;
pub use server::Server;
