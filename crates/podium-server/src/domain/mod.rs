//! Domain layer: pure types shared across the server.

pub mod config;

pub use config::ServerConfig;
