//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the core runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Core shared primitives for the VCM workspace.
//! This crate exposes configuration loading, logging setup, and the
//! credential helpers used by the relay and its tooling.

pub mod auth;
pub mod config;
pub mod logging;

pub use auth::{hash_password, verify_password, Role};
pub use config::{
    ApiConfig, AppConfig, AuthConfig, LoadedAppConfig, LoggingConfig, MetricsConfig,
    StorageConfig, UserConfig,
};
pub use logging::{init_cli, init_tracing, LogFormat};

/// Crate version reported by binaries and the health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
