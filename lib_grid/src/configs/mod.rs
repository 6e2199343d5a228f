//! # Configuration Modules
//!
//! Layered configuration for the feed layer, built with `more-config`:
//! built-in defaults, then whichever of the global, common, mode and platform
//! JSON files exist, then `.env` and environment overrides, bound into
//! [`GridConfig`].

/// Provides system-level configuration management.
pub mod config_sys;

pub use config_sys::{load_config, ConfigError, ConfigSources, FreshnessConfig, GridConfig};
