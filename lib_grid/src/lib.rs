//! # lib_grid
//!
//! Fetch, normalise and cache layer for the NEM dashboard JSON API and the
//! WEM infographic CSV files. Each concern lives in its own module behind a
//! Cargo feature of the same name; `full` (the default) enables all of them.

#[cfg(feature = "configs")]
pub mod configs;
#[cfg(feature = "core")]
pub mod core;
#[cfg(feature = "loggers")]
pub mod loggers;
#[cfg(feature = "markets")]
pub mod markets;
#[cfg(feature = "retrieve")]
pub mod retrieve;
#[cfg(feature = "transform")]
pub mod transform;
#[cfg(feature = "utils")]
pub mod utils;

// Re-export the everyday entry points
#[cfg(feature = "configs")]
pub use crate::configs::{load_config, GridConfig};
#[cfg(feature = "core")]
pub use crate::core::{Dataset, FeedHub};
#[cfg(feature = "loggers")]
pub use crate::loggers::loggerlocal::*;
#[cfg(feature = "retrieve")]
pub use crate::retrieve::outcome::{FetchError, FetchOutcome, FetchResult};
#[cfg(feature = "utils")]
pub use crate::utils::misc::utils::*;
