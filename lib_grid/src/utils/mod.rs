//! # Utilities Module
//!
//! This module serves as a collection point for small, general-purpose helpers
//! that are used across the `lib_grid` crate.
//!
//! ## Contained Modules:
//!
//! - **`misc`**: Miscellaneous functions, currently the wall-clock helpers
//!   (`utils`) used by the store, the freshness gate and the logger.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Miscellaneous utility functions.
pub mod misc;
