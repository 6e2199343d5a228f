//! # WEM Data Integration Module
//!
//! Source B: CSV files published for the Western Australian market.
//!
//! - **`apicall`**: fetches one CSV with the required `Accept` header.
//! - **`tabular`**: header-row parsing with dynamic cell typing.
//! - **`infographic`**: one method per published file.

/// Low-level CSV client.
pub mod apicall;
/// WEM CSV endpoints.
pub mod infographic;
/// CSV parsing into loosely-typed rows.
pub mod tabular;

pub use infographic::WemApi;
