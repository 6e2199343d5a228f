//! # NEM API Integration Module
//!
//! Source A: the NEM dashboard JSON API.
//!
//! - **`apicall`**: the low-level client (API key header, envelope
//!   unwrapping, cancellation, logging).
//! - **`dashboard`**: typed endpoint methods returning normalised entities.

/// Low-level client for the NEM dashboard API.
pub mod apicall;
/// Typed NEM dashboard endpoints.
pub mod dashboard;

pub use dashboard::{NemApi, Timescale};
