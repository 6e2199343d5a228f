//! # Electricity Market Sources Module
//!
//! Client implementations for the two upstream market feeds. Both follow the
//! same contract: every call returns a [`FetchOutcome`] (data, an expected
//! failure message, or cancellation), logs failures with the endpoint and
//! status, and never surfaces bad upstream data as an error.
//!
//! - **`nem`**: the NEM dashboard JSON API (API key, `{"data": ...}`
//!   envelopes, typed and normalised responses).
//! - **`wem`**: WEM CSV files (browser `Accept` header, tolerant CSV parsing).
//!
//! [`FetchOutcome`]: crate::retrieve::outcome::FetchOutcome

#![forbid(unsafe_code)]

/// Client for the NEM dashboard API.
pub mod nem;
/// Client for the WEM CSV files.
pub mod wem;
