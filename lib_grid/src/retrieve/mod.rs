//! # Data Retrieval Module
//!
//! Generic HTTP plumbing shared by the market source clients: base-URL
//! joining, default headers, a fixed request timeout and bounded retries for
//! transient server errors only. Source clients build on this and focus on
//! envelopes, parsing and logging.

#![forbid(unsafe_code)]

/// Generic HTTP API client with retry middleware for resilient network requests.
pub mod ky_http;

/// Tagged fetch results and the misuse error type.
pub mod outcome;
