//! # Core Data Layer
//!
//! The freshness-driven fetch and cache engine that sits between the source
//! clients and the consumers.
//!
//! ## Core Components:
//!
//! - **`store`**: reactive cells holding `{data, error, fetched_at, status}`
//!   per dataset. Consumers read and subscribe; they never write.
//!
//! - **`actions`**: the fetch orchestrator, one in-flight operation per cell
//!   with cancellation of the previous one, plus the freshness gate.
//!
//! - **`registry`**: the reference-counted poll registry and its fixed
//!   60 second tick.
//!
//! - **`datasets`**: the per-dataset read interface and the `FeedHub` that
//!   wires clients, transforms and cells together.

#![forbid(unsafe_code)]

/// Fetch orchestration and the freshness gate.
pub mod actions;
/// Dataset handles and the feed hub.
pub mod datasets;
/// Reference-counted poll registry.
pub mod registry;
/// Reactive store cells.
pub mod store;

// --- Public API Re-exports ---
pub use actions::{fetch_fn, should_fetch, should_fetch_at, FetchFn, Orchestrator, RunReport};
pub use datasets::{Dataset, FeedHub};
pub use registry::{PollRegistration, Poller, POLL_TICK};
pub use store::{Cell, CellId, CellState, CellStatus, Store, Subscription};
