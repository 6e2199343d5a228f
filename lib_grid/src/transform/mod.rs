//! # Transform Layer
//!
//! Pure normalisation of raw upstream payloads into one shared, region-tagged
//! schema. Same input, same output: no I/O, no shared state, no failure modes
//! for bad or unmapped data.
//!
//! - [`fields`]: ordered column-synonym resolution for tabular rows.
//! - [`fuel`]: canonical fuel categories, ordering and renewable share.
//! - [`entities`]: the normalised shapes held by store cells.
//! - [`wem`]: CSV-row transforms (fuel-mix join, pulse, daily averages,
//!   dispatch stacks, geographic join, DPV).
//! - [`nem`]: JSON record shapes of the NEM API and their mapping.

pub mod entities;
pub mod fields;
pub mod fuel;
pub mod nem;
pub mod periods;
pub mod wem;

pub use entities::*;
pub use fields::RawRow;
