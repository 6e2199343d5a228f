/// Wall-clock and formatting helpers.
pub mod utils;
