//! Result and mapping types
//!
//! - `Stats`: member→score mapping carrying the max-merge rule
//! - `Rank`: aggregated `Stats` plus the query window
//! - `Collection`: per-interval records with an overall `Rank`

mod collection;
mod stats;

pub use collection::{Collection, IntervalRecord};
pub use stats::{Rank, Stats};
