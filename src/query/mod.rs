//! Read path
//!
//! `Query` describes what to read; `Finder` turns it into bucket reads.
//! Full-range queries go through the covering in `covering`; interval
//! queries read one bucket per slot.

pub mod covering;
mod finder;

pub use covering::{Bucket, BucketSet};
pub use finder::{Finder, Query, QueryOptions};
