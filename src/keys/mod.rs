//! Key addressing
//!
//! Value objects re-derived per operation; only their string renderings
//! persist in the store:
//!
//! - `Scope`: metric family namespace with an id sequence
//! - `Label`: hierarchical path with its ancestor chain
//! - `Resolution` / `RankDate`: time granularity and date tokens
//! - `Key`: canonical bucket ids plus the label index

mod date;
mod key;
mod label;
mod scope;

pub use date::{RankDate, Resolution};
pub use key::{Key, LABEL_INDEX};
pub use label::{Label, GROUP_SEPARATOR, KEY_LABELS};
pub use scope::{Scope, KEY_NEXT_ID};
