//! Range decomposition
//!
//! A full-range query over `[from, till]` at some depth touches every
//! depth-aligned slot in between. Rather than reading each slot, the range
//! is covered by the coarsest buckets that fit entirely inside it:
//!
//! ```text
//! 2010-05-14 22:00 .. 2010-07-02 01:00 at hour depth
//!
//!   hours  2010051422 2010051423
//!   days   20100515 .. 20100531
//!   month  201006
//!   day    20100701
//!   hours  2010070200 2010070201
//! ```
//!
//! In compact mode a run of fine buckets that fills most of its parent is
//! swapped for the parent (`add`) minus the missing slots (`rem`).

use crate::keys::Resolution;
use chrono::{DateTime, Utc};

/// One stored bucket: aligned start plus the resolution it is keyed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub resolution: Resolution,
}

impl Bucket {
    pub fn new(start: DateTime<Utc>, resolution: Resolution) -> Self {
        Bucket { start, resolution }
    }

    /// Date token this bucket is stored under
    pub fn token(&self) -> String {
        self.resolution.token(self.start)
    }

    /// Start of the following bucket
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.resolution.advance(self.start)
    }
}

/// Buckets to read (`add`) and buckets whose members are excluded (`rem`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketSet {
    pub add: Vec<Bucket>,
    pub rem: Vec<Bucket>,
}

/// Cover the depth slots from `trunc(from)` through `trunc(till)`.
///
/// Exact mode never produces `rem` buckets.
pub fn full_range(
    from: DateTime<Utc>,
    till: DateTime<Utc>,
    depth: Resolution,
    compact: bool,
) -> Vec<BucketSet> {
    if from > till {
        return Vec::new();
    }
    let start = depth.truncate(from);
    let Some(end) = depth.advance(depth.truncate(till)) else {
        return Vec::new();
    };

    let mut buckets = Vec::new();
    cover(start, end, Resolution::Year, depth, &mut buckets);

    runs(&buckets)
        .into_iter()
        .map(|run| if compact { compact_run(run) } else { exact_run(run) })
        .collect()
}

/// Aligned slot starts at `interval` from `trunc(from)` through `till`
pub fn intervals(
    from: DateTime<Utc>,
    till: DateTime<Utc>,
    interval: Resolution,
) -> Vec<DateTime<Utc>> {
    let mut slots = Vec::new();
    if from > till {
        return slots;
    }
    let mut slot = interval.truncate(from);
    while slot <= till {
        slots.push(slot);
        match interval.advance(slot) {
            Some(next) => slot = next,
            None => break,
        }
    }
    slots
}

/// Emit buckets covering `[start, end)` in chronological order, using
/// `res` or finer. Both bounds are aligned to `depth`.
fn cover(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    res: Resolution,
    depth: Resolution,
    out: &mut Vec<Bucket>,
) {
    if start >= end {
        return;
    }
    if res >= depth {
        push_slots(start, end, depth, out);
        return;
    }
    let Some(finer) = res.finer() else {
        push_slots(start, end, res, out);
        return;
    };

    match res.ceil(start) {
        Some(inner_start) if inner_start < res.truncate(end) => {
            let inner_end = res.truncate(end);
            cover(start, inner_start, finer, depth, out);
            push_slots(inner_start, inner_end, res, out);
            cover(inner_end, end, finer, depth, out);
        }
        _ => cover(start, end, finer, depth, out),
    }
}

fn push_slots(start: DateTime<Utc>, end: DateTime<Utc>, res: Resolution, out: &mut Vec<Bucket>) {
    let mut slot = start;
    while slot < end {
        out.push(Bucket::new(slot, res));
        match res.advance(slot) {
            Some(next) => slot = next,
            None => break,
        }
    }
}

/// Split into runs of same-resolution buckets sharing one parent bucket
fn runs(buckets: &[Bucket]) -> Vec<Vec<Bucket>> {
    let mut runs: Vec<Vec<Bucket>> = Vec::new();
    for bucket in buckets {
        let same_run = runs.last().and_then(|run| run.last()).is_some_and(|last| {
            last.resolution == bucket.resolution && parent_of(last) == parent_of(bucket)
        });
        match runs.last_mut() {
            Some(run) if same_run => run.push(*bucket),
            _ => runs.push(vec![*bucket]),
        }
    }
    runs
}

fn parent_of(bucket: &Bucket) -> Option<Bucket> {
    bucket
        .resolution
        .coarser()
        .map(|res| Bucket::new(res.truncate(bucket.start), res))
}

fn exact_run(run: Vec<Bucket>) -> BucketSet {
    BucketSet {
        add: run,
        rem: Vec::new(),
    }
}

/// Replace the run by its parent when fewer slots are missing from the
/// parent than the run holds
fn compact_run(run: Vec<Bucket>) -> BucketSet {
    let Some(first) = run.first().copied() else {
        return BucketSet::default();
    };
    let Some(parent) = parent_of(&first) else {
        return exact_run(run);
    };
    let Some(parent_end) = parent.end() else {
        return exact_run(run);
    };
    let total = first.resolution.slots_between(parent.start, parent_end);
    let excess = total.saturating_sub(run.len() as u64);
    if excess >= run.len() as u64 {
        return exact_run(run);
    }

    let mut slots = Vec::new();
    push_slots(parent.start, parent_end, first.resolution, &mut slots);
    let rem = slots.into_iter().filter(|slot| !run.contains(slot)).collect();
    BucketSet {
        add: vec![parent],
        rem,
    }
}
