//! Minimal covering set of key intervals
//!
//! A transaction's coordinator remembers every key span the transaction has
//! touched so its intents can be resolved when it finishes. Intervals that
//! overlap or abut are coalesced on insertion, so the set never holds more
//! entries than the number of disjoint, non-adjacent covering intervals.

use strata_core::{Key, KeyRange};

/// Sorted, coalesced set of half-open key intervals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRanges {
    /// Sorted by start; no two entries overlap or abut
    ranges: Vec<KeyRange>,
}

impl KeyRanges {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `range`, merging it with every interval it overlaps or touches
    pub fn add(&mut self, range: KeyRange) {
        let mut merged = range;
        // First entry that could touch `merged`: the first whose end is >= start.
        let first = self.ranges.partition_point(|r| r.end < merged.start);
        let mut last = first;
        while last < self.ranges.len() && self.ranges[last].overlaps_or_abuts(&merged) {
            let r = &self.ranges[last];
            if r.start < merged.start {
                merged.start = r.start.clone();
            }
            if r.end > merged.end {
                merged.end = r.end.clone();
            }
            last += 1;
        }
        self.ranges.splice(first..last, std::iter::once(merged));
    }

    /// Add the span a request addresses: a point when `end` is `None`
    pub fn add_span(&mut self, key: &Key, end: Option<&Key>) {
        self.add(KeyRange::from_span(key, end));
    }

    /// Number of disjoint intervals
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// True when nothing was added
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// True when `key` is covered
    pub fn contains(&self, key: &Key) -> bool {
        let idx = self.ranges.partition_point(|r| r.end <= *key);
        self.ranges.get(idx).map_or(false, |r| r.contains(key))
    }

    /// Intervals in key order
    pub fn iter(&self) -> impl Iterator<Item = &KeyRange> {
        self.ranges.iter()
    }

    /// Intervals in key order, by value
    pub fn to_vec(&self) -> Vec<KeyRange> {
        self.ranges.clone()
    }
}
