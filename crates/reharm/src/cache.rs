use std::collections::HashMap;
use std::ops::Range;

use crate::engine::RankedSuggestion;

/// Ranked suggestions memoized per `[start, end)` window.
///
/// Owned by one session. Entries hold the unfiltered ranking at the
/// session's default complexity; callers filter on the way out.
#[derive(Debug, Default)]
pub struct SuggestionCache {
    entries: HashMap<(usize, usize), Vec<RankedSuggestion>>,
    hits: u64,
    misses: u64,
}

impl SuggestionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a window, counting the hit or miss.
    pub fn get(&mut self, start: usize, end: usize) -> Option<&[RankedSuggestion]> {
        match self.entries.get(&(start, end)) {
            Some(ranked) => {
                self.hits += 1;
                Some(ranked.as_slice())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, start: usize, end: usize, ranked: Vec<RankedSuggestion>) {
        self.entries.insert((start, end), ranked);
    }

    /// Drop every window that overlaps `positions`. Returns how many went.
    pub fn invalidate_overlapping(&mut self, positions: Range<usize>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|&(start, end), _| end <= positions.start || start >= positions.end);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
