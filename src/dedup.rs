//! Deduplication helpers
//!
//! Feeds and cache snapshots keep their first-seen order, so deduplication
//! here never sorts.

use std::collections::HashSet;

/// Returns the values without duplicates, keeping the first occurrence
pub fn unique_preserve_order<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for value in values {
        let value = value.into();
        if seen.insert(value.clone()) {
            result.push(value);
        }
    }
    result
}

/// Bounded sample collector for report previews
#[derive(Debug, Clone)]
pub struct Preview<T> {
    items: Vec<T>,
    limit: usize,
}

impl<T: PartialEq> Preview<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            items: Vec::new(),
            limit,
        }
    }

    /// Records an example unless it is already present or the preview is full
    pub fn record(&mut self, item: T) {
        if self.items.len() < self.limit && !self.items.contains(&item) {
            self.items.push(item);
        }
    }

    pub fn into_inner(self) -> Vec<T> {
        self.items
    }
}
