//! Plain regions: half-open intervals with attached values.

use text_size::{TextRange, TextSize};

use crate::base::Payload;

/// An immutable half-open interval `[start, end)` over byte offsets, plus an
/// attached value and the region's index in its owning collection.
#[derive(Clone, Debug, PartialEq)]
pub struct Region<T> {
    value: T,
    range: TextRange,
    index: u32,
}

impl<T> Region<T> {
    pub(crate) fn new(value: T, range: TextRange, index: u32) -> Self {
        Self {
            value,
            range,
            index,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn range(&self) -> TextRange {
        self.range
    }

    pub fn start(&self) -> TextSize {
        self.range.start()
    }

    pub fn end(&self) -> TextSize {
        self.range.end()
    }

    /// Width of the region in bytes.
    pub fn len(&self) -> TextSize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Position of this region in creation (ascending-start) order.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Half-open containment: `start <= offset < end`.
    pub fn contains(&self, offset: TextSize) -> bool {
        self.range.contains(offset)
    }
}

/// An ordered collection of [`Region`]s for one key.
///
/// Regions are totally ordered by start offset. They may nest but must not
/// partially overlap; strategies that emit partially overlapping regions are
/// buggy and are caught by a debug assertion against the previous region.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SemanticRegions<T> {
    regions: Vec<Region<T>>,
}

impl<T: Payload> SemanticRegions<T> {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, value: T, range: TextRange) {
        if let Some(last) = self.regions.last() {
            debug_assert!(range.start() >= last.start(), "regions emitted out of order");
            debug_assert!(
                range.end() <= last.end() || range.start() >= last.end(),
                "partially overlapping regions: {:?} vs {:?}",
                last.range(),
                range
            );
        }
        let index = self.regions.len() as u32;
        self.regions.push(Region::new(value, range, index));
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&Region<T>> {
        self.regions.get(index as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region<T>> {
        self.regions.iter()
    }

    /// The narrowest region containing `offset`.
    ///
    /// Because regions nest without partial overlap, the containing region
    /// with the greatest start offset is the innermost one, so a backward
    /// scan from the insertion point finds it first.
    pub fn at_offset(&self, offset: TextSize) -> Option<&Region<T>> {
        let cut = self.regions.partition_point(|r| r.start() <= offset);
        self.regions[..cut].iter().rev().find(|r| r.contains(offset))
    }

    /// The last region starting at or before `offset`, whether or not it
    /// contains it. Useful for completion-style "what came before here"
    /// queries.
    pub fn nearest_preceding(&self, offset: TextSize) -> Option<&Region<T>> {
        let cut = self.regions.partition_point(|r| r.start() <= offset);
        self.regions[..cut].last()
    }

    /// Order-preserving union of two collections for the same key.
    ///
    /// If either side is empty the other is returned unchanged; otherwise
    /// entries are merged in ascending start order and reindexed.
    pub fn combine(&self, other: &Self) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        let mut merged = Self::new();
        let mut a = self.regions.iter().peekable();
        let mut b = other.regions.iter().peekable();
        loop {
            let take_a = match (a.peek(), b.peek()) {
                (Some(ra), Some(rb)) => ra.start() <= rb.start(),
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let region = if take_a { a.next() } else { b.next() };
            if let Some(region) = region {
                merged.push(region.value.clone(), region.range);
            }
        }
        merged
    }
}
