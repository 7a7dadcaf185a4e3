//! Reference model: resolved reference sets and unknown references.
//!
//! A reference is an occurrence of a name elsewhere in the file that matched
//! a canonical named region; an unknown reference is one whose name matched
//! nothing in the current file and is a candidate for cross-file resolution.

mod graph;

pub use graph::{GraphBuilder, ReferenceGraph};

use indexmap::IndexMap;
use smol_str::SmolStr;
use text_size::{TextRange, TextSize};

use crate::base::RegionKind;

/// One matched reference occurrence.
#[derive(Clone, Debug, PartialEq)]
pub struct NameReference<K> {
    name: SmolStr,
    canonical: SmolStr,
    range: TextRange,
    target: u32,
    referencer: Option<u32>,
    expected: Option<K>,
}

impl<K: RegionKind> NameReference<K> {
    pub(crate) fn new(
        name: SmolStr,
        canonical: SmolStr,
        range: TextRange,
        target: u32,
        referencer: Option<u32>,
        expected: Option<K>,
    ) -> Self {
        Self {
            name,
            canonical,
            range,
            target,
            referencer,
            expected,
        }
    }

    /// The name as written at the reference site.
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    /// The fully qualified name of the region this reference resolved to.
    /// Differs from [`NameReference::name`] when the site used a short name.
    pub fn canonical_name(&self) -> &SmolStr {
        &self.canonical
    }

    pub fn range(&self) -> TextRange {
        self.range
    }

    /// Index of the referenced canonical named region.
    pub fn target(&self) -> u32 {
        self.target
    }

    /// Index of the named region containing this occurrence, when the
    /// occurrence falls inside one.
    pub fn referencer(&self) -> Option<u32> {
        self.referencer
    }

    /// The kind the reference site expected, when the strategy declared one.
    pub fn expected_kind(&self) -> Option<K> {
        self.expected
    }

    pub fn contains(&self, offset: TextSize) -> bool {
        self.range.contains(offset)
    }
}

/// All matched references collected under one reference-set key, grouped by
/// the canonical name they resolve to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReferenceSets<K> {
    refs: Vec<NameReference<K>>,
    by_target: IndexMap<SmolStr, Vec<u32>>,
}

impl<K: RegionKind> ReferenceSets<K> {
    pub fn new() -> Self {
        Self {
            refs: Vec::new(),
            by_target: IndexMap::new(),
        }
    }

    /// Append without touching the lookup map; callers run
    /// [`ReferenceSets::reindex`] once afterwards.
    pub(crate) fn push_raw(&mut self, reference: NameReference<K>) {
        self.refs.push(reference);
    }

    pub(crate) fn add(&mut self, reference: NameReference<K>) {
        let index = self.refs.len() as u32;
        self.by_target
            .entry(reference.canonical.clone())
            .or_default()
            .push(index);
        self.refs.push(reference);
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NameReference<K>> {
        self.refs.iter()
    }

    /// References resolving to the canonical name, in occurrence order.
    pub fn references_to(&self, name: &str) -> impl Iterator<Item = &NameReference<K>> {
        self.by_target
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.refs.get(i as usize))
    }

    pub fn has_references_to(&self, name: &str) -> bool {
        self.by_target.get(name).is_some_and(|v| !v.is_empty())
    }

    /// Canonical names that have at least one reference, in first-reference
    /// order.
    pub fn target_names(&self) -> impl Iterator<Item = &SmolStr> {
        self.by_target.keys()
    }

    /// The reference whose occurrence range contains `offset`.
    pub fn at_offset(&self, offset: TextSize) -> Option<&NameReference<K>> {
        self.refs.iter().find(|r| r.contains(offset))
    }

    pub(crate) fn reindex(&mut self) {
        self.by_target.clear();
        for (i, reference) in self.refs.iter().enumerate() {
            self.by_target
                .entry(reference.canonical.clone())
                .or_default()
                .push(i as u32);
        }
    }
}

/// A reference whose name did not match any canonical named region in the
/// current file.
#[derive(Clone, Debug, PartialEq)]
pub struct UnknownRef<K> {
    name: SmolStr,
    range: TextRange,
    expected: Option<K>,
    index: u32,
}

impl<K: RegionKind> UnknownRef<K> {
    pub(crate) fn new(name: SmolStr, range: TextRange, expected: Option<K>, index: u32) -> Self {
        Self {
            name,
            range,
            expected,
            index,
        }
    }

    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn range(&self) -> TextRange {
        self.range
    }

    /// The kind the reference site expected, when known.
    pub fn expected_kind(&self) -> Option<K> {
        self.expected
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Ordered unresolved reference candidates under one reference-set key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnknownRefs<K> {
    refs: Vec<UnknownRef<K>>,
}

impl<K: RegionKind> UnknownRefs<K> {
    pub fn new() -> Self {
        Self { refs: Vec::new() }
    }

    pub(crate) fn add(&mut self, name: SmolStr, range: TextRange, expected: Option<K>) {
        let index = self.refs.len() as u32;
        self.refs.push(UnknownRef::new(name, range, expected, index));
    }

    pub(crate) fn push_raw(&mut self, unknown: UnknownRef<K>) {
        self.refs.push(unknown);
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnknownRef<K>> {
        self.refs.iter()
    }

    pub fn get(&self, index: u32) -> Option<&UnknownRef<K>> {
        self.refs.get(index as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Kind {
        Rule,
    }

    impl RegionKind for Kind {
        fn ordinal(self) -> u16 {
            0
        }

        fn from_ordinal(ordinal: u16) -> Option<Self> {
            (ordinal == 0).then_some(Kind::Rule)
        }
    }

    fn range(start: u32, end: u32) -> TextRange {
        TextRange::new(start.into(), end.into())
    }

    #[test]
    fn test_references_grouped_by_canonical_name() {
        let mut sets = ReferenceSets::new();
        sets.add(NameReference::new(
            "b".into(),
            "a.b".into(),
            range(3, 4),
            1,
            Some(0),
            Some(Kind::Rule),
        ));
        sets.add(NameReference::new(
            "a.b".into(),
            "a.b".into(),
            range(9, 12),
            1,
            None,
            None,
        ));
        sets.add(NameReference::new(
            "c".into(),
            "c".into(),
            range(14, 15),
            2,
            Some(0),
            None,
        ));

        assert_eq!(sets.len(), 3);
        assert_eq!(sets.references_to("a.b").count(), 2);
        assert_eq!(sets.references_to("c").count(), 1);
        assert!(!sets.has_references_to("b"));
        let targets: Vec<&SmolStr> = sets.target_names().collect();
        assert_eq!(targets, vec!["a.b", "c"]);
    }

    #[test]
    fn test_at_offset() {
        let mut sets = ReferenceSets::<Kind>::new();
        sets.add(NameReference::new(
            "b".into(),
            "b".into(),
            range(3, 6),
            1,
            None,
            None,
        ));
        assert_eq!(sets.at_offset(4.into()).unwrap().name(), "b");
        assert!(sets.at_offset(6.into()).is_none());
    }

    #[test]
    fn test_unknown_refs_keep_order() {
        let mut unknowns = UnknownRefs::new();
        unknowns.add("x".into(), range(0, 1), Some(Kind::Rule));
        unknowns.add("y".into(), range(4, 5), None);

        let names: Vec<&SmolStr> = unknowns.iter().map(UnknownRef::name).collect();
        assert_eq!(names, vec!["x", "y"]);
        assert_eq!(unknowns.get(1).unwrap().index(), 1);
    }
}
