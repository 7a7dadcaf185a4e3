//! Named regions with canonical-first deduplication and nested scoping.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use text_size::{TextRange, TextSize};

use crate::base::RegionKind;

/// A region with a declared name and kind.
///
/// `name` is the effective (possibly delimiter-qualified) name; `short_name`
/// is the final path segment. Without scoping the two are identical.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedRegion<K> {
    name: SmolStr,
    short_name: SmolStr,
    kind: K,
    range: TextRange,
    index: u32,
}

impl<K: RegionKind> NamedRegion<K> {
    pub(crate) fn new(
        name: SmolStr,
        short_name: SmolStr,
        kind: K,
        range: TextRange,
        index: u32,
    ) -> Self {
        Self {
            name,
            short_name,
            kind,
            range,
            index,
        }
    }

    /// The effective name: delimiter-joined path of enclosing names when
    /// scoping is configured, the declared name otherwise.
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    /// The unqualified declared name.
    pub fn short_name(&self) -> &SmolStr {
        &self.short_name
    }

    pub fn kind(&self) -> K {
        self.kind
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

    /// Index of the canonical entry this region belongs to. For a duplicate
    /// this is the index of the canonical region it collided with.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn contains(&self, offset: TextSize) -> bool {
        self.range.contains(offset)
    }
}

/// Result of adding a named region to a collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameInsertion {
    /// First definition of this name; it became the canonical entry.
    Canonical(u32),
    /// The name already had a canonical entry; this occurrence went to the
    /// duplicates side-table under the canonical index.
    Duplicate(u32),
}

impl NameInsertion {
    /// Canonical index this insertion refers to, either way.
    pub fn index(self) -> u32 {
        match self {
            NameInsertion::Canonical(i) | NameInsertion::Duplicate(i) => i,
        }
    }
}

/// Ordered collection of named regions with at most one canonical entry per
/// name.
///
/// The first definition seen in traversal order is canonical; later
/// definitions of the same name are diverted into a duplicates side-table so
/// re-declarations stay inspectable (for "duplicate symbol" diagnostics)
/// without displacing the canonical entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NamedRegions<K> {
    regions: Vec<NamedRegion<K>>,
    by_name: FxHashMap<SmolStr, u32>,
    by_short: FxHashMap<SmolStr, u32>,
    duplicates: FxHashMap<SmolStr, Vec<NamedRegion<K>>>,
}

impl<K: RegionKind> NamedRegions<K> {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
            by_name: FxHashMap::default(),
            by_short: FxHashMap::default(),
            duplicates: FxHashMap::default(),
        }
    }

    pub(crate) fn add(
        &mut self,
        name: SmolStr,
        short_name: SmolStr,
        kind: K,
        range: TextRange,
    ) -> NameInsertion {
        if let Some(&canonical) = self.by_name.get(&name) {
            let dup = NamedRegion::new(name.clone(), short_name, kind, range, canonical);
            self.duplicates.entry(name).or_default().push(dup);
            return NameInsertion::Duplicate(canonical);
        }
        let index = self.regions.len() as u32;
        self.by_name.insert(name.clone(), index);
        // First-seen short name wins the unqualified lookup.
        self.by_short.entry(short_name.clone()).or_insert(index);
        self.regions
            .push(NamedRegion::new(name, short_name, kind, range, index));
        NameInsertion::Canonical(index)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedRegion<K>> {
        self.regions.iter()
    }

    /// Canonical entry for a name: exact (qualified) match first, then the
    /// first-seen entry with that short name.
    pub fn get(&self, name: &str) -> Option<&NamedRegion<K>> {
        let index = self
            .by_name
            .get(name)
            .or_else(|| self.by_short.get(name))?;
        self.regions.get(*index as usize)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name) || self.by_short.contains_key(name)
    }

    pub fn by_index(&self, index: u32) -> Option<&NamedRegion<K>> {
        self.regions.get(index as usize)
    }

    /// Iterate all canonical (possibly qualified) names in definition order.
    pub fn names(&self) -> impl Iterator<Item = &SmolStr> {
        self.regions.iter().map(|r| r.name())
    }

    /// Extra occurrences of a name beyond the canonical one.
    pub fn duplicates_of(&self, name: &str) -> &[NamedRegion<K>] {
        self.duplicates.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names that were declared more than once.
    pub fn duplicate_names(&self) -> impl Iterator<Item = &SmolStr> {
        self.duplicates.keys()
    }

    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }

    /// The narrowest canonical region containing `offset`.
    pub fn at_offset(&self, offset: TextSize) -> Option<&NamedRegion<K>> {
        self.index_of_containing(offset)
            .and_then(|i| self.regions.get(i as usize))
    }

    /// Index of the narrowest canonical region containing `offset`.
    ///
    /// Same backward-scan as
    /// [`SemanticRegions::at_offset`](super::SemanticRegions::at_offset):
    /// with nesting and no partial overlap, the latest-starting containing
    /// region is the innermost.
    pub fn index_of_containing(&self, offset: TextSize) -> Option<u32> {
        let cut = self.regions.partition_point(|r| r.start() <= offset);
        self.regions[..cut]
            .iter()
            .rev()
            .find(|r| r.contains(offset))
            .map(|r| r.index())
    }

    /// Rebuild the lookup maps after decoding from the external form.
    pub(crate) fn reindex(&mut self) {
        self.by_name.clear();
        self.by_short.clear();
        for region in &self.regions {
            self.by_name.insert(region.name.clone(), region.index);
            self.by_short
                .entry(region.short_name.clone())
                .or_insert(region.index);
        }
    }

    pub(crate) fn regions_mut(&mut self) -> &mut Vec<NamedRegion<K>> {
        &mut self.regions
    }

    pub(crate) fn duplicates_table(&self) -> &FxHashMap<SmolStr, Vec<NamedRegion<K>>> {
        &self.duplicates
    }

    pub(crate) fn duplicates_table_mut(&mut self) -> &mut FxHashMap<SmolStr, Vec<NamedRegion<K>>> {
        &mut self.duplicates
    }
}
