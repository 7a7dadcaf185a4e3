//! The extraction result store.
//!
//! An [`Extraction`] holds every collection produced by one extractor run
//! over one file, keyed by the same typed keys used at registration. The
//! store itself is type-erased; the declared key types re-assert the
//! concrete collection types at the lookup boundary, so a lookup with a
//! mismatched type returns `None` instead of panicking.
//!
//! The store also carries two memo caches used by cross-file resolution:
//! a per-store resolution memo and a cache of imported-file extractions
//! shared across every extraction reached through the same resolution
//! group. Both are cleared by [`Extraction::dispose`].

pub(crate) mod serialize;

mod resolve;

pub use resolve::{
    Attributed, Attribution, ExtractionProvider, ResolutionOutcome, ResolveError, UnknownResolver,
};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use text_size::TextSize;

use crate::base::{
    KeyId, NameReferenceSetKey, NamedRegionKey, Payload, RegionKind, RegionsKey, SingletonKey,
};
use crate::refs::{ReferenceGraph, ReferenceSets, UnknownRefs};
use crate::regions::{NamedRegion, NamedRegions, Region, SemanticRegions, SingletonEncounters};

use serialize::ErasedCollection;

pub(crate) type ResolutionCache = FxHashMap<(&'static str, u64), Arc<dyn Any + Send + Sync>>;
pub(crate) type ExtractionCache = Arc<Mutex<FxHashMap<(u64, SmolStr), Arc<Extraction>>>>;

type Collections = IndexMap<KeyId, Box<dyn ErasedCollection>>;

/// Every collection extracted from one file, plus the resolution caches.
pub struct Extraction {
    extractors_hash: u64,
    regions: Collections,
    named: Collections,
    references: Collections,
    unknowns: Collections,
    singletons: Collections,
    graphs: IndexMap<&'static str, ReferenceGraph>,
    pub(crate) resolution_cache: Mutex<ResolutionCache>,
    pub(crate) extraction_cache: ExtractionCache,
}

impl Extraction {
    /// An extraction with no collections, as produced for a missing import.
    pub(crate) fn empty(extractors_hash: u64) -> Self {
        Self {
            extractors_hash,
            regions: IndexMap::new(),
            named: IndexMap::new(),
            references: IndexMap::new(),
            unknowns: IndexMap::new(),
            singletons: IndexMap::new(),
            graphs: IndexMap::new(),
            resolution_cache: Mutex::new(FxHashMap::default()),
            extraction_cache: Arc::new(Mutex::new(FxHashMap::default())),
        }
    }

    /// Digest of the strategy set that produced this extraction. Two
    /// extractions are only comparable or cache-compatible when their
    /// hashes agree.
    pub fn extractors_hash(&self) -> u64 {
        self.extractors_hash
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
            && self.named.is_empty()
            && self.references.is_empty()
            && self.unknowns.is_empty()
            && self.singletons.is_empty()
            && self.graphs.is_empty()
    }

    // -- typed lookup -------------------------------------------------------

    pub fn regions<T: Payload>(&self, key: RegionsKey<T>) -> Option<&SemanticRegions<T>> {
        get_collection(&self.regions, key.name())
    }

    pub fn named_regions<K: RegionKind>(&self, key: NamedRegionKey<K>) -> Option<&NamedRegions<K>> {
        get_collection(&self.named, key.name())
    }

    pub fn references<K: RegionKind>(
        &self,
        key: NameReferenceSetKey<K>,
    ) -> Option<&ReferenceSets<K>> {
        get_collection(&self.references, key.name())
    }

    /// References that matched no name in this file, in occurrence order.
    pub fn unknown_refs<K: RegionKind>(
        &self,
        key: NameReferenceSetKey<K>,
    ) -> Option<&UnknownRefs<K>> {
        get_collection(&self.unknowns, key.name())
    }

    pub fn reference_graph<K: RegionKind>(
        &self,
        key: NameReferenceSetKey<K>,
    ) -> Option<&ReferenceGraph> {
        self.graphs.get(key.name())
    }

    pub fn singletons<V: Payload>(&self, key: SingletonKey<V>) -> Option<&SingletonEncounters<V>> {
        get_collection(&self.singletons, key.name())
    }

    // -- positional queries -------------------------------------------------

    /// The narrowest region at `offset` across several keys. On equal
    /// widths the earliest key in `keys` wins.
    pub fn region_at<T: Payload>(
        &self,
        keys: &[RegionsKey<T>],
        offset: TextSize,
    ) -> Option<(RegionsKey<T>, &Region<T>)> {
        let mut best: Option<(RegionsKey<T>, &Region<T>)> = None;
        for &key in keys {
            let Some(hit) = self.regions(key).and_then(|r| r.at_offset(offset)) else {
                continue;
            };
            if best.as_ref().is_none_or(|(_, b)| hit.len() < b.len()) {
                best = Some((key, hit));
            }
        }
        best
    }

    /// The narrowest named region at `offset` across several keys, with the
    /// same first-key tie-break as [`Extraction::region_at`].
    pub fn named_region_at<K: RegionKind>(
        &self,
        keys: &[NamedRegionKey<K>],
        offset: TextSize,
    ) -> Option<(NamedRegionKey<K>, &NamedRegion<K>)> {
        let mut best: Option<(NamedRegionKey<K>, &NamedRegion<K>)> = None;
        for &key in keys {
            let Some(hit) = self.named_regions(key).and_then(|n| n.at_offset(offset)) else {
                continue;
            };
            if best
                .as_ref()
                .is_none_or(|(_, b)| hit.range().len() < b.range().len())
            {
                best = Some((key, hit));
            }
        }
        best
    }

    /// Union of canonical names across several named-region keys, first-seen
    /// order, deduplicated.
    pub fn all_names<K: RegionKind>(&self, keys: &[NamedRegionKey<K>]) -> Vec<SmolStr> {
        let mut out: IndexSet<SmolStr> = IndexSet::new();
        for &key in keys {
            if let Some(named) = self.named_regions(key) {
                for name in named.names() {
                    out.insert(name.clone());
                }
            }
        }
        out.into_iter().collect()
    }

    // -- diagnostics --------------------------------------------------------

    /// Human-readable one-key-per-line summary, for logs and debugging.
    pub fn log_string(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(out, "extraction {:#018x}", self.extractors_hash);
        for (section, map) in [
            ("regions", &self.regions),
            ("named", &self.named),
            ("references", &self.references),
            ("unknowns", &self.unknowns),
            ("singletons", &self.singletons),
        ] {
            for (id, collection) in map {
                let _ = writeln!(out, "  {section} '{}': {}", id.name, collection.summary());
            }
        }
        for (name, graph) in &self.graphs {
            let _ = writeln!(
                out,
                "  graph '{name}': {} nodes, {} edges",
                graph.node_count(),
                graph.edge_count()
            );
        }
        out
    }

    /// Drop both memo caches. Queries keep working; the next resolution
    /// request recomputes from scratch.
    pub fn dispose(&self) {
        self.resolution_cache.lock().clear();
        self.extraction_cache.lock().clear();
    }

    // -- insertion (extractor and decoder side) -----------------------------

    pub(crate) fn insert_named<K: RegionKind>(
        &mut self,
        name: &'static str,
        regions: NamedRegions<K>,
    ) {
        self.named
            .insert(KeyId::of::<NamedRegions<K>>(name), Box::new(regions));
    }

    pub(crate) fn insert_references<K: RegionKind>(
        &mut self,
        name: &'static str,
        sets: ReferenceSets<K>,
    ) {
        self.references
            .insert(KeyId::of::<ReferenceSets<K>>(name), Box::new(sets));
    }

    pub(crate) fn insert_unknowns<K: RegionKind>(
        &mut self,
        name: &'static str,
        unknowns: UnknownRefs<K>,
    ) {
        self.unknowns
            .insert(KeyId::of::<UnknownRefs<K>>(name), Box::new(unknowns));
    }

    pub(crate) fn insert_graph(&mut self, name: &'static str, graph: ReferenceGraph) {
        self.graphs.insert(name, graph);
    }

    pub(crate) fn insert_singletons<V: Payload>(
        &mut self,
        name: &'static str,
        encounters: SingletonEncounters<V>,
    ) {
        self.singletons
            .insert(KeyId::of::<SingletonEncounters<V>>(name), Box::new(encounters));
    }

    /// Insert plain regions, merging with any collection already stored
    /// under the key. Tree strategies and token-scan strategies both land
    /// here; the union preserves start order.
    pub(crate) fn insert_regions_combined<T: Payload>(
        &mut self,
        name: &'static str,
        regions: SemanticRegions<T>,
    ) {
        let id = KeyId::of::<SemanticRegions<T>>(name);
        let merged = match self
            .regions
            .get(&id)
            .and_then(|c| c.as_any().downcast_ref::<SemanticRegions<T>>())
        {
            Some(existing) => existing.combine(&regions),
            None => regions,
        };
        self.regions.insert(id, Box::new(merged));
    }
}

fn get_collection<'a, C: 'static>(map: &'a Collections, name: &'static str) -> Option<&'a C> {
    map.get(&KeyId::of::<C>(name))?.as_any().downcast_ref::<C>()
}

fn collections_eq(a: &Collections, b: &Collections) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(id, c)| b.get(id).is_some_and(|o| c.eq_dyn(o.as_ref())))
}

// Caches are transient state, not extracted content; equality ignores them.
impl PartialEq for Extraction {
    fn eq(&self, other: &Self) -> bool {
        self.extractors_hash == other.extractors_hash
            && collections_eq(&self.regions, &other.regions)
            && collections_eq(&self.named, &other.named)
            && collections_eq(&self.references, &other.references)
            && collections_eq(&self.unknowns, &other.unknowns)
            && collections_eq(&self.singletons, &other.singletons)
            && self.graphs == other.graphs
    }
}

impl fmt::Debug for Extraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extraction")
            .field("extractors_hash", &format_args!("{:#x}", self.extractors_hash))
            .field("regions", &keys_of(&self.regions))
            .field("named", &keys_of(&self.named))
            .field("references", &keys_of(&self.references))
            .field("unknowns", &keys_of(&self.unknowns))
            .field("singletons", &keys_of(&self.singletons))
            .field("graphs", &self.graphs.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn keys_of(map: &Collections) -> Vec<&'static str> {
    map.keys().map(|id| id.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use text_size::TextRange;

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

    static COMMENTS: RegionsKey<u32> = RegionsKey::new("comments");
    static NAMES: NamedRegionKey<Kind> = NamedRegionKey::new("names");

    #[test]
    fn test_lookup_requires_matching_type() {
        let mut extraction = Extraction::empty(1);
        let mut regions = SemanticRegions::new();
        regions.push(7u32, range(0, 4));
        extraction.insert_regions_combined("comments", regions);

        assert_eq!(extraction.regions(COMMENTS).unwrap().len(), 1);
        // Same name, different payload type: no hit, no panic.
        static WRONG: RegionsKey<String> = RegionsKey::new("comments");
        assert!(extraction.regions(WRONG).is_none());
    }

    #[test]
    fn test_insert_regions_combines_with_existing() {
        let mut extraction = Extraction::empty(1);
        let mut a = SemanticRegions::new();
        a.push(1u32, range(0, 2));
        let mut b = SemanticRegions::new();
        b.push(2u32, range(5, 8));
        extraction.insert_regions_combined("comments", a);
        extraction.insert_regions_combined("comments", b);

        let merged = extraction.regions(COMMENTS).unwrap();
        assert_eq!(merged.len(), 2);
        let starts: Vec<u32> = merged.iter().map(|r| r.start().into()).collect();
        assert_eq!(starts, vec![0, 5]);
    }

    #[test]
    fn test_region_at_prefers_narrowest_then_first_key() {
        static OUTER: RegionsKey<u32> = RegionsKey::new("outer");
        static INNER: RegionsKey<u32> = RegionsKey::new("inner");
        let mut extraction = Extraction::empty(1);
        let mut outer = SemanticRegions::new();
        outer.push(0u32, range(0, 20));
        let mut inner = SemanticRegions::new();
        inner.push(1u32, range(5, 10));
        extraction.insert_regions_combined("outer", outer);
        extraction.insert_regions_combined("inner", inner);

        let (key, hit) = extraction.region_at(&[OUTER, INNER], 7.into()).unwrap();
        assert_eq!(key, INNER);
        assert_eq!(hit.range(), range(5, 10));

        // Equal widths: first key in the list wins.
        static TWIN: RegionsKey<u32> = RegionsKey::new("twin");
        let mut twin = SemanticRegions::new();
        twin.push(2u32, range(5, 10));
        extraction.insert_regions_combined("twin", twin);
        let (key, _) = extraction.region_at(&[TWIN, INNER], 7.into()).unwrap();
        assert_eq!(key, TWIN);
    }

    #[test]
    fn test_all_names_deduplicates_across_keys() {
        static OTHER: NamedRegionKey<Kind> = NamedRegionKey::new("other");
        let mut extraction = Extraction::empty(1);
        let mut a = NamedRegions::new();
        a.add("x".into(), "x".into(), Kind::Rule, range(0, 5));
        a.add("y".into(), "y".into(), Kind::Rule, range(6, 9));
        let mut b = NamedRegions::new();
        b.add("y".into(), "y".into(), Kind::Rule, range(10, 12));
        b.add("z".into(), "z".into(), Kind::Rule, range(13, 15));
        extraction.insert_named("names", a);
        extraction.insert_named("other", b);

        assert_eq!(extraction.all_names(&[NAMES, OTHER]), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_equality_ignores_caches() {
        let mut a = Extraction::empty(9);
        let mut b = Extraction::empty(9);
        let mut named = NamedRegions::new();
        named.add("x".into(), "x".into(), Kind::Rule, range(0, 5));
        a.insert_named("names", named.clone());
        b.insert_named("names", named);

        a.resolution_cache
            .lock()
            .insert(("names", 1), Arc::new(0u32));
        assert_eq!(a, b);

        assert_ne!(a, Extraction::empty(9));
        assert_ne!(Extraction::empty(9), Extraction::empty(10));
    }
}
