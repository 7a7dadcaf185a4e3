//! Cross-file resolution of unknown references.
//!
//! Unknown references stay unresolved inside a single file; resolving them
//! means searching the extractions of imported sources for a matching
//! named region. The engine never parses imports itself: a caller-supplied
//! provider produces the extraction of a source on cache miss, and every
//! extraction reached this way joins the caller's cache group, so a source
//! imported along several paths is extracted once.
//!
//! Outcomes are memoized per (reference-set key, resolver identity) on the
//! extraction that requested them.

use std::sync::Arc;

use smol_str::SmolStr;
use thiserror::Error;
use tracing::{debug, trace};

use crate::base::{NameReferenceSetKey, NamedRegionKey, RegionKind};
use crate::refs::{UnknownRef, UnknownRefs};
use crate::regions::NamedRegion;
use crate::source::SourceOrigin;

use super::Extraction;

/// Errors surfaced while loading imported extractions.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// IO error from the provider (reading a serialized artifact, source
    /// text, and so on).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The provider could not produce an extraction for a source.
    #[error("failed to load extraction for '{name}': {message}")]
    Failed { name: String, message: String },
}

/// Produces the extraction of an imported source on cache miss, typically
/// by parsing it and running the same extractor, or by reading a
/// serialized artifact.
pub type ExtractionProvider<'a> =
    &'a (dyn Fn(&dyn SourceOrigin) -> Result<Extraction, ResolveError> + Sync);

/// Caller-supplied policy for attributing unknown references to imports.
pub trait UnknownResolver<K: RegionKind>: Send + Sync {
    /// Stable identity used as the memoization key. Two resolvers with the
    /// same identity must attribute identically.
    fn identity(&self) -> u64;

    /// Import names worth searching for this unknown, in priority order.
    fn candidate_imports(&self, unknown: &UnknownRef<K>) -> Vec<SmolStr>;

    /// Named-region keys searched inside each candidate extraction, in
    /// priority order.
    fn search_keys(&self) -> Vec<NamedRegionKey<K>>;
}

/// Where one unknown reference was found.
#[derive(Clone, Debug)]
pub struct Attribution<K: RegionKind> {
    source: SmolStr,
    extraction: Arc<Extraction>,
    collection: &'static str,
    element: NamedRegion<K>,
}

impl<K: RegionKind> Attribution<K> {
    /// Name of the source that defines the referenced element.
    pub fn source(&self) -> &SmolStr {
        &self.source
    }

    /// The defining source's full extraction, for follow-up queries.
    pub fn extraction(&self) -> &Arc<Extraction> {
        &self.extraction
    }

    /// Key name of the named-region collection the element came from.
    pub fn collection(&self) -> &'static str {
        self.collection
    }

    /// The defining named region itself.
    pub fn element(&self) -> &NamedRegion<K> {
        &self.element
    }
}

/// An unknown reference paired with its attribution.
#[derive(Clone, Debug)]
pub struct Attributed<K: RegionKind> {
    unknown: UnknownRef<K>,
    attribution: Attribution<K>,
}

impl<K: RegionKind> Attributed<K> {
    pub fn unknown(&self) -> &UnknownRef<K> {
        &self.unknown
    }

    pub fn attribution(&self) -> &Attribution<K> {
        &self.attribution
    }
}

/// Partition of one reference set's unknowns after resolution.
#[derive(Debug)]
pub struct ResolutionOutcome<K: RegionKind> {
    attributed: Vec<Attributed<K>>,
    unattributed: UnknownRefs<K>,
}

impl<K: RegionKind> ResolutionOutcome<K> {
    /// Unknowns that were found in an import, in occurrence order.
    pub fn attributed(&self) -> &[Attributed<K>] {
        &self.attributed
    }

    /// Unknowns no candidate import could account for.
    pub fn unattributed(&self) -> &UnknownRefs<K> {
        &self.unattributed
    }

    pub fn is_fully_attributed(&self) -> bool {
        self.unattributed.is_empty()
    }
}

impl Extraction {
    /// Resolve the unknown references collected under `key` against the
    /// imports reachable from `origin`.
    ///
    /// The outcome is memoized per (key, resolver identity); repeat calls
    /// return the cached result without touching the provider. The memo is
    /// cleared by [`Extraction::dispose`].
    pub fn resolve_unknowns<K: RegionKind>(
        &self,
        key: NameReferenceSetKey<K>,
        origin: &dyn SourceOrigin,
        resolver: &dyn UnknownResolver<K>,
        provider: ExtractionProvider<'_>,
    ) -> Result<Arc<ResolutionOutcome<K>>, ResolveError> {
        let cache_key = (key.name(), resolver.identity());
        let hit = self.resolution_cache.lock().get(&cache_key).cloned();
        if let Some(hit) = hit {
            if let Ok(outcome) = hit.downcast::<ResolutionOutcome<K>>() {
                trace!("[RESOLVE] memo hit for '{}'", key.name());
                return Ok(outcome);
            }
        }

        let outcome = Arc::new(self.resolve_uncached(key, origin, resolver, provider)?);
        self.resolution_cache
            .lock()
            .insert(cache_key, outcome.clone());
        Ok(outcome)
    }

    fn resolve_uncached<K: RegionKind>(
        &self,
        key: NameReferenceSetKey<K>,
        origin: &dyn SourceOrigin,
        resolver: &dyn UnknownResolver<K>,
        provider: ExtractionProvider<'_>,
    ) -> Result<ResolutionOutcome<K>, ResolveError> {
        let mut attributed = Vec::new();
        let mut unattributed = UnknownRefs::new();
        let Some(unknowns) = self.unknown_refs(key) else {
            return Ok(ResolutionOutcome {
                attributed,
                unattributed,
            });
        };
        let search_keys = resolver.search_keys();

        for unknown in unknowns.iter() {
            let mut found = None;
            'imports: for import in resolver.candidate_imports(unknown) {
                let (source, extraction) = self.imported_extraction(origin, &import, provider)?;
                for &named_key in &search_keys {
                    let Some(region) = extraction
                        .named_regions(named_key)
                        .and_then(|named| named.get(unknown.name()))
                    else {
                        continue;
                    };
                    if unknown.expected_kind().is_none_or(|k| k == region.kind()) {
                        trace!(
                            "[RESOLVE] '{}' attributed to '{}' in {}",
                            unknown.name(),
                            region.name(),
                            source
                        );
                        found = Some(Attribution {
                            source,
                            collection: named_key.name(),
                            element: region.clone(),
                            extraction: extraction.clone(),
                        });
                        break 'imports;
                    }
                }
            }
            match found {
                Some(attribution) => attributed.push(Attributed {
                    unknown: unknown.clone(),
                    attribution,
                }),
                None => unattributed.push_raw(unknown.clone()),
            }
        }

        debug!(
            "[RESOLVE] '{}': {} attributed, {} unattributed",
            key.name(),
            attributed.len(),
            unattributed.len()
        );
        Ok(ResolutionOutcome {
            attributed,
            unattributed,
        })
    }

    /// The extraction of one import, memoized per (extractor hash, resolved
    /// source name) in the cache shared across this resolution group.
    ///
    /// Repeat calls for the same import return the identical instance, so
    /// several consumers (navigation, highlighting) never trigger redundant
    /// re-extraction. A missing import yields an empty extraction, not an
    /// error.
    pub fn resolve_extraction(
        &self,
        origin: &dyn SourceOrigin,
        import: &str,
        provider: ExtractionProvider<'_>,
    ) -> Result<Arc<Extraction>, ResolveError> {
        let (_, extraction) = self.imported_extraction(origin, import, provider)?;
        Ok(extraction)
    }

    /// The extraction of one import, through the shared cross-file cache.
    ///
    /// A missing import yields an empty extraction cached under the import
    /// name, so absence is remembered as cheaply as presence.
    fn imported_extraction(
        &self,
        origin: &dyn SourceOrigin,
        import: &str,
        provider: ExtractionProvider<'_>,
    ) -> Result<(SmolStr, Arc<Extraction>), ResolveError> {
        let Some(source) = origin.resolve_import(import) else {
            let name = SmolStr::new(import);
            let key = (self.extractors_hash, name.clone());
            let hit = self.extraction_cache.lock().get(&key).cloned();
            if let Some(hit) = hit {
                return Ok((name, hit));
            }
            debug!("[RESOLVE] import '{import}' not found, caching empty extraction");
            let mut empty = Extraction::empty(self.extractors_hash);
            empty.extraction_cache = self.extraction_cache.clone();
            let empty = Arc::new(empty);
            self.extraction_cache.lock().insert(key, empty.clone());
            return Ok((name, empty));
        };

        let name = SmolStr::new(source.name());
        let key = (self.extractors_hash, name.clone());
        let hit = self.extraction_cache.lock().get(&key).cloned();
        if let Some(hit) = hit {
            return Ok((name, hit));
        }

        debug!("[RESOLVE] extracting import '{name}'");
        let mut extraction = provider(source.as_ref())?;
        if extraction.extractors_hash != self.extractors_hash {
            return Err(ResolveError::Failed {
                name: name.to_string(),
                message: "provider returned an extraction from different strategies".into(),
            });
        }
        // The import joins this cache group, so its own resolution reuses
        // everything already extracted here.
        extraction.extraction_cache = self.extraction_cache.clone();
        let extraction = Arc::new(extraction);
        self.extraction_cache.lock().insert(key, extraction.clone());
        Ok((name, extraction))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use text_size::TextRange;

    use crate::regions::NamedRegions;
    use crate::source::MapSource;

    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Kind {
        Rule,
        Token,
    }

    impl RegionKind for Kind {
        fn ordinal(self) -> u16 {
            match self {
                Kind::Rule => 0,
                Kind::Token => 1,
            }
        }

        fn from_ordinal(ordinal: u16) -> Option<Self> {
            match ordinal {
                0 => Some(Kind::Rule),
                1 => Some(Kind::Token),
                _ => None,
            }
        }
    }

    static REFS: NameReferenceSetKey<Kind> = NameReferenceSetKey::new("refs");
    static NAMES: NamedRegionKey<Kind> = NamedRegionKey::new("names");

    fn range(start: u32, end: u32) -> TextRange {
        TextRange::new(start.into(), end.into())
    }

    struct AllImports;

    impl UnknownResolver<Kind> for AllImports {
        fn identity(&self) -> u64 {
            1
        }

        fn candidate_imports(&self, _unknown: &UnknownRef<Kind>) -> Vec<SmolStr> {
            vec![SmolStr::new("lib"), SmolStr::new("missing")]
        }

        fn search_keys(&self) -> Vec<NamedRegionKey<Kind>> {
            vec![NAMES]
        }
    }

    fn extraction_with_unknowns(unknowns: &[(&str, Option<Kind>)]) -> Extraction {
        let mut extraction = Extraction::empty(7);
        let mut refs = UnknownRefs::new();
        for (i, (name, expected)) in unknowns.iter().enumerate() {
            refs.add(SmolStr::new(name), range(i as u32 * 10, i as u32 * 10 + 3), *expected);
        }
        extraction.insert_unknowns("refs", refs);
        extraction
    }

    fn lib_extraction() -> Extraction {
        let mut extraction = Extraction::empty(7);
        let mut named = NamedRegions::new();
        named.add("exported".into(), "exported".into(), Kind::Rule, range(0, 8));
        extraction.insert_named("names", named);
        extraction
    }

    #[test]
    fn test_unknowns_partitioned_into_attributed_and_not() {
        let extraction = extraction_with_unknowns(&[("exported", None), ("nowhere", None)]);
        let origin = MapSource::new("main.g");
        origin.add_import("lib", MapSource::new("lib.g"));

        let outcome = extraction
            .resolve_unknowns(REFS, origin.as_ref(), &AllImports, &|_| Ok(lib_extraction()))
            .unwrap();

        assert_eq!(outcome.attributed().len(), 1);
        let hit = &outcome.attributed()[0];
        assert_eq!(hit.unknown().name(), "exported");
        assert_eq!(hit.attribution().source(), "lib.g");
        assert_eq!(hit.attribution().collection(), "names");
        assert_eq!(hit.attribution().element().range(), range(0, 8));

        assert_eq!(outcome.unattributed().len(), 1);
        assert_eq!(outcome.unattributed().iter().next().unwrap().name(), "nowhere");
        assert!(!outcome.is_fully_attributed());
    }

    #[test]
    fn test_expected_kind_must_match() {
        let extraction = extraction_with_unknowns(&[("exported", Some(Kind::Token))]);
        let origin = MapSource::new("main.g");
        origin.add_import("lib", MapSource::new("lib.g"));

        let outcome = extraction
            .resolve_unknowns(REFS, origin.as_ref(), &AllImports, &|_| Ok(lib_extraction()))
            .unwrap();

        // "exported" is a Rule; a site expecting a Token stays unattributed.
        assert!(outcome.attributed().is_empty());
        assert_eq!(outcome.unattributed().len(), 1);
    }

    #[test]
    fn test_outcome_memoized_until_dispose() {
        let extraction = extraction_with_unknowns(&[("exported", None)]);
        let origin = MapSource::new("main.g");
        origin.add_import("lib", MapSource::new("lib.g"));
        let calls = AtomicUsize::new(0);
        let provider = |_: &dyn SourceOrigin| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(lib_extraction())
        };

        extraction
            .resolve_unknowns(REFS, origin.as_ref(), &AllImports, &provider)
            .unwrap();
        extraction
            .resolve_unknowns(REFS, origin.as_ref(), &AllImports, &provider)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        extraction.dispose();
        extraction
            .resolve_unknowns(REFS, origin.as_ref(), &AllImports, &provider)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_import_yields_empty_extraction_once() {
        let extraction = extraction_with_unknowns(&[("a", None), ("b", None)]);
        let origin = MapSource::new("main.g");
        // No imports registered at all: every candidate is missing.
        let calls = AtomicUsize::new(0);
        let provider = |_: &dyn SourceOrigin| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(lib_extraction())
        };

        let outcome = extraction
            .resolve_unknowns(REFS, origin.as_ref(), &AllImports, &provider)
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.unattributed().len(), 2);
        // Both missing imports were cached as empty extractions.
        assert_eq!(extraction.extraction_cache.lock().len(), 2);
    }

    #[test]
    fn test_mismatched_provider_hash_is_an_error() {
        let extraction = extraction_with_unknowns(&[("exported", None)]);
        let origin = MapSource::new("main.g");
        origin.add_import("lib", MapSource::new("lib.g"));

        let result = extraction.resolve_unknowns(REFS, origin.as_ref(), &AllImports, &|_| {
            Ok(Extraction::empty(999))
        });
        assert!(matches!(result, Err(ResolveError::Failed { .. })));
    }
}
