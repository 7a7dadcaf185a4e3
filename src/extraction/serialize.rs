//! Binary external form of an [`Extraction`].
//!
//! Layout: format version, shared name pool, extractor digest, then five
//! collection sections (plain regions, named regions, references, unknown
//! references, singletons) followed by the reference graphs. Each section
//! is a count plus entries sorted by key name, so output bytes are
//! deterministic for equal extractions.
//!
//! Decoding is driven by the extractor: registration installs a typed
//! decode function per (section, key name), and reading dispatches through
//! that table. A key name with no decoder means the artifact was produced
//! by a different registration and is rejected as a whole.

use std::any::{Any, type_name};
use std::io::{self, Read, Write};

use smol_str::SmolStr;

use crate::base::{
    DecodeError, NamePool, Payload, RegionKind, read_range, read_u8, read_u16, read_u32,
    write_range, write_str, write_u8, write_u16, write_u32, write_u64,
};
use crate::refs::{NameReference, ReferenceSets, UnknownRef, UnknownRefs};
use crate::regions::{NamedRegion, NamedRegions, SemanticRegions, SingletonEncounters};

use super::Extraction;

pub(crate) const FORMAT_VERSION: u32 = 1;

/// Section tag identifying which decoder family a key name belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) enum Section {
    Regions,
    Named,
    References,
    Unknowns,
    Singletons,
}

/// A typed decode function installed at registration time.
pub(crate) type DecodeFn =
    Box<dyn Fn(&mut dyn Read, &NamePool, &mut Extraction) -> Result<(), DecodeError> + Send + Sync>;

/// Type-erased view of one stored collection.
pub(crate) trait ErasedCollection: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn eq_dyn(&self, other: &dyn ErasedCollection) -> bool;

    /// One-line content summary for [`Extraction::log_string`].
    fn summary(&self) -> String;

    fn collect_names(&self, pool: &mut NamePool);

    fn encode(&self, w: &mut dyn Write, pool: &NamePool) -> io::Result<()>;
}

impl Extraction {
    /// Write the versioned binary form.
    pub fn write_to(&self, w: &mut dyn Write) -> io::Result<()> {
        let mut pool = NamePool::new();
        for map in [
            &self.regions,
            &self.named,
            &self.references,
            &self.unknowns,
            &self.singletons,
        ] {
            for collection in map.values() {
                collection.collect_names(&mut pool);
            }
        }

        write_u32(w, FORMAT_VERSION)?;
        pool.write_to(w)?;
        write_u64(w, self.extractors_hash)?;

        for map in [
            &self.regions,
            &self.named,
            &self.references,
            &self.unknowns,
            &self.singletons,
        ] {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by_key(|(id, _)| id.name);
            write_u32(w, entries.len() as u32)?;
            for (id, collection) in entries {
                write_str(w, id.name)?;
                collection.encode(w, &pool)?;
            }
        }

        let mut graphs: Vec<_> = self.graphs.iter().collect();
        graphs.sort_by_key(|(name, _)| **name);
        write_u32(w, graphs.len() as u32)?;
        for (name, graph) in graphs {
            write_str(w, name)?;
            write_u32(w, graph.node_count() as u32)?;
            let edges = graph.edges();
            write_u32(w, edges.len() as u32)?;
            for (from, to) in edges {
                write_u32(w, from)?;
                write_u32(w, to)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// per-collection codecs
// ---------------------------------------------------------------------------

fn read_kind<K: RegionKind>(r: &mut dyn Read) -> Result<K, DecodeError> {
    let ordinal = read_u16(r)?;
    K::from_ordinal(ordinal).ok_or(DecodeError::BadKindOrdinal {
        kind_type: type_name::<K>(),
        ordinal,
    })
}

fn write_opt_kind<K: RegionKind>(w: &mut dyn Write, kind: Option<K>) -> io::Result<()> {
    match kind {
        Some(kind) => {
            write_u8(w, 1)?;
            write_u16(w, kind.ordinal())
        }
        None => write_u8(w, 0),
    }
}

fn read_opt_kind<K: RegionKind>(r: &mut dyn Read) -> Result<Option<K>, DecodeError> {
    if read_u8(r)? == 0 {
        return Ok(None);
    }
    read_kind(r).map(Some)
}

fn write_name(w: &mut dyn Write, pool: &NamePool, name: &str) -> io::Result<()> {
    write_u32(w, pool.id_of(name)?)
}

fn read_name(r: &mut dyn Read, pool: &NamePool) -> Result<SmolStr, DecodeError> {
    Ok(pool.get(read_u32(r)?)?.clone())
}

impl<T: Payload> ErasedCollection for SemanticRegions<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn ErasedCollection) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }

    fn summary(&self) -> String {
        format!("{} regions", self.len())
    }

    fn collect_names(&self, pool: &mut NamePool) {
        for region in self.iter() {
            region.value().collect_names(pool);
        }
    }

    fn encode(&self, w: &mut dyn Write, pool: &NamePool) -> io::Result<()> {
        write_u32(w, self.len() as u32)?;
        for region in self.iter() {
            write_range(w, region.range())?;
            region.value().encode(w, pool)?;
        }
        Ok(())
    }
}

pub(crate) fn decode_regions<T: Payload>(
    r: &mut dyn Read,
    pool: &NamePool,
) -> Result<SemanticRegions<T>, DecodeError> {
    let count = read_u32(r)?;
    let mut out = SemanticRegions::new();
    let mut last_start = None;
    for _ in 0..count {
        let range = read_range(r)?;
        if last_start.is_some_and(|start| range.start() < start) {
            return Err(DecodeError::Malformed("regions out of order"));
        }
        last_start = Some(range.start());
        let value = T::decode(r, pool)?;
        out.push(value, range);
    }
    Ok(out)
}

impl<K: RegionKind> ErasedCollection for NamedRegions<K> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn ErasedCollection) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }

    fn summary(&self) -> String {
        format!(
            "{} named, {} duplicated names",
            self.len(),
            self.duplicate_names().count()
        )
    }

    fn collect_names(&self, pool: &mut NamePool) {
        for region in self.iter() {
            pool.intern(region.name());
            pool.intern(region.short_name());
        }
        for duplicates in self.duplicates_table().values() {
            for region in duplicates {
                pool.intern(region.name());
                pool.intern(region.short_name());
            }
        }
    }

    fn encode(&self, w: &mut dyn Write, pool: &NamePool) -> io::Result<()> {
        write_u32(w, self.len() as u32)?;
        for region in self.iter() {
            write_name(w, pool, region.name())?;
            write_name(w, pool, region.short_name())?;
            write_u16(w, region.kind().ordinal())?;
            write_range(w, region.range())?;
        }
        // Duplicates sorted by name for deterministic bytes; entries within
        // one name keep traversal order.
        let mut dup_names: Vec<_> = self.duplicates_table().keys().collect();
        dup_names.sort_unstable();
        let total: usize = dup_names
            .iter()
            .map(|name| self.duplicates_of(name).len())
            .sum();
        write_u32(w, total as u32)?;
        for name in dup_names {
            for region in self.duplicates_of(name) {
                write_name(w, pool, region.name())?;
                write_name(w, pool, region.short_name())?;
                write_u16(w, region.kind().ordinal())?;
                write_range(w, region.range())?;
                write_u32(w, region.index())?;
            }
        }
        Ok(())
    }
}

pub(crate) fn decode_named<K: RegionKind>(
    r: &mut dyn Read,
    pool: &NamePool,
) -> Result<NamedRegions<K>, DecodeError> {
    let count = read_u32(r)?;
    let mut out = NamedRegions::new();
    for index in 0..count {
        let name = read_name(r, pool)?;
        let short = read_name(r, pool)?;
        let kind = read_kind::<K>(r)?;
        let range = read_range(r)?;
        out.regions_mut()
            .push(NamedRegion::new(name, short, kind, range, index));
    }
    let dup_count = read_u32(r)?;
    for _ in 0..dup_count {
        let name = read_name(r, pool)?;
        let short = read_name(r, pool)?;
        let kind = read_kind::<K>(r)?;
        let range = read_range(r)?;
        let canonical = read_u32(r)?;
        if canonical >= count {
            return Err(DecodeError::Malformed("duplicate points past canonicals"));
        }
        out.duplicates_table_mut()
            .entry(name.clone())
            .or_default()
            .push(NamedRegion::new(name, short, kind, range, canonical));
    }
    out.reindex();
    Ok(out)
}

impl<K: RegionKind> ErasedCollection for ReferenceSets<K> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn ErasedCollection) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }

    fn summary(&self) -> String {
        format!("{} references, {} targets", self.len(), self.target_names().count())
    }

    fn collect_names(&self, pool: &mut NamePool) {
        for reference in self.iter() {
            pool.intern(reference.name());
            pool.intern(reference.canonical_name());
        }
    }

    fn encode(&self, w: &mut dyn Write, pool: &NamePool) -> io::Result<()> {
        write_u32(w, self.len() as u32)?;
        for reference in self.iter() {
            write_name(w, pool, reference.name())?;
            write_name(w, pool, reference.canonical_name())?;
            write_range(w, reference.range())?;
            write_u32(w, reference.target())?;
            match reference.referencer() {
                Some(index) => {
                    write_u8(w, 1)?;
                    write_u32(w, index)?;
                }
                None => write_u8(w, 0)?,
            }
            write_opt_kind(w, reference.expected_kind())?;
        }
        Ok(())
    }
}

pub(crate) fn decode_references<K: RegionKind>(
    r: &mut dyn Read,
    pool: &NamePool,
) -> Result<ReferenceSets<K>, DecodeError> {
    let count = read_u32(r)?;
    let mut out = ReferenceSets::new();
    for _ in 0..count {
        let name = read_name(r, pool)?;
        let canonical = read_name(r, pool)?;
        let range = read_range(r)?;
        let target = read_u32(r)?;
        let referencer = if read_u8(r)? != 0 {
            Some(read_u32(r)?)
        } else {
            None
        };
        let expected = read_opt_kind::<K>(r)?;
        out.push_raw(NameReference::new(
            name, canonical, range, target, referencer, expected,
        ));
    }
    out.reindex();
    Ok(out)
}

impl<K: RegionKind> ErasedCollection for UnknownRefs<K> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn ErasedCollection) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }

    fn summary(&self) -> String {
        format!("{} unknown references", self.len())
    }

    fn collect_names(&self, pool: &mut NamePool) {
        for unknown in self.iter() {
            pool.intern(unknown.name());
        }
    }

    fn encode(&self, w: &mut dyn Write, pool: &NamePool) -> io::Result<()> {
        write_u32(w, self.len() as u32)?;
        for unknown in self.iter() {
            write_name(w, pool, unknown.name())?;
            write_range(w, unknown.range())?;
            write_opt_kind(w, unknown.expected_kind())?;
        }
        Ok(())
    }
}

pub(crate) fn decode_unknowns<K: RegionKind>(
    r: &mut dyn Read,
    pool: &NamePool,
) -> Result<UnknownRefs<K>, DecodeError> {
    let count = read_u32(r)?;
    let mut out = UnknownRefs::new();
    for index in 0..count {
        let name = read_name(r, pool)?;
        let range = read_range(r)?;
        let expected = read_opt_kind::<K>(r)?;
        out.push_raw(UnknownRef::new(name, range, expected, index));
    }
    Ok(out)
}

impl<V: Payload> ErasedCollection for SingletonEncounters<V> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn ErasedCollection) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }

    fn summary(&self) -> String {
        format!("{} encounters", self.len())
    }

    fn collect_names(&self, pool: &mut NamePool) {
        for (value, _) in self.iter() {
            value.collect_names(pool);
        }
    }

    fn encode(&self, w: &mut dyn Write, pool: &NamePool) -> io::Result<()> {
        write_u32(w, self.len() as u32)?;
        for (value, range) in self.iter() {
            write_range(w, range)?;
            value.encode(w, pool)?;
        }
        Ok(())
    }
}

pub(crate) fn decode_singletons<V: Payload>(
    r: &mut dyn Read,
    pool: &NamePool,
) -> Result<SingletonEncounters<V>, DecodeError> {
    let count = read_u32(r)?;
    let mut out = SingletonEncounters::new();
    for _ in 0..count {
        let range = read_range(r)?;
        let value = V::decode(r, pool)?;
        out.append(value, range);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use text_size::TextRange;

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

    fn range(start: u32, end: u32) -> TextRange {
        TextRange::new(start.into(), end.into())
    }

    #[test]
    fn test_named_regions_round_trip() {
        let mut named = NamedRegions::new();
        named.add("a".into(), "a".into(), Kind::Rule, range(0, 10));
        named.add("a.b".into(), "b".into(), Kind::Token, range(2, 6));
        named.add("a".into(), "a".into(), Kind::Rule, range(12, 20));

        let mut pool = NamePool::new();
        named.collect_names(&mut pool);
        let mut buf = Vec::new();
        ErasedCollection::encode(&named, &mut buf, &pool).unwrap();
        let decoded = decode_named::<Kind>(&mut buf.as_slice(), &pool).unwrap();

        assert_eq!(decoded, named);
        assert_eq!(decoded.get("b").unwrap().name(), "a.b");
        assert_eq!(decoded.duplicates_of("a").len(), 1);
    }

    #[test]
    fn test_references_round_trip_regroups_by_canonical() {
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
            range(8, 11),
            1,
            None,
            None,
        ));

        let mut pool = NamePool::new();
        sets.collect_names(&mut pool);
        let mut buf = Vec::new();
        ErasedCollection::encode(&sets, &mut buf, &pool).unwrap();
        let decoded = decode_references::<Kind>(&mut buf.as_slice(), &pool).unwrap();

        assert_eq!(decoded, sets);
        assert_eq!(decoded.references_to("a.b").count(), 2);
    }

    #[test]
    fn test_bad_kind_ordinal_rejected() {
        let mut pool = NamePool::new();
        pool.intern("x");
        let mut buf = Vec::new();
        write_u32(&mut buf, 1).unwrap();
        write_u32(&mut buf, 0).unwrap(); // name
        write_u32(&mut buf, 0).unwrap(); // short
        write_u16(&mut buf, 7).unwrap(); // no such ordinal
        write_range(&mut buf, range(0, 1)).unwrap();

        assert!(matches!(
            decode_named::<Kind>(&mut buf.as_slice(), &pool),
            Err(DecodeError::BadKindOrdinal { ordinal: 7, .. })
        ));
    }

    #[test]
    fn test_singletons_round_trip() {
        let mut pool = NamePool::new();
        let mut singles = SingletonEncounters::new();
        singles.append(SmolStr::new("utf8"), range(0, 4));
        singles.append(SmolStr::new("latin1"), range(9, 15));
        singles.collect_names(&mut pool);

        let mut buf = Vec::new();
        ErasedCollection::encode(&singles, &mut buf, &pool).unwrap();
        let decoded = decode_singletons::<SmolStr>(&mut buf.as_slice(), &pool).unwrap();
        assert_eq!(decoded, singles);
    }
}
