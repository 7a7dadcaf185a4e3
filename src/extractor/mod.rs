//! Strategy registration and the extraction entry points.
//!
//! An [`Extractor`] is the immutable product of the builder DSL: the
//! registered strategy sets, the decode table for the binary external
//! form, and a digest of the whole registration. It is built once per
//! grammar (typically in a `static` via `OnceCell`/`LazyLock`) and shared
//! freely; every `extract` call runs on caller-owned state only.

mod builder;

pub(crate) mod strategy;
pub(crate) mod walk;

pub use builder::{
    ExtractorBuilder, NamedRegionGroupBuilder, ReferenceSetBuilder, RegionSetBuilder,
    SingletonSetBuilder,
};
pub use strategy::{NameSpec, RefCandidate};

use std::io::Read;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::debug;

use crate::base::{DecodeError, NamePool, read_str, read_u32, read_u64};
use crate::extraction::Extraction;
use crate::extraction::serialize::{DecodeFn, FORMAT_VERSION, Section};
use crate::refs::ReferenceGraph;
use crate::tree::{TokenStream, TreeNode};

use walk::{ErasedPass, PassRun, walk};

/// An immutable, reusable set of extraction strategies for trees of type
/// `N`.
pub struct Extractor<N: TreeNode> {
    passes: Vec<Box<dyn ErasedPass<N>>>,
    decoders: FxHashMap<(Section, SmolStr), DecodeFn>,
    graph_keys: FxHashMap<SmolStr, &'static str>,
    hash: u64,
}

impl<N: TreeNode> Extractor<N> {
    pub fn builder() -> ExtractorBuilder<N> {
        ExtractorBuilder::new()
    }

    pub(crate) fn from_parts(
        passes: Vec<Box<dyn ErasedPass<N>>>,
        decoders: FxHashMap<(Section, SmolStr), DecodeFn>,
        graph_keys: FxHashMap<SmolStr, &'static str>,
        hash: u64,
    ) -> Self {
        Self {
            passes,
            decoders,
            graph_keys,
            hash,
        }
    }

    /// Digest of the registered strategies, carried into every extraction
    /// and its external form.
    pub fn extractors_hash(&self) -> u64 {
        self.hash
    }

    /// Run every registered strategy over `root`.
    pub fn extract(&self, root: &N) -> Extraction {
        self.extract_with(root, None, &|| false)
    }

    /// Run every registered strategy over `root`, scanning `tokens` for the
    /// token strategies, polling `cancel` at every node.
    ///
    /// All strategy sets share one traversal (plus one more for reference
    /// strategies, which need the completed name collections). Cancellation
    /// returns the partial extraction accumulated so far.
    pub fn extract_with(
        &self,
        root: &N,
        tokens: Option<&mut dyn TokenStream>,
        cancel: &dyn Fn() -> bool,
    ) -> Extraction {
        let mut out = Extraction::empty(self.hash);
        let mut runs: Vec<Box<dyn PassRun<N> + '_>> =
            self.passes.iter().map(|pass| pass.begin()).collect();

        let complete = walk(root, &mut runs, cancel);
        if complete {
            let mut any_references = false;
            for run in runs.iter_mut() {
                any_references |= run.seal_for_references();
            }
            if any_references {
                walk(root, &mut runs, cancel);
            }
        }
        for run in runs {
            run.finish(&mut out);
        }

        if let Some(stream) = tokens {
            if !cancel() {
                for pass in &self.passes {
                    pass.scan_tokens(&mut *stream, &mut out);
                }
            }
        }

        debug!(
            "[EXTRACT] run finished (complete: {complete}, hash {:#x})",
            self.hash
        );
        out
    }

    /// Read an extraction back from its binary external form.
    ///
    /// The stream must have been written by an extractor with the same
    /// registration: a version, digest, or key mismatch rejects the whole
    /// artifact and the caller re-extracts from source.
    pub fn read_extraction(&self, r: &mut dyn Read) -> Result<Extraction, DecodeError> {
        let version = read_u32(r)?;
        if version != FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let pool = NamePool::read_from(r)?;
        let found = read_u64(r)?;
        if found != self.hash {
            return Err(DecodeError::StaleStrategies {
                expected: self.hash,
                found,
            });
        }

        let mut out = Extraction::empty(self.hash);
        for section in [
            Section::Regions,
            Section::Named,
            Section::References,
            Section::Unknowns,
            Section::Singletons,
        ] {
            let count = read_u32(r)?;
            for _ in 0..count {
                let name = read_str(r)?;
                let decoder = self
                    .decoders
                    .get(&(section, name.clone()))
                    .ok_or_else(|| DecodeError::UnknownKey(name.to_string()))?;
                decoder(r, &pool, &mut out)?;
            }
        }

        let graph_count = read_u32(r)?;
        for _ in 0..graph_count {
            let name = read_str(r)?;
            let key = self
                .graph_keys
                .get(&name)
                .copied()
                .ok_or_else(|| DecodeError::UnknownKey(name.to_string()))?;
            let node_count = read_u32(r)?;
            let edge_count = read_u32(r)?;
            let mut edges = Vec::with_capacity(edge_count as usize);
            for _ in 0..edge_count {
                let from = read_u32(r)?;
                let to = read_u32(r)?;
                if from >= node_count || to >= node_count {
                    return Err(DecodeError::Malformed("graph edge out of range"));
                }
                edges.push((from, to));
            }
            out.insert_graph(key, ReferenceGraph::from_edges(node_count, &edges));
        }
        Ok(out)
    }
}
