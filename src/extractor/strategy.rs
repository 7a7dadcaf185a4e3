//! Strategy descriptors produced by the builder DSL.
//!
//! A strategy is a small immutable object pairing a target node kind, an
//! optional ancestor-activation qualifier, and an extraction closure. The
//! walker dispatches on the kind tag; the closure only ever sees nodes of
//! its declared target kind.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use smol_str::SmolStr;
use text_size::TextRange;

use crate::base::{NameReferenceSetKey, NamedRegionKey, Payload, RegionKind, RegionsKey, SingletonKey};
use crate::tree::{Token, TreeNode};

/// Gate controlling where in the tree a strategy is active.
///
/// `Always` strategies start with an activation count of 1; qualified
/// strategies start at 0 and are counted up while the walk is inside a
/// qualifying ancestor's subtree.
pub(crate) enum Activation<N: TreeNode> {
    Always,
    BelowKind(N::Kind),
    Below(Arc<dyn Fn(&N) -> bool + Send + Sync>),
}

impl<N: TreeNode> Activation<N> {
    pub(crate) fn initial_count(&self) -> u32 {
        match self {
            Activation::Always => 1,
            _ => 0,
        }
    }

    /// Whether entering `node` activates this strategy for the subtree.
    pub(crate) fn qualifies(&self, node: &N) -> bool {
        match self {
            Activation::Always => false,
            Activation::BelowKind(kind) => node.kind() == *kind,
            Activation::Below(pred) => pred(node),
        }
    }
}

impl<N: TreeNode> Clone for Activation<N> {
    fn clone(&self) -> Self {
        match self {
            Activation::Always => Activation::Always,
            Activation::BelowKind(kind) => Activation::BelowKind(*kind),
            Activation::Below(pred) => Activation::Below(pred.clone()),
        }
    }
}

/// One name produced by a name-extraction strategy.
#[derive(Clone, Debug)]
pub struct NameSpec<K> {
    pub(crate) name: SmolStr,
    pub(crate) kind: K,
    pub(crate) name_range: TextRange,
    pub(crate) bounds: Option<TextRange>,
}

impl<K: RegionKind> NameSpec<K> {
    /// A declared name at its token position. Rule bounds default to the
    /// full range of the matched node.
    pub fn new(name: impl Into<SmolStr>, kind: K, name_range: TextRange) -> Self {
        Self {
            name: name.into(),
            kind,
            name_range,
            bounds: None,
        }
    }

    /// Override the rule bounds recorded for this name.
    pub fn with_bounds(mut self, bounds: TextRange) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

/// A candidate reference site: a name that should resolve to a named region.
#[derive(Clone, Debug)]
pub struct RefCandidate<K> {
    pub(crate) name: SmolStr,
    pub(crate) range: TextRange,
    pub(crate) expected: Option<K>,
}

impl<K: RegionKind> RefCandidate<K> {
    pub fn new(name: impl Into<SmolStr>, range: TextRange) -> Self {
        Self {
            name: name.into(),
            range,
            expected: None,
        }
    }

    /// Declare the kind of named region this site expects to resolve to.
    pub fn expecting(mut self, kind: K) -> Self {
        self.expected = Some(kind);
        self
    }
}

pub(crate) type NameFn<N, K> = Arc<dyn Fn(&N, &mut dyn FnMut(NameSpec<K>)) + Send + Sync>;
pub(crate) type RefFn<N, K> = Arc<dyn Fn(&N) -> Option<RefCandidate<K>> + Send + Sync>;
pub(crate) type RegionFn<N, T> = Arc<dyn Fn(&N, &mut dyn FnMut(T, TextRange)) + Send + Sync>;
pub(crate) type TokenFilterFn = Arc<dyn Fn(&Token) -> bool + Send + Sync>;
pub(crate) type TokenEmitFn<T> = Arc<dyn Fn(&Token) -> Option<(T, TextRange)> + Send + Sync>;
pub(crate) type SingletonFn<N, V> = Arc<dyn Fn(&N) -> Option<(V, TextRange)> + Send + Sync>;

pub(crate) struct NameStrategy<N: TreeNode, K: RegionKind> {
    pub(crate) target: N::Kind,
    pub(crate) activation: Activation<N>,
    pub(crate) extract: NameFn<N, K>,
}

pub(crate) struct RefStrategy<N: TreeNode, K: RegionKind> {
    pub(crate) target: N::Kind,
    pub(crate) activation: Activation<N>,
    pub(crate) extract: RefFn<N, K>,
}

pub(crate) struct RegionStrategy<N: TreeNode, T: Payload> {
    pub(crate) target: N::Kind,
    pub(crate) activation: Activation<N>,
    pub(crate) emit: RegionFn<N, T>,
}

pub(crate) struct TokenStrategy<T: Payload> {
    pub(crate) filter: TokenFilterFn,
    pub(crate) emit: TokenEmitFn<T>,
}

pub(crate) struct SingletonStrategy<N: TreeNode, V: Payload> {
    pub(crate) target: N::Kind,
    pub(crate) activation: Activation<N>,
    pub(crate) extract: SingletonFn<N, V>,
}

/// One reference-set registration attached to a named-region group.
pub(crate) struct RefSetSpec<N: TreeNode, K: RegionKind> {
    pub(crate) key: NameReferenceSetKey<K>,
    pub(crate) strategies: Vec<RefStrategy<N, K>>,
}

/// A named-region group: name strategies plus the reference sets matched
/// against the names they collect.
pub(crate) struct NameGroup<N: TreeNode, K: RegionKind> {
    pub(crate) name_pos_key: Option<NamedRegionKey<K>>,
    pub(crate) bounds_key: Option<NamedRegionKey<K>>,
    pub(crate) delimiter: Option<SmolStr>,
    pub(crate) strategies: Vec<NameStrategy<N, K>>,
    pub(crate) reference_sets: Vec<RefSetSpec<N, K>>,
}

/// All strategies registered under one plain-region key.
pub(crate) struct RegionSet<N: TreeNode, T: Payload> {
    pub(crate) key: RegionsKey<T>,
    pub(crate) strategies: Vec<RegionStrategy<N, T>>,
    pub(crate) token_strategies: Vec<TokenStrategy<T>>,
}

/// All strategies registered under one singleton key.
pub(crate) struct SingletonSet<N: TreeNode, V: Payload> {
    pub(crate) key: SingletonKey<V>,
    pub(crate) strategies: Vec<SingletonStrategy<N, V>>,
}

/// Stable digest over the registered strategy set, for cache invalidation.
///
/// Closures contribute their `type_name`, which shifts whenever the defining
/// code moves or changes - the practical equivalent of hashing lambda
/// content. This hash is never used for identity, only to detect that a
/// cached extraction was produced by different strategies.
pub(crate) fn digest_hash(parts: &[String]) -> u64 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
