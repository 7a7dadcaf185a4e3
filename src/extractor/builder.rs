//! Fluent registration DSL for extraction strategies.
//!
//! A builder describes, for one parse-tree entry-point type, what to
//! extract - without writing a traversal by hand. Misuse (a named-region
//! group with neither a name-position nor a bounds key, or with no
//! extraction strategies) is a programmer error and panics at registration
//! time rather than surfacing during extraction.

use std::any::type_name;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use text_size::TextRange;

use crate::base::{
    NameReferenceSetKey, NamedRegionKey, Payload, RegionKind, RegionsKey, SingletonKey,
};
use crate::extraction::serialize::{
    DecodeFn, Section, decode_named, decode_references, decode_regions, decode_singletons,
    decode_unknowns,
};
use crate::tree::{Token, TreeNode};

use super::Extractor;
use super::strategy::{
    Activation, NameGroup, NameSpec, NameStrategy, RefCandidate, RefSetSpec, RefStrategy,
    RegionSet, RegionStrategy, SingletonSet, SingletonStrategy, TokenStrategy, digest_hash,
};
use super::walk::ErasedPass;

/// Root builder returned by [`Extractor::builder`].
pub struct ExtractorBuilder<N: TreeNode> {
    passes: Vec<Box<dyn ErasedPass<N>>>,
    decoders: FxHashMap<(Section, SmolStr), DecodeFn>,
    graph_keys: FxHashMap<SmolStr, &'static str>,
    hash_parts: Vec<String>,
}

impl<N: TreeNode> ExtractorBuilder<N> {
    pub(crate) fn new() -> Self {
        Self {
            passes: Vec::new(),
            decoders: FxHashMap::default(),
            graph_keys: FxHashMap::default(),
            hash_parts: Vec::new(),
        }
    }

    /// Open a named-region group classified by the kind enumeration `K`.
    pub fn named_regions<K: RegionKind>(self) -> NamedRegionGroupBuilder<N, K> {
        NamedRegionGroupBuilder {
            parent: self,
            group: NameGroup {
                name_pos_key: None,
                bounds_key: None,
                delimiter: None,
                strategies: Vec::new(),
                reference_sets: Vec::new(),
            },
        }
    }

    /// Open a plain-region set stored under `key`.
    pub fn regions<T: Payload>(self, key: RegionsKey<T>) -> RegionSetBuilder<N, T> {
        RegionSetBuilder {
            parent: self,
            set: RegionSet {
                key,
                strategies: Vec::new(),
                token_strategies: Vec::new(),
            },
        }
    }

    /// Open a singleton-fact set stored under `key`.
    pub fn singleton<V: Payload>(self, key: SingletonKey<V>) -> SingletonSetBuilder<N, V> {
        SingletonSetBuilder {
            parent: self,
            set: SingletonSet {
                key,
                strategies: Vec::new(),
            },
        }
    }

    /// Finalize into an immutable, reusable [`Extractor`].
    pub fn build(self) -> Extractor<N> {
        let hash = digest_hash(&self.hash_parts);
        Extractor::from_parts(self.passes, self.decoders, self.graph_keys, hash)
    }
}

/// Builder for one named-region group.
pub struct NamedRegionGroupBuilder<N: TreeNode, K: RegionKind> {
    parent: ExtractorBuilder<N>,
    group: NameGroup<N, K>,
}

impl<N: TreeNode, K: RegionKind> NamedRegionGroupBuilder<N, K> {
    /// Record each declared name's token position under `key`.
    pub fn recording_name_positions_under(mut self, key: NamedRegionKey<K>) -> Self {
        self.group.name_pos_key = Some(key);
        self
    }

    /// Record each declaration's full rule bounds under `key`.
    pub fn recording_bounds_under(mut self, key: NamedRegionKey<K>) -> Self {
        self.group.bounds_key = Some(key);
        self
    }

    /// Enable nested scoping: a name declared inside another declaration's
    /// subtree is qualified with the enclosing names joined by `delimiter`.
    pub fn scoped_by(mut self, delimiter: impl Into<SmolStr>) -> Self {
        self.group.delimiter = Some(delimiter.into());
        self
    }

    /// Extract names from nodes of `kind`, active everywhere.
    pub fn extracting<F>(self, kind: N::Kind, extract: F) -> Self
    where
        F: Fn(&N, &mut dyn FnMut(NameSpec<K>)) + Send + Sync + 'static,
    {
        self.push_strategy(kind, Activation::Always, "always", extract)
    }

    /// Extract names from nodes of `kind`, but only inside the subtree of
    /// an ancestor of `ancestor` kind.
    pub fn extracting_below<F>(self, ancestor: N::Kind, kind: N::Kind, extract: F) -> Self
    where
        F: Fn(&N, &mut dyn FnMut(NameSpec<K>)) + Send + Sync + 'static,
    {
        let gate = format!("below {ancestor:?}");
        self.push_strategy(kind, Activation::BelowKind(ancestor), &gate, extract)
    }

    /// Extract names from nodes of `kind`, only inside subtrees of
    /// ancestors matching `pred`.
    pub fn extracting_when<P, F>(self, pred: P, kind: N::Kind, extract: F) -> Self
    where
        P: Fn(&N) -> bool + Send + Sync + 'static,
        F: Fn(&N, &mut dyn FnMut(NameSpec<K>)) + Send + Sync + 'static,
    {
        let gate = format!("when {}", type_name::<P>());
        self.push_strategy(kind, Activation::Below(Arc::new(pred)), &gate, extract)
    }

    fn push_strategy<F>(
        mut self,
        kind: N::Kind,
        activation: Activation<N>,
        gate: &str,
        extract: F,
    ) -> Self
    where
        F: Fn(&N, &mut dyn FnMut(NameSpec<K>)) + Send + Sync + 'static,
    {
        self.parent
            .hash_parts
            .push(format!("name:{kind:?}:{gate}:{}", type_name::<F>()));
        self.group.strategies.push(NameStrategy {
            target: kind,
            activation,
            extract: Arc::new(extract),
        });
        self
    }

    /// Open a reference set matched against this group's names.
    pub fn collecting_references_under(
        mut self,
        key: NameReferenceSetKey<K>,
    ) -> ReferenceSetBuilder<N, K> {
        self.parent.hash_parts.push(format!("refs:{}", key.name()));
        ReferenceSetBuilder {
            group: self,
            spec: RefSetSpec {
                key,
                strategies: Vec::new(),
            },
        }
    }

    /// Close the group. Panics unless at least one of the name-position /
    /// bounds keys and at least one extraction strategy were supplied.
    pub fn finish(mut self) -> ExtractorBuilder<N> {
        assert!(
            self.group.name_pos_key.is_some() || self.group.bounds_key.is_some(),
            "named-region group needs a name-position key or a bounds key"
        );
        assert!(
            !self.group.strategies.is_empty(),
            "named-region group has no name extraction strategies"
        );
        self.parent.hash_parts.push(format!(
            "named-regions:{:?}:{:?}:{:?}",
            self.group.name_pos_key.map(|k| k.name()),
            self.group.bounds_key.map(|k| k.name()),
            self.group.delimiter,
        ));

        if let Some(key) = self.group.name_pos_key {
            register_named_decoder::<K>(&mut self.parent.decoders, key.name());
        }
        if let Some(key) = self.group.bounds_key {
            register_named_decoder::<K>(&mut self.parent.decoders, key.name());
        }
        for set in &self.group.reference_sets {
            let name = set.key.name();
            self.parent.decoders.insert(
                (Section::References, SmolStr::new(name)),
                Box::new(move |r, pool, out| {
                    let sets = decode_references::<K>(r, pool)?;
                    out.insert_references(name, sets);
                    Ok(())
                }),
            );
            self.parent.decoders.insert(
                (Section::Unknowns, SmolStr::new(name)),
                Box::new(move |r, pool, out| {
                    let unknowns = decode_unknowns::<K>(r, pool)?;
                    out.insert_unknowns(name, unknowns);
                    Ok(())
                }),
            );
            self.parent.graph_keys.insert(SmolStr::new(name), name);
        }

        self.parent.passes.push(Box::new(self.group));
        self.parent
    }
}

/// Builder for the reference strategies of one reference-set key.
pub struct ReferenceSetBuilder<N: TreeNode, K: RegionKind> {
    group: NamedRegionGroupBuilder<N, K>,
    spec: RefSetSpec<N, K>,
}

impl<N: TreeNode, K: RegionKind> ReferenceSetBuilder<N, K> {
    /// Derive reference candidates from nodes of `kind`, active everywhere.
    pub fn on<F>(self, kind: N::Kind, extract: F) -> Self
    where
        F: Fn(&N) -> Option<RefCandidate<K>> + Send + Sync + 'static,
    {
        self.push_strategy(kind, Activation::Always, "always", extract)
    }

    /// Derive reference candidates from nodes of `kind`, only below an
    /// ancestor of `ancestor` kind.
    pub fn on_below<F>(self, ancestor: N::Kind, kind: N::Kind, extract: F) -> Self
    where
        F: Fn(&N) -> Option<RefCandidate<K>> + Send + Sync + 'static,
    {
        let gate = format!("below {ancestor:?}");
        self.push_strategy(kind, Activation::BelowKind(ancestor), &gate, extract)
    }

    fn push_strategy<F>(
        mut self,
        kind: N::Kind,
        activation: Activation<N>,
        gate: &str,
        extract: F,
    ) -> Self
    where
        F: Fn(&N) -> Option<RefCandidate<K>> + Send + Sync + 'static,
    {
        self.group
            .parent
            .hash_parts
            .push(format!("ref:{kind:?}:{gate}:{}", type_name::<F>()));
        self.spec.strategies.push(RefStrategy {
            target: kind,
            activation,
            extract: Arc::new(extract),
        });
        self
    }

    /// Close the reference set, returning to the owning group.
    pub fn finish(mut self) -> NamedRegionGroupBuilder<N, K> {
        assert!(
            !self.spec.strategies.is_empty(),
            "reference set '{}' has no candidate strategies",
            self.spec.key.name()
        );
        self.group.group.reference_sets.push(self.spec);
        self.group
    }
}

/// Builder for one plain-region key.
pub struct RegionSetBuilder<N: TreeNode, T: Payload> {
    parent: ExtractorBuilder<N>,
    set: RegionSet<N, T>,
}

impl<N: TreeNode, T: Payload> RegionSetBuilder<N, T> {
    /// Emit regions from nodes of `kind`, active everywhere. The closure
    /// may emit any number of (value, range) pairs through the sink.
    pub fn on<F>(self, kind: N::Kind, emit: F) -> Self
    where
        F: Fn(&N, &mut dyn FnMut(T, TextRange)) + Send + Sync + 'static,
    {
        self.push_strategy(kind, Activation::Always, "always", emit)
    }

    /// Emit regions from nodes of `kind`, only below an ancestor of
    /// `ancestor` kind.
    pub fn on_below<F>(self, ancestor: N::Kind, kind: N::Kind, emit: F) -> Self
    where
        F: Fn(&N, &mut dyn FnMut(T, TextRange)) + Send + Sync + 'static,
    {
        let gate = format!("below {ancestor:?}");
        self.push_strategy(kind, Activation::BelowKind(ancestor), &gate, emit)
    }

    fn push_strategy<F>(
        mut self,
        kind: N::Kind,
        activation: Activation<N>,
        gate: &str,
        emit: F,
    ) -> Self
    where
        F: Fn(&N, &mut dyn FnMut(T, TextRange)) + Send + Sync + 'static,
    {
        self.parent
            .hash_parts
            .push(format!("region:{kind:?}:{gate}:{}", type_name::<F>()));
        self.set.strategies.push(RegionStrategy {
            target: kind,
            activation,
            emit: Arc::new(emit),
        });
        self
    }

    /// Scan the token stream for lexical facts with no grammar rule
    /// (comments, whitespace runs). Results are unioned with the
    /// tree-derived regions for the same key, preserving start order.
    pub fn scanning_tokens<P, F>(mut self, filter: P, emit: F) -> Self
    where
        P: Fn(&Token) -> bool + Send + Sync + 'static,
        F: Fn(&Token) -> Option<(T, TextRange)> + Send + Sync + 'static,
    {
        self.parent.hash_parts.push(format!(
            "tokens:{}:{}",
            type_name::<P>(),
            type_name::<F>()
        ));
        self.set.token_strategies.push(TokenStrategy {
            filter: Arc::new(filter),
            emit: Arc::new(emit),
        });
        self
    }

    /// Close the region set.
    pub fn finish(mut self) -> ExtractorBuilder<N> {
        assert!(
            !self.set.strategies.is_empty() || !self.set.token_strategies.is_empty(),
            "region set '{}' has no strategies",
            self.set.key.name()
        );
        let name = self.set.key.name();
        self.parent.hash_parts.push(format!("regions:{name}"));
        self.parent.decoders.insert(
            (Section::Regions, SmolStr::new(name)),
            Box::new(move |r, pool, out| {
                let regions = decode_regions::<T>(r, pool)?;
                out.insert_regions_combined(name, regions);
                Ok(())
            }),
        );
        self.parent.passes.push(Box::new(self.set));
        self.parent
    }
}

/// Builder for one singleton-fact key.
pub struct SingletonSetBuilder<N: TreeNode, V: Payload> {
    parent: ExtractorBuilder<N>,
    set: SingletonSet<N, V>,
}

impl<N: TreeNode, V: Payload> SingletonSetBuilder<N, V> {
    /// Record encounters at nodes of `kind`, active everywhere.
    pub fn on<F>(self, kind: N::Kind, extract: F) -> Self
    where
        F: Fn(&N) -> Option<(V, TextRange)> + Send + Sync + 'static,
    {
        self.push_strategy(kind, Activation::Always, "always", extract)
    }

    /// Record encounters at nodes of `kind`, only below an ancestor of
    /// `ancestor` kind.
    pub fn on_below<F>(self, ancestor: N::Kind, kind: N::Kind, extract: F) -> Self
    where
        F: Fn(&N) -> Option<(V, TextRange)> + Send + Sync + 'static,
    {
        let gate = format!("below {ancestor:?}");
        self.push_strategy(kind, Activation::BelowKind(ancestor), &gate, extract)
    }

    fn push_strategy<F>(
        mut self,
        kind: N::Kind,
        activation: Activation<N>,
        gate: &str,
        extract: F,
    ) -> Self
    where
        F: Fn(&N) -> Option<(V, TextRange)> + Send + Sync + 'static,
    {
        self.parent
            .hash_parts
            .push(format!("singleton:{kind:?}:{gate}:{}", type_name::<F>()));
        self.set.strategies.push(SingletonStrategy {
            target: kind,
            activation,
            extract: Arc::new(extract),
        });
        self
    }

    /// Close the singleton set.
    pub fn finish(mut self) -> ExtractorBuilder<N> {
        assert!(
            !self.set.strategies.is_empty(),
            "singleton set '{}' has no strategies",
            self.set.key.name()
        );
        let name = self.set.key.name();
        self.parent
            .hash_parts
            .push(format!("singletons:{name}"));
        self.parent.decoders.insert(
            (Section::Singletons, SmolStr::new(name)),
            Box::new(move |r, pool, out| {
                let encounters = decode_singletons::<V>(r, pool)?;
                out.insert_singletons(name, encounters);
                Ok(())
            }),
        );
        self.parent.passes.push(Box::new(self.set));
        self.parent
    }
}

fn register_named_decoder<K: RegionKind>(
    decoders: &mut FxHashMap<(Section, SmolStr), DecodeFn>,
    name: &'static str,
) {
    decoders.insert(
        (Section::Named, SmolStr::new(name)),
        Box::new(move |r, pool, out| {
            let regions = decode_named::<K>(r, pool)?;
            out.insert_named(name, regions);
            Ok(())
        }),
    );
}
