//! The tree-walking extraction algorithm.
//!
//! One depth-first pass runs every name, plain-region, and singleton
//! strategy; a second pass over the same tree runs reference strategies
//! against the completed name collections. Ancestor qualification uses
//! activation counters: an integer per strategy, incremented on entering a
//! qualifying node and decremented on leaving it, so "is this strategy
//! active" is an O(1) check at every node and ancestor chains are never
//! materialized or searched.

use std::panic::{AssertUnwindSafe, catch_unwind};

use smol_str::SmolStr;
use text_size::TextRange;
use tracing::trace;

use crate::base::{Payload, RegionKind};
use crate::extraction::Extraction;
use crate::refs::{GraphBuilder, NameReference, ReferenceSets, UnknownRefs};
use crate::regions::{NamedRegions, SemanticRegions, SingletonEncounters};
use crate::tree::{TokenStream, TreeNode};

use super::strategy::{NameGroup, NameSpec, RegionSet, SingletonSet};

/// One strategy set's state across an extraction run.
pub(crate) trait PassRun<N: TreeNode> {
    fn enter(&mut self, node: &N);

    fn leave(&mut self, node: &N);

    /// Transition from the primary pass to the reference pass. Returns true
    /// when this run participates in the reference pass.
    fn seal_for_references(&mut self) -> bool {
        false
    }

    /// Store the accumulated results.
    fn finish(self: Box<Self>, out: &mut Extraction);
}

/// A registered strategy set, able to start a fresh run per extraction.
pub(crate) trait ErasedPass<N: TreeNode>: Send + Sync {
    fn begin<'a>(&'a self) -> Box<dyn PassRun<N> + 'a>;

    /// Run any token-stream strategies. Most sets have none.
    fn scan_tokens(&self, _tokens: &mut dyn TokenStream, _out: &mut Extraction) {}
}

/// Depth-first walk driving every run's enter/leave hooks.
///
/// Returns false when cancelled. Leave hooks still fire on the unwound path
/// so activation counters and scope stacks stay balanced.
pub(crate) fn walk<N: TreeNode>(
    node: &N,
    runs: &mut Vec<Box<dyn PassRun<N> + '_>>,
    cancel: &dyn Fn() -> bool,
) -> bool {
    if cancel() {
        trace!("[WALK] cancelled at {:?} node", node.kind());
        return false;
    }
    for run in runs.iter_mut() {
        run.enter(node);
    }
    let mut complete = true;
    for child in node.children() {
        if !walk(&child, runs, cancel) {
            complete = false;
            break;
        }
    }
    for run in runs.iter_mut() {
        run.leave(node);
    }
    complete
}

/// Invoke one strategy at one node, recovering from panics.
///
/// A panicking strategy loses its contribution for this node only; the walk
/// and every other strategy continue.
fn guarded<N: TreeNode, R>(what: &str, node: &N, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                "[WALK] {what} strategy panicked at {:?} node {:?}: {message}",
                node.kind(),
                node.range()
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

// ---------------------------------------------------------------------------
// named-region groups
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Names,
    References,
    Done,
}

struct NameFrame {
    bumped: Vec<usize>,
    pushed_scope: bool,
}

struct RefFrame {
    bumped: Vec<(usize, usize)>,
}

struct RefAccumulator<K> {
    sets: ReferenceSets<K>,
    unknowns: UnknownRefs<K>,
    graph: GraphBuilder,
}

pub(crate) struct NameGroupRun<'a, N: TreeNode, K: RegionKind> {
    group: &'a NameGroup<N, K>,
    phase: Phase,
    counters: Vec<u32>,
    ref_counters: Vec<Vec<u32>>,
    scope: Vec<SmolStr>,
    name_frames: Vec<NameFrame>,
    ref_frames: Vec<RefFrame>,
    name_positions: NamedRegions<K>,
    bounds: NamedRegions<K>,
    references: Vec<RefAccumulator<K>>,
}

impl<'a, N: TreeNode, K: RegionKind> NameGroupRun<'a, N, K> {
    fn new(group: &'a NameGroup<N, K>) -> Self {
        Self {
            group,
            phase: Phase::Names,
            counters: group
                .strategies
                .iter()
                .map(|s| s.activation.initial_count())
                .collect(),
            ref_counters: Vec::new(),
            scope: Vec::new(),
            name_frames: Vec::new(),
            ref_frames: Vec::new(),
            name_positions: NamedRegions::new(),
            bounds: NamedRegions::new(),
            references: Vec::new(),
        }
    }

    fn qualified(&self, short: &SmolStr, delimiter: &str) -> SmolStr {
        if self.scope.is_empty() {
            return short.clone();
        }
        let mut joined = String::new();
        for fragment in &self.scope {
            joined.push_str(fragment);
            joined.push_str(delimiter);
        }
        joined.push_str(short);
        SmolStr::new(joined)
    }

    fn enter_names(&mut self, node: &N) {
        let mut specs: Vec<NameSpec<K>> = Vec::new();
        for (i, strategy) in self.group.strategies.iter().enumerate() {
            if self.counters[i] > 0 && node.kind() == strategy.target {
                guarded("name", node, || {
                    (strategy.extract)(node, &mut |spec| specs.push(spec));
                });
            }
        }

        let mut scope_fragment: Option<SmolStr> = None;
        for spec in specs {
            let short = spec.name;
            let full = match &self.group.delimiter {
                Some(delim) => self.qualified(&short, delim),
                None => short.clone(),
            };
            let bounds_range = spec.bounds.unwrap_or_else(|| node.range());
            trace!(
                "[WALK] name '{}' ({:?}) at {:?}",
                full,
                spec.kind,
                spec.name_range
            );
            self.name_positions
                .add(full.clone(), short.clone(), spec.kind, spec.name_range);
            self.bounds.add(full, short.clone(), spec.kind, bounds_range);
            if scope_fragment.is_none() {
                scope_fragment = Some(short);
            }
        }

        let mut frame = NameFrame {
            bumped: Vec::new(),
            pushed_scope: false,
        };
        for (i, strategy) in self.group.strategies.iter().enumerate() {
            if strategy.activation.qualifies(node) {
                self.counters[i] += 1;
                frame.bumped.push(i);
            }
        }
        if self.group.delimiter.is_some() {
            if let Some(fragment) = scope_fragment {
                self.scope.push(fragment);
                frame.pushed_scope = true;
            }
        }
        self.name_frames.push(frame);
    }

    fn leave_names(&mut self) {
        if let Some(frame) = self.name_frames.pop() {
            for i in frame.bumped {
                self.counters[i] -= 1;
            }
            if frame.pushed_scope {
                self.scope.pop();
            }
        }
    }

    fn enter_references(&mut self, node: &N) {
        // Copy the group reference out so `record_candidate` can borrow
        // `self` mutably while the strategy list is being iterated.
        let group = self.group;
        let mut frame = RefFrame { bumped: Vec::new() };
        for (si, set) in group.reference_sets.iter().enumerate() {
            for (ri, strategy) in set.strategies.iter().enumerate() {
                if self.ref_counters[si][ri] > 0 && node.kind() == strategy.target {
                    let candidate =
                        guarded("reference", node, || (strategy.extract)(node)).flatten();
                    if let Some(candidate) = candidate {
                        self.record_candidate(si, candidate);
                    }
                }
                if strategy.activation.qualifies(node) {
                    self.ref_counters[si][ri] += 1;
                    frame.bumped.push((si, ri));
                }
            }
        }
        self.ref_frames.push(frame);
    }

    fn record_candidate(&mut self, set_index: usize, candidate: super::strategy::RefCandidate<K>) {
        let acc = &mut self.references[set_index];
        match self.bounds.get(&candidate.name) {
            Some(target_region) => {
                let target = target_region.index();
                let canonical = target_region.name().clone();
                let referencer = self.bounds.index_of_containing(candidate.range.start());
                trace!(
                    "[WALK] reference '{}' -> '{}' (target {}, referencer {:?})",
                    candidate.name, canonical, target, referencer
                );
                acc.sets.add(NameReference::new(
                    candidate.name,
                    canonical,
                    candidate.range,
                    target,
                    referencer,
                    candidate.expected,
                ));
                if let Some(from) = referencer {
                    acc.graph.add_edge(from, target);
                }
            }
            None => {
                trace!("[WALK] unknown reference '{}'", candidate.name);
                acc.unknowns
                    .add(candidate.name, candidate.range, candidate.expected);
            }
        }
    }

    fn leave_references(&mut self) {
        if let Some(frame) = self.ref_frames.pop() {
            for (si, ri) in frame.bumped {
                self.ref_counters[si][ri] -= 1;
            }
        }
    }
}

impl<'a, N: TreeNode, K: RegionKind> PassRun<N> for NameGroupRun<'a, N, K> {
    fn enter(&mut self, node: &N) {
        match self.phase {
            Phase::Names => self.enter_names(node),
            Phase::References => self.enter_references(node),
            Phase::Done => {}
        }
    }

    fn leave(&mut self, _node: &N) {
        match self.phase {
            Phase::Names => self.leave_names(),
            Phase::References => self.leave_references(),
            Phase::Done => {}
        }
    }

    fn seal_for_references(&mut self) -> bool {
        if self.phase != Phase::Names {
            return false;
        }
        if self.group.reference_sets.is_empty() {
            self.phase = Phase::Done;
            return false;
        }
        let node_count = self.bounds.len();
        self.references = self
            .group
            .reference_sets
            .iter()
            .map(|_| RefAccumulator {
                sets: ReferenceSets::new(),
                unknowns: UnknownRefs::new(),
                graph: GraphBuilder::new(node_count),
            })
            .collect();
        self.ref_counters = self
            .group
            .reference_sets
            .iter()
            .map(|set| {
                set.strategies
                    .iter()
                    .map(|s| s.activation.initial_count())
                    .collect()
            })
            .collect();
        self.phase = Phase::References;
        true
    }

    fn finish(self: Box<Self>, out: &mut Extraction) {
        let this = *self;
        if let Some(key) = this.group.name_pos_key {
            out.insert_named(key.name(), this.name_positions);
        }
        if let Some(key) = this.group.bounds_key {
            out.insert_named(key.name(), this.bounds);
        }
        for (spec, acc) in this.group.reference_sets.iter().zip(this.references) {
            out.insert_references(spec.key.name(), acc.sets);
            out.insert_unknowns(spec.key.name(), acc.unknowns);
            out.insert_graph(spec.key.name(), acc.graph.build());
        }
    }
}

impl<N: TreeNode, K: RegionKind> ErasedPass<N> for NameGroup<N, K> {
    fn begin<'a>(&'a self) -> Box<dyn PassRun<N> + 'a> {
        Box::new(NameGroupRun::new(self))
    }
}

// ---------------------------------------------------------------------------
// plain-region sets
// ---------------------------------------------------------------------------

pub(crate) struct RegionSetRun<'a, N: TreeNode, T: Payload> {
    set: &'a RegionSet<N, T>,
    counters: Vec<u32>,
    frames: Vec<Vec<usize>>,
    emitted: Vec<(T, TextRange)>,
    done: bool,
}

impl<'a, N: TreeNode, T: Payload> PassRun<N> for RegionSetRun<'a, N, T> {
    fn enter(&mut self, node: &N) {
        if self.done {
            return;
        }
        for (i, strategy) in self.set.strategies.iter().enumerate() {
            if self.counters[i] > 0 && node.kind() == strategy.target {
                let emitted = &mut self.emitted;
                guarded("region", node, || {
                    (strategy.emit)(node, &mut |value, range| emitted.push((value, range)));
                });
            }
        }
        let mut bumped = Vec::new();
        for (i, strategy) in self.set.strategies.iter().enumerate() {
            if strategy.activation.qualifies(node) {
                self.counters[i] += 1;
                bumped.push(i);
            }
        }
        self.frames.push(bumped);
    }

    fn leave(&mut self, _node: &N) {
        if self.done {
            return;
        }
        if let Some(bumped) = self.frames.pop() {
            for i in bumped {
                self.counters[i] -= 1;
            }
        }
    }

    fn seal_for_references(&mut self) -> bool {
        self.done = true;
        false
    }

    fn finish(self: Box<Self>, out: &mut Extraction) {
        out.insert_regions_combined(self.set.key.name(), sorted_regions(self.emitted));
    }
}

/// Emissions arrive in traversal order, which is ascending-start for
/// strategies that stay within their matched node; a stable sort restores
/// the collection invariant for the ones that do not.
fn sorted_regions<T: Payload>(mut emitted: Vec<(T, TextRange)>) -> SemanticRegions<T> {
    emitted.sort_by_key(|(_, range)| range.start());
    let mut regions = SemanticRegions::new();
    for (value, range) in emitted {
        regions.push(value, range);
    }
    regions
}

impl<N: TreeNode, T: Payload> ErasedPass<N> for RegionSet<N, T> {
    fn begin<'a>(&'a self) -> Box<dyn PassRun<N> + 'a> {
        Box::new(RegionSetRun {
            set: self,
            counters: self
                .strategies
                .iter()
                .map(|s| s.activation.initial_count())
                .collect(),
            frames: Vec::new(),
            emitted: Vec::new(),
            done: false,
        })
    }

    fn scan_tokens(&self, tokens: &mut dyn TokenStream, out: &mut Extraction) {
        for strategy in &self.token_strategies {
            tokens.rewind();
            let mut emitted = Vec::new();
            while let Some(token) = tokens.next_token() {
                if !(strategy.filter)(&token) {
                    continue;
                }
                if let Some((value, range)) = (strategy.emit)(&token) {
                    emitted.push((value, range));
                }
            }
            if !emitted.is_empty() {
                out.insert_regions_combined(self.key.name(), sorted_regions(emitted));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// singleton sets
// ---------------------------------------------------------------------------

pub(crate) struct SingletonSetRun<'a, N: TreeNode, V: Payload> {
    set: &'a SingletonSet<N, V>,
    counters: Vec<u32>,
    frames: Vec<Vec<usize>>,
    encounters: SingletonEncounters<V>,
    done: bool,
}

impl<'a, N: TreeNode, V: Payload> PassRun<N> for SingletonSetRun<'a, N, V> {
    fn enter(&mut self, node: &N) {
        if self.done {
            return;
        }
        for (i, strategy) in self.set.strategies.iter().enumerate() {
            if self.counters[i] > 0 && node.kind() == strategy.target {
                let found = guarded("singleton", node, || (strategy.extract)(node)).flatten();
                if let Some((value, range)) = found {
                    // Every encounter is appended; multiplicity stays visible.
                    self.encounters.append(value, range);
                }
            }
        }
        let mut bumped = Vec::new();
        for (i, strategy) in self.set.strategies.iter().enumerate() {
            if strategy.activation.qualifies(node) {
                self.counters[i] += 1;
                bumped.push(i);
            }
        }
        self.frames.push(bumped);
    }

    fn leave(&mut self, _node: &N) {
        if self.done {
            return;
        }
        if let Some(bumped) = self.frames.pop() {
            for i in bumped {
                self.counters[i] -= 1;
            }
        }
    }

    fn seal_for_references(&mut self) -> bool {
        self.done = true;
        false
    }

    fn finish(self: Box<Self>, out: &mut Extraction) {
        out.insert_singletons(self.set.key.name(), self.encounters);
    }
}

impl<N: TreeNode, V: Payload> ErasedPass<N> for SingletonSet<N, V> {
    fn begin<'a>(&'a self) -> Box<dyn PassRun<N> + 'a> {
        Box::new(SingletonSetRun {
            set: self,
            counters: self
                .strategies
                .iter()
                .map(|s| s.activation.initial_count())
                .collect(),
            frames: Vec::new(),
            encounters: SingletonEncounters::new(),
            done: false,
        })
    }
}
