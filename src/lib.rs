//! # tessera
//!
//! Semantic-extraction engine for editor language tooling: one traversal of
//! a caller-supplied parse tree collects every registered fact (named
//! declarations, references between them, plain regions, singleton facts),
//! producing an extraction that answers position and name queries without
//! re-walking the tree.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! extraction → result store, binary external form, cross-file resolution
//!   ↓
//! extractor  → builder DSL, strategies, the tree-walking algorithm
//!   ↓
//! refs       → reference sets, unknown references, reference graph
//!   ↓
//! regions    → plain/named regions, singleton encounters
//!   ↓
//! tree       → parse-tree and token-stream abstraction
//!   ↓
//! source     → source identity, import resolution
//!   ↓
//! base       → typed keys, kind/payload contracts, binary codec
//! ```

// ============================================================================
// MODULES (dependency order: base → source → tree → regions → refs →
// extractor → extraction)
// ============================================================================

/// Foundation types: typed keys, the kind and payload contracts, codec
pub mod base;

/// Source identity and import resolution
pub mod source;

/// Parse-tree and token-stream abstraction
pub mod tree;

/// Plain regions, named regions, singleton encounters
pub mod regions;

/// Reference sets, unknown references, the reference graph
pub mod refs;

/// Builder DSL, strategies, and the tree-walking algorithm
pub mod extractor;

/// The extraction store, its external form, and cross-file resolution
pub mod extraction;

// Re-export the everyday surface
pub use base::{
    DecodeError, NameReferenceSetKey, NamedRegionKey, Payload, RegionKind, RegionsKey,
    SingletonKey, TextRange, TextSize,
};
pub use extraction::{
    Attributed, Attribution, Extraction, ExtractionProvider, ResolutionOutcome, ResolveError,
    UnknownResolver,
};
pub use extractor::{Extractor, NameSpec, RefCandidate};
pub use refs::{NameReference, ReferenceGraph, ReferenceSets, UnknownRef, UnknownRefs};
pub use regions::{NamedRegion, NamedRegions, Region, SemanticRegions, SingletonEncounters};
pub use source::{MapSource, SourceOrigin};
pub use tree::{Token, TokenStream, TreeNode, VecTokenStream};
