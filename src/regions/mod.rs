//! Interval and named-interval model.
//!
//! [`Region`] is a half-open byte-offset interval with an attached value;
//! [`SemanticRegions`] is the ordered collection of regions extracted for
//! one key. [`NamedRegions`] adds declared names with canonical-first
//! deduplication and optional nested scoping. [`SingletonEncounters`]
//! records every occurrence of an at-most-once fact.

mod named;
mod region;
mod singleton;

pub use named::{NameInsertion, NamedRegion, NamedRegions};
pub use region::{Region, SemanticRegions};
pub use singleton::SingletonEncounters;
