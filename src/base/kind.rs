//! The "kind" contract for named regions.

use std::fmt;
use std::hash::Hash;

/// A closed enumeration classifying named regions under one key.
///
/// Implementations are expected to be small fieldless enums. The ordinal
/// mapping is part of the serialized form, so it must be stable across
/// releases of the implementing crate: never renumber existing variants.
pub trait RegionKind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Stable ordinal for the binary external form.
    fn ordinal(self) -> u16;

    /// Inverse of [`RegionKind::ordinal`]. Returns `None` for ordinals this
    /// version does not know, which readers surface as a decode error.
    fn from_ordinal(ordinal: u16) -> Option<Self>;
}
