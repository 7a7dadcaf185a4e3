//! Foundation types for the extraction engine.
//!
//! This module provides the fundamental types used throughout the crate:
//! - [`RegionsKey`], [`NamedRegionKey`], [`NameReferenceSetKey`], [`SingletonKey`] -
//!   typed keys for registering strategies and retrieving results
//! - [`RegionKind`] - the closed "kind" enumeration contract for named regions
//! - [`Payload`] - the value contract for plain regions and singleton facts
//! - [`NamePool`], [`DecodeError`] - binary codec primitives
//!
//! This module has NO dependencies on other tessera modules.

mod codec;
mod key;
mod kind;

pub use codec::{DecodeError, NamePool, Payload};
pub use key::{NameReferenceSetKey, NamedRegionKey, RegionsKey, SingletonKey};
pub use kind::RegionKind;

pub(crate) use codec::{
    read_range, read_str, read_u8, read_u16, read_u32, read_u64, write_range, write_str, write_u8,
    write_u16, write_u32, write_u64,
};
pub(crate) use key::KeyId;

// Re-export text-size types for convenience
pub use text_size::{TextRange, TextSize};
