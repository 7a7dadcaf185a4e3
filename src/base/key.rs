//! Typed extraction keys.
//!
//! A key is an opaque token created once (typically as a `static`) and used
//! both to register a strategy and to retrieve its results from an
//! [`Extraction`](crate::extraction::Extraction). The declared value/kind
//! type travels with the key as a phantom parameter, so a lookup with the
//! wrong key type simply fails to downcast at the call boundary - the store
//! itself is untyped.

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;

use super::codec::Payload;
use super::kind::RegionKind;

/// Internal identity of a key: its name plus the `TypeId` of the concrete
/// collection stored under it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct KeyId {
    pub(crate) name: &'static str,
    pub(crate) ty: TypeId,
}

impl KeyId {
    pub(crate) fn of<C: 'static>(name: &'static str) -> Self {
        Self {
            name,
            ty: TypeId::of::<C>(),
        }
    }
}

macro_rules! key_type {
    ($(#[$doc:meta])* $name:ident, $bound:ident) => {
        $(#[$doc])*
        pub struct $name<T: $bound> {
            name: &'static str,
            _marker: PhantomData<fn() -> T>,
        }

        impl<T: $bound> $name<T> {
            /// Create a key. Keys are compared by name and declared type, so
            /// two keys with the same name and type are interchangeable.
            pub const fn new(name: &'static str) -> Self {
                Self {
                    name,
                    _marker: PhantomData,
                }
            }

            pub fn name(&self) -> &'static str {
                self.name
            }
        }

        impl<T: $bound> Clone for $name<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T: $bound> Copy for $name<T> {}

        impl<T: $bound> PartialEq for $name<T> {
            fn eq(&self, other: &Self) -> bool {
                self.name == other.name
            }
        }

        impl<T: $bound> Eq for $name<T> {}

        impl<T: $bound> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.name)
            }
        }
    };
}

key_type! {
    /// Key for plain [`SemanticRegions`](crate::regions::SemanticRegions)
    /// carrying values of type `T`.
    RegionsKey, Payload
}

key_type! {
    /// Key for [`NamedRegions`](crate::regions::NamedRegions) whose entries
    /// are classified by the kind enumeration `T`.
    NamedRegionKey, RegionKind
}

key_type! {
    /// Key for the reference sets, unknown references, and reference graph
    /// collected against one named-region group.
    NameReferenceSetKey, RegionKind
}

key_type! {
    /// Key for at-most-once facts stored as
    /// [`SingletonEncounters`](crate::regions::SingletonEncounters).
    SingletonKey, Payload
}
