//! At-most-once facts with every encounter retained.

use text_size::TextRange;

use crate::base::Payload;

/// All encounters of a fact expected at most once per file.
///
/// Multiplicity is a first-class, inspectable property: the collection keeps
/// every encounter rather than silently coercing to the first, so consumers
/// can flag redundant declarations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SingletonEncounters<V> {
    encounters: Vec<(V, TextRange)>,
}

impl<V: Payload> SingletonEncounters<V> {
    pub fn new() -> Self {
        Self {
            encounters: Vec::new(),
        }
    }

    pub(crate) fn append(&mut self, value: V, range: TextRange) {
        self.encounters.push((value, range));
    }

    pub fn len(&self) -> usize {
        self.encounters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encounters.is_empty()
    }

    /// The first encounter, if any.
    pub fn first(&self) -> Option<&V> {
        self.encounters.first().map(|(v, _)| v)
    }

    pub fn first_range(&self) -> Option<TextRange> {
        self.encounters.first().map(|(_, r)| *r)
    }

    /// True when the fact occurred exactly once.
    pub fn is_exactly_one(&self) -> bool {
        self.encounters.len() == 1
    }

    /// True when the fact occurred exactly once and equals `value`.
    pub fn is_exactly(&self, value: &V) -> bool {
        self.is_exactly_one() && self.first() == Some(value)
    }

    /// Encounters beyond the first, for "redundant declaration" diagnostics.
    pub fn extras(&self) -> impl Iterator<Item = (&V, TextRange)> {
        self.encounters.iter().skip(1).map(|(v, r)| (v, *r))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&V, TextRange)> {
        self.encounters.iter().map(|(v, r)| (v, *r))
    }
}
