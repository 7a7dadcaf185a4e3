//! Binary codec primitives for the versioned external form.
//!
//! All multi-byte integers are little-endian. Symbol names are deduplicated
//! through a shared [`NamePool`] written once at the head of the stream, so
//! a name that appears in several collections costs one string plus `u32`
//! references.

use std::fmt;
use std::io::{self, Read, Write};

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use text_size::{TextRange, TextSize};
use thiserror::Error;

/// Errors that can occur while reading a serialized extraction.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// IO error from the underlying reader.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The stream was written by a format version this reader does not know.
    /// The caller must discard the artifact and re-extract from source.
    #[error("unsupported extraction format version: {0}")]
    UnsupportedVersion(u32),

    /// A string in the name pool was not valid UTF-8.
    #[error("invalid UTF-8 in name pool")]
    InvalidUtf8,

    /// A name reference pointed outside the name pool.
    #[error("name index {0} out of range")]
    BadNameIndex(u32),

    /// The stream names an extraction key the current extractor never
    /// registered. Treated as corrupt data rather than guessed at.
    #[error("unknown extraction key: {0}")]
    UnknownKey(String),

    /// The stream was produced by a different strategy set. The artifact is
    /// stale; the caller must re-extract from source.
    #[error("extraction written by different strategies ({found:#x}, expected {expected:#x})")]
    StaleStrategies { expected: u64, found: u64 },

    /// A kind ordinal has no variant in the current kind enumeration.
    #[error("invalid kind ordinal {ordinal} for {kind_type}")]
    BadKindOrdinal {
        kind_type: &'static str,
        ordinal: u16,
    },

    /// Structurally malformed payload data.
    #[error("malformed extraction payload: {0}")]
    Malformed(&'static str),
}

/// Shared name-deduplication context for the binary form.
///
/// Built in a collect pass before encoding; during encoding names are
/// written as `u32` indexes into this pool.
#[derive(Debug, Default, Clone)]
pub struct NamePool {
    names: Vec<SmolStr>,
    index: FxHashMap<SmolStr, u32>,
}

impl NamePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name to the pool, returning its index. Idempotent.
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.names.len() as u32;
        let name = SmolStr::new(name);
        self.names.push(name.clone());
        self.index.insert(name, idx);
        idx
    }

    /// Index of an already-collected name. Encoding a name that was never
    /// collected is a bug in the collect pass, reported as an IO error.
    pub fn id_of(&self, name: &str) -> io::Result<u32> {
        self.index.get(name).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("name '{name}' missing from pool"),
            )
        })
    }

    /// Resolve a name index read from the stream.
    pub fn get(&self, idx: u32) -> Result<&SmolStr, DecodeError> {
        self.names
            .get(idx as usize)
            .ok_or(DecodeError::BadNameIndex(idx))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub(crate) fn write_to(&self, w: &mut dyn Write) -> io::Result<()> {
        write_u32(w, self.names.len() as u32)?;
        for name in &self.names {
            write_str(w, name)?;
        }
        Ok(())
    }

    pub(crate) fn read_from(r: &mut dyn Read) -> Result<Self, DecodeError> {
        let count = read_u32(r)?;
        let mut pool = Self::new();
        for _ in 0..count {
            let name = read_str(r)?;
            pool.intern(&name);
        }
        Ok(pool)
    }
}

/// A value that can be attached to plain regions and singleton facts.
///
/// The codec methods define how the value round-trips through the binary
/// external form; symbol-name-like values should route through the pool.
pub trait Payload: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    fn encode(&self, w: &mut dyn Write, pool: &NamePool) -> io::Result<()>;

    fn decode(r: &mut dyn Read, pool: &NamePool) -> Result<Self, DecodeError>
    where
        Self: Sized;

    /// Contribute names to the shared pool before encoding. Default: none.
    fn collect_names(&self, _pool: &mut NamePool) {}
}

impl Payload for () {
    fn encode(&self, _w: &mut dyn Write, _pool: &NamePool) -> io::Result<()> {
        Ok(())
    }

    fn decode(_r: &mut dyn Read, _pool: &NamePool) -> Result<Self, DecodeError> {
        Ok(())
    }
}

impl Payload for bool {
    fn encode(&self, w: &mut dyn Write, _pool: &NamePool) -> io::Result<()> {
        write_u8(w, u8::from(*self))
    }

    fn decode(r: &mut dyn Read, _pool: &NamePool) -> Result<Self, DecodeError> {
        Ok(read_u8(r)? != 0)
    }
}

macro_rules! int_payload {
    ($($ty:ty => $write:ident / $read:ident),* $(,)?) => {
        $(
            impl Payload for $ty {
                fn encode(&self, w: &mut dyn Write, _pool: &NamePool) -> io::Result<()> {
                    $write(w, *self)
                }

                fn decode(r: &mut dyn Read, _pool: &NamePool) -> Result<Self, DecodeError> {
                    $read(r)
                }
            }
        )*
    };
}

int_payload! {
    u8 => write_u8 / read_u8,
    u16 => write_u16 / read_u16,
    u32 => write_u32 / read_u32,
    u64 => write_u64 / read_u64,
}

impl Payload for String {
    fn encode(&self, w: &mut dyn Write, pool: &NamePool) -> io::Result<()> {
        write_u32(w, pool.id_of(self)?)
    }

    fn decode(r: &mut dyn Read, pool: &NamePool) -> Result<Self, DecodeError> {
        let idx = read_u32(r)?;
        Ok(pool.get(idx)?.to_string())
    }

    fn collect_names(&self, pool: &mut NamePool) {
        pool.intern(self);
    }
}

impl Payload for SmolStr {
    fn encode(&self, w: &mut dyn Write, pool: &NamePool) -> io::Result<()> {
        write_u32(w, pool.id_of(self)?)
    }

    fn decode(r: &mut dyn Read, pool: &NamePool) -> Result<Self, DecodeError> {
        let idx = read_u32(r)?;
        Ok(pool.get(idx)?.clone())
    }

    fn collect_names(&self, pool: &mut NamePool) {
        pool.intern(self);
    }
}

// ---------------------------------------------------------------------------
// primitive readers/writers
// ---------------------------------------------------------------------------

pub(crate) fn write_u8(w: &mut dyn Write, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub(crate) fn write_u16(w: &mut dyn Write, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub(crate) fn write_u32(w: &mut dyn Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub(crate) fn write_u64(w: &mut dyn Write, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub(crate) fn write_str(w: &mut dyn Write, s: &str) -> io::Result<()> {
    write_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes())
}

pub(crate) fn write_range(w: &mut dyn Write, range: TextRange) -> io::Result<()> {
    write_u32(w, range.start().into())?;
    write_u32(w, range.end().into())
}

pub(crate) fn read_u8(r: &mut dyn Read) -> Result<u8, DecodeError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub(crate) fn read_u16(r: &mut dyn Read) -> Result<u16, DecodeError> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32(r: &mut dyn Read) -> Result<u32, DecodeError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64(r: &mut dyn Read) -> Result<u64, DecodeError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn read_str(r: &mut dyn Read) -> Result<SmolStr, DecodeError> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    let s = std::str::from_utf8(&buf).map_err(|_| DecodeError::InvalidUtf8)?;
    Ok(SmolStr::new(s))
}

pub(crate) fn read_range(r: &mut dyn Read) -> Result<TextRange, DecodeError> {
    let start = read_u32(r)?;
    let end = read_u32(r)?;
    if end < start {
        return Err(DecodeError::Malformed("region end precedes start"));
    }
    Ok(TextRange::new(TextSize::from(start), TextSize::from(end)))
}
