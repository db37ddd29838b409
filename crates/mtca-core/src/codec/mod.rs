//! Canonical length-prefixed binary encoding.
//!
//! Every artifact the CA persists or serves is encoded through this module:
//! big-endian fixed-width integers, `opaque<N>` byte arrays, and
//! length-prefixed vectors with a 1, 2, or 3 byte prefix. Tagged unions are
//! a 2-byte tag followed by a 2-byte-length-prefixed body, so a decoder can
//! reject unknown variants without guessing at their length.
//!
//! The encoding is canonical: a given logical value has exactly one byte
//! representation, and decoders reject inputs with a smaller canonical form
//! (out-of-order set entries, duplicate entries, trailing bytes).

use thiserror::Error;

/// Errors produced while decoding canonical bytes.
///
/// Offsets refer to the position in the input buffer at which the problem
/// was detected.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// Input ended before the structure was complete.
    #[error("truncated input at offset {offset}")]
    Truncated {
        /// Byte offset at which more data was expected.
        offset: usize,
    },

    /// Input continued past the end of the structure.
    #[error("trailing garbage at offset {offset}")]
    TrailingGarbage {
        /// Byte offset of the first unconsumed byte.
        offset: usize,
    },

    /// A tagged union carried a tag this implementation does not know.
    #[error("unknown tag {tag:#06x}")]
    UnknownTag {
        /// The unrecognized 2-byte tag value.
        tag: u16,
    },

    /// A length prefix exceeds what its field may carry.
    #[error("length {length} overflows maximum {max}")]
    LengthOverflow {
        /// The offending length.
        length: usize,
        /// The maximum the field admits.
        max: usize,
    },

    /// The bytes decode, but are not the canonical form of the value.
    #[error("non-canonical encoding at offset {offset}: {reason}")]
    NonCanonical {
        /// Why the input is not canonical.
        reason: &'static str,
        /// Byte offset at which the violation was detected.
        offset: usize,
    },
}

/// Maximum value representable by a 3-byte length prefix.
pub const MAX_U24: usize = 0xff_ffff;

// ============================================================================
// Encoder
// ============================================================================

/// Append-only canonical encoder.
///
/// Length prefixes are back-patched: [`Encoder::length_prefixed`] reserves
/// the prefix, runs the body closure, then writes the measured length.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Creates an encoder with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Consumes the encoder, returning the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes a single byte.
    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Writes a big-endian `u16`.
    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Writes a big-endian 3-byte integer. `v` must not exceed [`MAX_U24`].
    pub fn u24(&mut self, v: u32) {
        debug_assert!(v as usize <= MAX_U24);
        self.buf.extend_from_slice(&v.to_be_bytes()[1..]);
    }

    /// Writes a big-endian `u32`.
    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Writes a big-endian `u64`.
    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Writes raw bytes with no prefix (`opaque<N>` fields).
    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Writes a body produced by `f` behind an `L`-byte big-endian length
    /// prefix.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::LengthOverflow`] when the body does not fit the
    /// prefix width.
    pub fn length_prefixed<const L: usize>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), CodecError>,
    ) -> Result<(), CodecError> {
        let prefix_at = self.buf.len();
        self.buf.extend_from_slice(&[0u8; L]);
        let body_at = self.buf.len();

        f(self)?;

        let length = self.buf.len() - body_at;
        let max = max_for_prefix(L);
        if length > max {
            return Err(CodecError::LengthOverflow { length, max });
        }
        let be = (length as u64).to_be_bytes();
        self.buf[prefix_at..body_at].copy_from_slice(&be[8 - L..]);
        Ok(())
    }

    /// Writes `v` behind an `L`-byte length prefix (`vec<u8, L>` fields).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::LengthOverflow`] when `v` does not fit.
    pub fn vec<const L: usize>(&mut self, v: &[u8]) -> Result<(), CodecError> {
        self.length_prefixed::<L>(|enc| {
            enc.bytes(v);
            Ok(())
        })
    }
}

const fn max_for_prefix(l: usize) -> usize {
    (1usize << (8 * l)) - 1
}

// ============================================================================
// Decoder
// ============================================================================

/// Cursor over canonical bytes.
///
/// Each read advances the cursor; [`Decoder::finish`] asserts the input was
/// consumed exactly. Sub-structures with their own length prefix are read
/// through [`Decoder::vec`], which returns the body slice so the caller can
/// run a nested decoder over it.
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    /// Offset of `buf[0]` within the outermost input, so nested decoders
    /// report absolute offsets.
    base: usize,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, base: 0 }
    }

    /// Creates a decoder over a nested body slice, reporting offsets
    /// relative to the outermost input.
    #[must_use]
    pub fn nested(buf: &'a [u8], base: usize) -> Self {
        Self { buf, pos: 0, base }
    }

    /// Absolute offset of the cursor within the outermost input.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Bytes remaining.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether the input is exhausted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Takes `n` raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] when fewer than `n` bytes remain.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                offset: self.offset(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Takes an `opaque<N>` field as a fixed-size array.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] when fewer than `N` bytes remain.
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] on empty input.
    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    /// Reads a big-endian `u16`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] when fewer than 2 bytes remain.
    pub fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    /// Reads a big-endian 3-byte integer.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] when fewer than 3 bytes remain.
    pub fn u24(&mut self) -> Result<u32, CodecError> {
        let b = self.take(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    /// Reads a big-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] when fewer than 4 bytes remain.
    pub fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    /// Reads a big-endian `u64`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] when fewer than 8 bytes remain.
    pub fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    /// Reads a `vec<u8, L>` field, returning its body slice.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] when the prefix or body is cut
    /// short.
    pub fn vec<const L: usize>(&mut self) -> Result<&'a [u8], CodecError> {
        let length = match L {
            1 => usize::from(self.u8()?),
            2 => usize::from(self.u16()?),
            3 => self.u24()? as usize,
            _ => unreachable!("unsupported length prefix width"),
        };
        self.take(length)
    }

    /// Reads a `vec<u8, L>` field and returns a nested decoder over its
    /// body, with absolute offsets preserved.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] when the prefix or body is cut
    /// short.
    pub fn nested_vec<const L: usize>(&mut self) -> Result<Decoder<'a>, CodecError> {
        let at = self.offset() + L;
        let body = self.vec::<L>()?;
        Ok(Decoder::nested(body, at))
    }

    /// Asserts the input was consumed exactly.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TrailingGarbage`] when bytes remain.
    pub fn finish(&self) -> Result<(), CodecError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingGarbage {
                offset: self.offset(),
            })
        }
    }

    /// Reports a non-canonical encoding at the current offset.
    #[must_use]
    pub fn non_canonical(&self, reason: &'static str) -> CodecError {
        CodecError::NonCanonical {
            reason,
            offset: self.offset(),
        }
    }
}
