//! # Mvmpack
//!
//! A distinctively small, positional serialization layer for wire commands.
//!
//! ## Philosophy
//!
//! - **Positional**: No field tags, no self-describing schema. The writer and
//!   the reader must perform the same sequence of primitive operations; the
//!   encode/decode symmetry *is* the contract.
//! - **Bounded**: Decoders are zero-copy, bounds-checked views. A stream that
//!   ends before all declared fields are read fails with `UnexpectedEnd`
//!   rather than reading garbage.
//!
//! ## Format
//!
//! - **Scalars**: raw little-endian bytes (`bool` is a single byte).
//! - **Blobs**: `[Len: u32 LE][Data: Len]`.
//! - **String lists**: `[Count: u32 LE][String: Count]`.
//! - **Optional blobs**: `[Present: 1b]` then the blob if present.


/// Mvmpack serialization and deserialization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer exhausted while reading.
    UnexpectedEnd,
    /// String data is not valid UTF-8.
    InvalidUtf8,
    /// Blob or list length exceeds `u32::MAX` on encode.
    BlobTooLarge(usize),
    /// A declared length runs past the end of the input.
    LengthOverflow { declared: usize, remaining: usize },
    /// A presence byte was neither 0 nor 1.
    InvalidPresence(u8),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnexpectedEnd => write!(f, "unexpected end of input"),
            Error::InvalidUtf8 => write!(f, "string data is not valid UTF-8"),
            Error::BlobTooLarge(len) => write!(f, "blob of {} bytes exceeds u32::MAX", len),
            Error::LengthOverflow { declared, remaining } => {
                write!(f, "declared length {} exceeds remaining input {}", declared, remaining)
            }
            Error::InvalidPresence(b) => write!(f, "invalid presence byte: {:#04x}", b),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for Mvmpack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An append-only positional encoder.
///
/// Every write appends the raw encoding of one field. There is no framing
/// beyond the per-blob length prefixes; the decoder must issue the mirror
/// sequence of reads.
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Creates a new encoder with default capacity.
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(256) }
    }

    /// Consumes the encoder and returns the final byte vector.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn write_u32_raw(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_len(&mut self, len: usize) -> Result<()> {
        if len > u32::MAX as usize {
            return Err(Error::BlobTooLarge(len));
        }
        self.write_u32_raw(len as u32);
        Ok(())
    }

    /// Encodes a boolean as a single byte.
    pub fn bool(&mut self, v: bool) -> Result<()> {
        self.buf.push(v as u8);
        Ok(())
    }

    /// Encodes a signed 32-bit integer (LE).
    pub fn i32(&mut self, v: i32) -> Result<()> { self.buf.extend_from_slice(&v.to_le_bytes()); Ok(()) }
    /// Encodes an unsigned 32-bit integer (LE).
    pub fn u32(&mut self, v: u32) -> Result<()> { self.buf.extend_from_slice(&v.to_le_bytes()); Ok(()) }
    /// Encodes an unsigned 64-bit integer (LE).
    pub fn u64(&mut self, v: u64) -> Result<()> { self.buf.extend_from_slice(&v.to_le_bytes()); Ok(()) }

    /// Encodes a UTF-8 string blob.
    pub fn str(&mut self, v: &str) -> Result<()> {
        self.write_len(v.len())?;
        self.buf.extend_from_slice(v.as_bytes());
        Ok(())
    }

    /// Encodes an ordered list of strings.
    pub fn str_list<S: AsRef<str>>(&mut self, items: &[S]) -> Result<()> {
        self.write_len(items.len())?;
        for item in items {
            self.str(item.as_ref())?;
        }
        Ok(())
    }

    /// Encodes a raw byte blob.
    pub fn bytes(&mut self, v: &[u8]) -> Result<()> {
        self.write_len(v.len())?;
        self.buf.extend_from_slice(v);
        Ok(())
    }

    /// Encodes an optional byte blob: presence byte, then the blob if present.
    pub fn opt_bytes(&mut self, v: Option<&[u8]>) -> Result<()> {
        match v {
            Some(bytes) => {
                self.buf.push(1);
                self.bytes(bytes)
            }
            None => {
                self.buf.push(0);
                Ok(())
            }
        }
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// A zero-copy, bounds-checked cursor over a byte slice.
///
/// Reading advances the internal cursor. All read operations return
/// `Error::UnexpectedEnd` once the buffer is exhausted; a corrupt length
/// prefix surfaces as `Error::LengthOverflow` instead of a wild read.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over the slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Returns the remaining bytes in the view.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// True if the cursor has consumed the entire input.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn read_u8(&mut self) -> Result<u8> {
        if self.buf.is_empty() {
            return Err(Error::UnexpectedEnd);
        }
        let b = self.buf[0];
        self.buf = &self.buf[1..];
        Ok(b)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.buf.len() {
            return Err(Error::UnexpectedEnd);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn read_len(&mut self) -> Result<usize> {
        let len = u32::from_le_bytes(self.read_bytes(4)?.try_into().unwrap()) as usize;
        if len > self.buf.len() {
            return Err(Error::LengthOverflow { declared: len, remaining: self.buf.len() });
        }
        Ok(len)
    }

    /// Decodes a bool.
    pub fn bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(Error::InvalidPresence(b)),
        }
    }

    /// Decodes i32 (LE).
    pub fn i32(&mut self) -> Result<i32> { Ok(i32::from_le_bytes(self.read_bytes(4)?.try_into().unwrap())) }
    /// Decodes u32 (LE).
    pub fn u32(&mut self) -> Result<u32> { Ok(u32::from_le_bytes(self.read_bytes(4)?.try_into().unwrap())) }
    /// Decodes u64 (LE).
    pub fn u64(&mut self) -> Result<u64> { Ok(u64::from_le_bytes(self.read_bytes(8)?.try_into().unwrap())) }

    /// Decodes a string slice (UTF-8).
    pub fn str(&mut self) -> Result<&'a str> {
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }

    /// Decodes an ordered list of strings.
    ///
    /// The count prefix is not trusted for allocation: a corrupt count fails
    /// on the first missing element rather than reserving memory for it.
    pub fn str_list(&mut self) -> Result<Vec<&'a str>> {
        let count = u32::from_le_bytes(self.read_bytes(4)?.try_into().unwrap()) as usize;
        let mut items = Vec::new();
        for _ in 0..count {
            items.push(self.str()?);
        }
        Ok(items)
    }

    /// Decodes a byte slice.
    pub fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len()?;
        self.read_bytes(len)
    }

    /// Decodes an optional byte blob.
    pub fn opt_bytes(&mut self) -> Result<Option<&'a [u8]>> {
        match self.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.bytes()?)),
            b => Err(Error::InvalidPresence(b)),
        }
    }
}
