//! Versioned little-endian binary streams.
//!
//! A stream starts with a 4-byte magic number and a `u32` schema version.
//! Writers and readers both carry that version so that fields added in later
//! schemas can be guarded symmetrically:
//!
//! ```
//! # use dbtable::{DbReader, DbWriter, StreamError};
//! # fn demo() -> Result<(), StreamError> {
//! let mut w = DbWriter::new(Vec::new(), 2);
//! w.write_u32(7)?;
//! if w.has_schema(2) {
//!     w.write_f64(1.5)?;
//! }
//! let bytes = w.into_inner();
//!
//! let mut r = DbReader::new(bytes.as_slice(), 2);
//! assert_eq!(r.read_u32()?, 7);
//! let extra = if r.has_schema(2) { r.read_f64()? } else { 0.0 };
//! assert_eq!(extra, 1.5);
//! # Ok(())
//! # }
//! # demo().unwrap();
//! ```

use std::io::{Read, Write};
use std::ops::RangeInclusive;

use arcstr::ArcStr;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::StreamError;
use crate::id::{raw_or_zero, Id};

/// Magic number at the start of every stream.
pub const MAGIC: [u8; 4] = *b"ODB\x01";

type Result<T> = std::result::Result<T, StreamError>;

/// Types with a fixed binary layout.
///
/// `write` and `read` must visit fields in the same order and apply the
/// same schema guards.
pub trait Persist: Sized {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> Result<()>;
    fn read<R: Read>(r: &mut DbReader<R>) -> Result<Self>;
}

pub struct DbWriter<W> {
    inner: W,
    schema: u32,
}

impl<W: Write> DbWriter<W> {
    /// Creates a writer emitting the given schema version.
    #[inline]
    pub fn new(inner: W, schema: u32) -> Self {
        Self { inner, schema }
    }

    /// Writes the magic number and schema version.
    pub fn write_header(&mut self) -> Result<()> {
        self.inner.write_all(&MAGIC)?;
        self.write_u32(self.schema)
    }

    #[inline]
    pub fn schema(&self) -> u32 {
        self.schema
    }

    /// Whether fields introduced in schema `version` are part of this stream.
    #[inline]
    pub fn has_schema(&self, version: u32) -> bool {
        self.schema >= version
    }

    #[inline]
    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        Ok(self.inner.write_u8(v)?)
    }

    #[inline]
    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_u8(v as u8)
    }

    #[inline]
    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        Ok(self.inner.write_u32::<LittleEndian>(v)?)
    }

    #[inline]
    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        Ok(self.inner.write_i32::<LittleEndian>(v)?)
    }

    #[inline]
    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        Ok(self.inner.write_i64::<LittleEndian>(v)?)
    }

    #[inline]
    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        Ok(self.inner.write_f64::<LittleEndian>(v)?)
    }

    pub fn write_len(&mut self, len: usize) -> Result<()> {
        self.write_u32(len as u32)
    }

    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_len(s.len())?;
        Ok(self.inner.write_all(s.as_bytes())?)
    }

    #[inline]
    pub fn write_id<T>(&mut self, id: Option<Id<T>>) -> Result<()> {
        self.write_u32(raw_or_zero(id))
    }

    pub fn write_f64s(&mut self, values: &[f64]) -> Result<()> {
        self.write_len(values.len())?;
        for v in values {
            self.write_f64(*v)?;
        }
        Ok(())
    }

    /// Writes a length-prefixed block of opaque bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_len(bytes.len())?;
        Ok(self.inner.write_all(bytes)?)
    }

    #[inline]
    pub fn write<P: Persist>(&mut self, value: &P) -> Result<()> {
        value.write(self)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

pub struct DbReader<R> {
    inner: R,
    schema: u32,
}

impl<R: Read> DbReader<R> {
    /// Creates a reader for a headerless stream of a known schema.
    #[inline]
    pub fn new(inner: R, schema: u32) -> Self {
        Self { inner, schema }
    }

    /// Reads and validates the stream header.
    pub fn open(mut inner: R, supported: RangeInclusive<u32>) -> Result<Self> {
        let mut magic = [0u8; 4];
        inner.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(StreamError::BadMagic);
        }
        let schema = inner.read_u32::<LittleEndian>()?;
        if !supported.contains(&schema) {
            return Err(StreamError::UnsupportedSchema {
                found: schema,
                min: *supported.start(),
                max: *supported.end(),
            });
        }
        Ok(Self { inner, schema })
    }

    #[inline]
    pub fn schema(&self) -> u32 {
        self.schema
    }

    /// Whether fields introduced in schema `version` are present in this stream.
    #[inline]
    pub fn has_schema(&self, version: u32) -> bool {
        self.schema >= version
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.inner.read_u8()?)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(StreamError::InvalidTag { what: "bool", tag }),
        }
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.inner.read_i32::<LittleEndian>()?)
    }

    #[inline]
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.inner.read_i64::<LittleEndian>()?)
    }

    #[inline]
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(self.inner.read_f64::<LittleEndian>()?)
    }

    #[inline]
    pub fn read_len(&mut self) -> Result<usize> {
        Ok(self.read_u32()? as usize)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let buf = self.read_bytes()?;
        Ok(String::from_utf8(buf)?)
    }

    pub fn read_arcstr(&mut self) -> Result<ArcStr> {
        Ok(ArcStr::from(self.read_string()?))
    }

    #[inline]
    pub fn read_id<T>(&mut self) -> Result<Option<Id<T>>> {
        Ok(Id::from_raw(self.read_u32()?))
    }

    /// Reads a handle that must not be null.
    pub fn read_required_id<T>(&mut self) -> Result<Id<T>> {
        self.read_id()?.ok_or(StreamError::NullHandle)
    }

    pub fn read_f64s(&mut self) -> Result<Vec<f64>> {
        let len = self.read_len()?;
        (0..len).map(|_| self.read_f64()).collect()
    }

    /// Reads a length-prefixed byte string.
    ///
    /// The length is untrusted: the buffer grows only as bytes arrive, and a
    /// stream shorter than the prefix is an `UnexpectedEof` error.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len()?;
        let mut buf = Vec::new();
        (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        Ok(buf)
    }

    #[inline]
    pub fn read<P: Persist>(&mut self) -> Result<P> {
        P::read(self)
    }

    #[inline]
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl Persist for ArcStr {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> Result<()> {
        w.write_str(self)
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> Result<Self> {
        r.read_arcstr()
    }
}

impl<P: Persist> Persist for Vec<P> {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> Result<()> {
        w.write_len(self.len())?;
        for item in self {
            item.write(w)?;
        }
        Ok(())
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> Result<Self> {
        let len = r.read_len()?;
        (0..len).map(|_| P::read(r)).collect()
    }
}

impl<T> Persist for Id<T> {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> Result<()> {
        w.write_u32(self.raw())
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> Result<Self> {
        r.read_required_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_rejects_future_schema() {
        let mut w = DbWriter::new(Vec::new(), 9);
        w.write_header().unwrap();
        let bytes = w.into_inner();
        let err = DbReader::open(bytes.as_slice(), 1..=3).err().unwrap();
        assert!(matches!(
            err,
            StreamError::UnsupportedSchema { found: 9, .. }
        ));
    }

    #[test]
    fn header_rejects_garbage() {
        let bytes = b"nope\x01\x00\x00\x00".to_vec();
        assert!(matches!(
            DbReader::open(bytes.as_slice(), 1..=3),
            Err(StreamError::BadMagic)
        ));
    }

    #[test]
    fn strings_and_handles() {
        struct Net;
        let mut w = DbWriter::new(Vec::new(), 1);
        w.write_str("clk").unwrap();
        w.write_id::<Net>(None).unwrap();
        w.write_id(Id::<Net>::from_raw(5)).unwrap();
        let bytes = w.into_inner();

        let mut r = DbReader::new(bytes.as_slice(), 1);
        assert_eq!(r.read_string().unwrap(), "clk");
        assert_eq!(r.read_id::<Net>().unwrap(), None);
        assert_eq!(r.read_required_id::<Net>().unwrap().raw(), 5);
    }

    #[test]
    fn oversized_lengths_are_errors() {
        let mut w = DbWriter::new(Vec::new(), 1);
        w.write_u32(u32::MAX).unwrap();
        w.write_str("vdd").unwrap();
        let bytes = w.into_inner();

        let mut r = DbReader::new(bytes.as_slice(), 1);
        let err = r.read_string().unwrap_err();
        assert!(matches!(err, StreamError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }
}
