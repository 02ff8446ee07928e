//! Type-tagged parameters inside a journal action.
//!
//! Every parameter is preceded by a one-byte tag naming its type so that a
//! reader that drifts out of step with the writer fails on the next
//! parameter instead of decoding garbage.

use std::io::Cursor;

use arcstr::ArcStr;
use dbtable::{DbReader, DbWriter, Id, Persist, StreamError};

use crate::error::{InvariantError, OdbError, Result};
use crate::geom::{Point, Rect};

const TAG_BOOL: u8 = 1;
const TAG_U8: u8 = 2;
const TAG_U32: u8 = 3;
const TAG_I64: u8 = 4;
const TAG_F64: u8 = 5;
const TAG_STR: u8 = 6;
const TAG_ID: u8 = 7;
const TAG_F64S: u8 = 8;
const TAG_RECORD: u8 = 9;

fn tag_name(tag: u8) -> &'static str {
    match tag {
        TAG_BOOL => "bool",
        TAG_U8 => "u8",
        TAG_U32 => "u32",
        TAG_I64 => "i64",
        TAG_F64 => "f64",
        TAG_STR => "string",
        TAG_ID => "handle",
        TAG_F64S => "value list",
        TAG_RECORD => "record",
        _ => "unknown",
    }
}

pub struct ParamWriter<'a> {
    w: DbWriter<&'a mut Vec<u8>>,
}

impl<'a> ParamWriter<'a> {
    pub(crate) fn new(log: &'a mut Vec<u8>, schema: u32) -> Self {
        Self {
            w: DbWriter::new(log, schema),
        }
    }

    /// Writes an untagged byte. Used for the action kind and the end marker.
    pub(crate) fn raw_u8(&mut self, v: u8) -> Result<()> {
        Ok(self.w.write_u8(v)?)
    }

    pub(crate) fn raw_u32(&mut self, v: u32) -> Result<()> {
        Ok(self.w.write_u32(v)?)
    }

    pub fn bool(&mut self, v: bool) -> Result<()> {
        self.w.write_u8(TAG_BOOL)?;
        Ok(self.w.write_bool(v)?)
    }

    pub fn u8(&mut self, v: u8) -> Result<()> {
        self.w.write_u8(TAG_U8)?;
        Ok(self.w.write_u8(v)?)
    }

    pub fn u32(&mut self, v: u32) -> Result<()> {
        self.w.write_u8(TAG_U32)?;
        Ok(self.w.write_u32(v)?)
    }

    pub fn i64(&mut self, v: i64) -> Result<()> {
        self.w.write_u8(TAG_I64)?;
        Ok(self.w.write_i64(v)?)
    }

    pub fn f64(&mut self, v: f64) -> Result<()> {
        self.w.write_u8(TAG_F64)?;
        Ok(self.w.write_f64(v)?)
    }

    pub fn str(&mut self, v: &str) -> Result<()> {
        self.w.write_u8(TAG_STR)?;
        Ok(self.w.write_str(v)?)
    }

    pub fn id<T>(&mut self, id: Option<Id<T>>) -> Result<()> {
        self.w.write_u8(TAG_ID)?;
        Ok(self.w.write_id(id)?)
    }

    pub fn f64s(&mut self, values: &[f64]) -> Result<()> {
        self.w.write_u8(TAG_F64S)?;
        Ok(self.w.write_f64s(values)?)
    }

    /// Writes a whole record with its persistence layout.
    pub fn record<P: Persist>(&mut self, record: &P) -> Result<()> {
        self.w.write_u8(TAG_RECORD)?;
        Ok(record.write(&mut self.w)?)
    }

    pub fn point(&mut self, p: Point) -> Result<()> {
        self.i64(p.x)?;
        self.i64(p.y)
    }

    pub fn rect(&mut self, r: Rect) -> Result<()> {
        self.point(r.p0())?;
        self.point(r.p1())
    }

    pub fn opt_str(&mut self, v: Option<&ArcStr>) -> Result<()> {
        self.bool(v.is_some())?;
        match v {
            Some(s) => self.str(s),
            None => Ok(()),
        }
    }
}

pub struct ParamReader<'a> {
    r: DbReader<Cursor<&'a [u8]>>,
}

impl<'a> ParamReader<'a> {
    pub(crate) fn new(log: &'a [u8], start: usize, schema: u32) -> Self {
        let mut cursor = Cursor::new(log);
        cursor.set_position(start as u64);
        Self {
            r: DbReader::new(cursor, schema),
        }
    }

    /// Offset of the next unread byte in the log.
    #[inline]
    pub fn position(&self) -> usize {
        self.r.get_ref().position() as usize
    }

    pub(crate) fn corrupt(&self, reason: impl Into<String>) -> OdbError {
        InvariantError::CorruptLog {
            offset: self.position(),
            reason: reason.into(),
        }
        .into()
    }

    fn check<T>(&self, result: std::result::Result<T, StreamError>) -> Result<T> {
        result.map_err(|err| self.corrupt(err.to_string()))
    }

    fn expect(&mut self, tag: u8) -> Result<()> {
        let found = self.r.read_u8();
        let found = self.check(found)?;
        if found != tag {
            return Err(self.corrupt(format!(
                "expected a {} parameter, found {}",
                tag_name(tag),
                tag_name(found)
            )));
        }
        Ok(())
    }

    pub(crate) fn raw_u8(&mut self) -> Result<u8> {
        let v = self.r.read_u8();
        self.check(v)
    }

    pub(crate) fn raw_u32(&mut self) -> Result<u32> {
        let v = self.r.read_u32();
        self.check(v)
    }

    pub fn bool(&mut self) -> Result<bool> {
        self.expect(TAG_BOOL)?;
        let v = self.r.read_bool();
        self.check(v)
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.expect(TAG_U8)?;
        self.raw_u8()
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.expect(TAG_U32)?;
        self.raw_u32()
    }

    pub fn i64(&mut self) -> Result<i64> {
        self.expect(TAG_I64)?;
        let v = self.r.read_i64();
        self.check(v)
    }

    pub fn f64(&mut self) -> Result<f64> {
        self.expect(TAG_F64)?;
        let v = self.r.read_f64();
        self.check(v)
    }

    pub fn str(&mut self) -> Result<ArcStr> {
        self.expect(TAG_STR)?;
        let v = self.r.read_arcstr();
        self.check(v)
    }

    pub fn id<T>(&mut self) -> Result<Option<Id<T>>> {
        self.expect(TAG_ID)?;
        let v = self.r.read_id();
        self.check(v)
    }

    pub fn required_id<T>(&mut self) -> Result<Id<T>> {
        self.id()?.ok_or_else(|| self.corrupt("null handle"))
    }

    pub fn f64s(&mut self) -> Result<Vec<f64>> {
        self.expect(TAG_F64S)?;
        let v = self.r.read_f64s();
        self.check(v)
    }

    pub fn record<P: Persist>(&mut self) -> Result<P> {
        self.expect(TAG_RECORD)?;
        let v = P::read(&mut self.r);
        self.check(v)
    }

    pub fn point(&mut self) -> Result<Point> {
        Ok(Point::new(self.i64()?, self.i64()?))
    }

    pub fn rect(&mut self) -> Result<Rect> {
        Ok(Rect::new(self.point()?, self.point()?))
    }

    pub fn opt_str(&mut self) -> Result<Option<ArcStr>> {
        if self.bool()? {
            Ok(Some(self.str()?))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_catch_drift() {
        let mut log = Vec::new();
        let mut w = ParamWriter::new(&mut log, 1);
        w.u32(7).unwrap();
        w.str("n1").unwrap();

        let mut r = ParamReader::new(&log, 0, 1);
        assert_eq!(r.u32().unwrap(), 7);
        let err = r.f64().unwrap_err();
        assert!(err.is_internal_invariant());
    }

    #[test]
    fn truncated_params_are_corrupt() {
        let mut log = Vec::new();
        ParamWriter::new(&mut log, 1).f64(1.5).unwrap();
        log.truncate(4);
        let mut r = ParamReader::new(&log, 0, 1);
        assert!(r.f64().unwrap_err().is_internal_invariant());
    }
}
