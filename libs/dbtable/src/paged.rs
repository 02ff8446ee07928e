//! Per-corner scalar values stored in fixed-size pages.
//!
//! Record `h` (1-based) at corner `c` (0-based) lives at slot
//! `(h - 1) * corners + 1 + c`. Slot `0` is a sentinel holding `0.0`; reads of
//! unallocated slots resolve to it.

use std::io::{Read, Write};

use crate::error::{StreamError, ValueError};
use crate::stream::{DbReader, DbWriter, Persist};

const PAGE_BITS: usize = 10;
const PAGE_SIZE: usize = 1 << PAGE_BITS;
const PAGE_MASK: usize = PAGE_SIZE - 1;

#[derive(Debug, Clone, PartialEq)]
pub struct PagedValues {
    pages: Vec<Box<[f64]>>,
    len: usize,
    corners: usize,
    /// Highest record id whose slots have been appended.
    max_record_id: u32,
}

impl PagedValues {
    /// Creates an empty table holding `corners` values per record.
    pub fn new(corners: usize) -> Self {
        let mut values = Self {
            pages: Vec::new(),
            len: 0,
            corners: corners.max(1),
            max_record_id: 0,
        };
        values.push(0.0);
        values
    }

    #[inline]
    pub fn corners(&self) -> usize {
        self.corners
    }

    /// Number of slots, including the sentinel.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.max_record_id == 0
    }

    #[inline]
    pub fn max_record_id(&self) -> u32 {
        self.max_record_id
    }

    /// Index of the slot holding record `id` at `corner`.
    #[inline]
    pub(crate) fn slot(&self, id: u32, corner: usize) -> usize {
        (id as usize - 1) * self.corners + 1 + corner
    }

    /// Appends `count` slots initialized to `fill`, returning the first new index.
    pub fn get_idx(&mut self, count: usize, fill: f64) -> usize {
        let first = self.len;
        for _ in 0..count {
            self.push(fill);
        }
        first
    }

    /// Makes sure record `id` has slots for every corner and sets them to `fill`.
    ///
    /// Records at or below the high-water mark are overwritten in place;
    /// higher records (and any gap below them) are appended.
    pub fn alloc(&mut self, id: u32, fill: f64) -> Result<(), ValueError> {
        if id == 0 {
            return Err(ValueError::Unallocated { id, corner: 0 });
        }
        if id <= self.max_record_id {
            for corner in 0..self.corners {
                let slot = self.slot(id, corner);
                *self.at_mut(slot) = fill;
            }
            return Ok(());
        }
        while self.max_record_id < id {
            let next = self.max_record_id + 1;
            let got = self.get_idx(self.corners, fill);
            let expected = self.slot(next, 0);
            if got != expected {
                return Err(ValueError::Misaligned { expected, got });
            }
            self.max_record_id = next;
        }
        Ok(())
    }

    /// The value of record `id` at `corner`, or the sentinel `0.0` if none is allocated.
    #[inline]
    pub fn get(&self, id: u32, corner: usize) -> f64 {
        match self.checked_slot(id, corner) {
            Some(slot) => self.at(slot),
            None => self.at(0),
        }
    }

    pub fn set(&mut self, id: u32, corner: usize, value: f64) -> Result<(), ValueError> {
        let slot = self
            .checked_slot(id, corner)
            .ok_or(ValueError::Unallocated { id, corner })?;
        *self.at_mut(slot) = value;
        Ok(())
    }

    /// Adds `delta` to a value and returns the previous value.
    pub fn add(&mut self, id: u32, corner: usize, delta: f64) -> Result<f64, ValueError> {
        let old = self.get(id, corner);
        self.set(id, corner, old + delta)?;
        Ok(old)
    }

    /// All corner values of one record.
    pub fn record(&self, id: u32) -> Vec<f64> {
        (0..self.corners).map(|c| self.get(id, c)).collect()
    }

    pub fn set_record(&mut self, id: u32, values: &[f64]) -> Result<(), ValueError> {
        for (corner, value) in values.iter().enumerate().take(self.corners) {
            self.set(id, corner, *value)?;
        }
        Ok(())
    }

    /// Drops every value and switches to `corners` values per record.
    pub fn reinit(&mut self, corners: usize) {
        *self = Self::new(corners);
    }

    fn checked_slot(&self, id: u32, corner: usize) -> Option<usize> {
        if id == 0 || id > self.max_record_id || corner >= self.corners {
            None
        } else {
            Some(self.slot(id, corner))
        }
    }

    fn push(&mut self, value: f64) {
        if self.len & PAGE_MASK == 0 {
            self.pages.push(vec![0.0; PAGE_SIZE].into_boxed_slice());
        }
        let idx = self.len;
        self.len += 1;
        *self.at_mut(idx) = value;
    }

    #[inline]
    fn at(&self, idx: usize) -> f64 {
        self.pages[idx >> PAGE_BITS][idx & PAGE_MASK]
    }

    #[inline]
    fn at_mut(&mut self, idx: usize) -> &mut f64 {
        &mut self.pages[idx >> PAGE_BITS][idx & PAGE_MASK]
    }
}

impl Persist for PagedValues {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> Result<(), StreamError> {
        w.write_len(self.corners)?;
        w.write_u32(self.max_record_id)?;
        w.write_len(self.len)?;
        for idx in 0..self.len {
            w.write_f64(self.at(idx))?;
        }
        Ok(())
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> Result<Self, StreamError> {
        let corners = r.read_len()?;
        let max_record_id = r.read_u32()?;
        let len = r.read_len()?;
        let mut values = Self {
            pages: Vec::new(),
            len: 0,
            corners: corners.max(1),
            max_record_id,
        };
        for _ in 0..len {
            values.push(r.read_f64()?);
        }
        let expected = max_record_id as usize * values.corners + 1;
        if values.len != expected {
            return Err(ValueError::Misaligned {
                expected,
                got: values.len,
            }
            .into());
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use float_eq::assert_float_eq;

    use super::*;

    #[test]
    fn slot_formula_matches_allocation() {
        let mut v = PagedValues::new(3);
        v.alloc(1, 0.0).unwrap();
        v.alloc(2, 0.0).unwrap();
        assert_eq!(v.slot(1, 0), 1);
        assert_eq!(v.slot(2, 2), 6);
        assert_eq!(v.len(), 7);
        assert_eq!(v.max_record_id(), 2);
    }

    #[test]
    fn null_record_has_no_slots() {
        let mut v = PagedValues::new(2);
        assert!(v.alloc(0, 1.0).is_err());
        v.alloc(1, 1.0).unwrap();
        assert!(v.set(0, 0, 2.0).is_err());
        assert_float_eq!(v.get(0, 0), 0.0, abs <= 0.0);
        assert_eq!(v.len(), 3);
    }

    #[test]
    fn reused_ids_overwrite_in_place() {
        let mut v = PagedValues::new(2);
        v.alloc(1, 0.0).unwrap();
        v.set(1, 1, 4.5).unwrap();
        v.alloc(1, 0.0).unwrap();
        assert_eq!(v.len(), 3);
        assert_float_eq!(v.get(1, 1), 0.0, abs <= 0.0);
    }

    #[test]
    fn gaps_are_filled() {
        let mut v = PagedValues::new(2);
        v.alloc(3, 1.0).unwrap();
        assert_eq!(v.max_record_id(), 3);
        assert_float_eq!(v.get(2, 1), 1.0, abs <= 0.0);
    }

    #[test]
    fn unallocated_reads_hit_the_sentinel() {
        let mut v = PagedValues::new(1);
        assert_float_eq!(v.get(9, 0), 0.0, abs <= 0.0);
        assert_eq!(
            v.set(9, 0, 1.0),
            Err(ValueError::Unallocated { id: 9, corner: 0 })
        );
    }

    #[test]
    fn values_span_pages() {
        let mut v = PagedValues::new(4);
        let n = (PAGE_SIZE as u32) / 2;
        for id in 1..=n {
            v.alloc(id, 0.0).unwrap();
            v.set(id, 3, id as f64).unwrap();
        }
        assert!(v.pages.len() > 1);
        assert_float_eq!(v.get(n, 3), n as f64, abs <= 0.0);
        assert_float_eq!(v.add(n, 3, 1.0).unwrap(), n as f64, abs <= 0.0);
        assert_float_eq!(v.get(n, 3), n as f64 + 1.0, abs <= 0.0);
    }

    #[test]
    fn reinit_changes_corner_count() {
        let mut v = PagedValues::new(1);
        v.alloc(1, 2.0).unwrap();
        v.reinit(3);
        assert_eq!(v.corners(), 3);
        assert_eq!(v.max_record_id(), 0);
        assert_eq!(v.len(), 1);
    }
}
