//! The object arena.
//!
//! A [`Table`] hands out dense 1-based [`Id`]s and recycles the ids of
//! destroyed records through a free list. Destroying a record does not look
//! for references to it elsewhere; callers unlink a record from every chain
//! and index that mentions it before destroying it.

use std::io::{Read, Write};

use crate::error::{StreamError, TableError};
use crate::id::Id;
use crate::stream::{DbReader, DbWriter, Persist};

/// A record that can live in a [`Table`].
pub trait Record: Clone {
    /// Name of the record kind, used in error messages.
    const KIND: &'static str;

    /// Resets every handle-valued field so that only scalar attributes remain.
    ///
    /// Called on the copy produced by [`Table::duplicate`] and
    /// [`Table::detached_copy`].
    fn clear_links(&mut self) {}
}

#[derive(Debug, Clone, PartialEq)]
enum Slot<T> {
    Occupied(T),
    Free,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table<T> {
    slots: Vec<Slot<T>>,
    /// Raw ids of free slots. The most recently freed id is reused first.
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<T: Record> Table<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` in a fresh or recycled slot and returns its handle.
    pub fn create(&mut self, value: T) -> Result<Id<T>, TableError> {
        if let Some(raw) = self.free.pop() {
            let id = self.free_id(raw)?;
            self.slots[id.index()] = Slot::Occupied(value);
            self.len += 1;
            return Ok(id);
        }
        if self.slots.len() >= u32::MAX as usize {
            return Err(TableError::Full { kind: T::KIND });
        }
        self.slots.push(Slot::Occupied(value));
        self.len += 1;
        Ok(Id::from_index(self.slots.len() - 1))
    }

    /// Stores `value` under a specific handle.
    ///
    /// Used when a stream or a journal dictates the handle. Intermediate
    /// slots that did not exist yet are added to the free list.
    pub fn create_at(&mut self, id: Id<T>, value: T) -> Result<(), TableError> {
        let idx = id.index();
        while self.slots.len() <= idx {
            self.slots.push(Slot::Free);
            let raw = self.slots.len() as u32;
            if raw != id.raw() {
                self.free.push(raw);
            }
        }
        if let Slot::Occupied(_) = self.slots[idx] {
            return Err(TableError::Occupied {
                kind: T::KIND,
                id: id.raw(),
            });
        }
        self.free.retain(|raw| *raw != id.raw());
        self.slots[idx] = Slot::Occupied(value);
        self.len += 1;
        Ok(())
    }

    /// Frees the slot behind `id` and returns the record that was stored there.
    pub fn destroy(&mut self, id: Id<T>) -> Result<T, TableError> {
        let slot = self
            .slots
            .get_mut(id.index())
            .ok_or_else(|| invalid::<T>(id))?;
        match std::mem::replace(slot, Slot::Free) {
            Slot::Occupied(value) => {
                self.free.push(id.raw());
                self.len -= 1;
                Ok(value)
            }
            Slot::Free => Err(invalid::<T>(id)),
        }
    }

    /// Copies the scalar fields of a record into a new slot.
    pub fn duplicate(&mut self, id: Id<T>) -> Result<Id<T>, TableError> {
        let copy = self.detached_copy(id)?;
        self.create(copy)
    }

    /// Returns a copy of a record with its handle-valued links cleared.
    pub fn detached_copy(&self, id: Id<T>) -> Result<T, TableError> {
        let mut copy = self.get(id)?.clone();
        copy.clear_links();
        Ok(copy)
    }

    #[inline]
    pub fn get(&self, id: Id<T>) -> Result<&T, TableError> {
        self.try_get(id).ok_or_else(|| invalid::<T>(id))
    }

    #[inline]
    pub fn get_mut(&mut self, id: Id<T>) -> Result<&mut T, TableError> {
        match self.slots.get_mut(id.index()) {
            Some(Slot::Occupied(value)) => Ok(value),
            _ => Err(invalid::<T>(id)),
        }
    }

    #[inline]
    pub fn try_get(&self, id: Id<T>) -> Option<&T> {
        match self.slots.get(id.index()) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn contains(&self, id: Id<T>) -> bool {
        self.try_get(id).is_some()
    }

    /// Number of live records.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The highest handle this table has ever handed out.
    #[inline]
    pub fn max_id(&self) -> u32 {
        self.slots.len() as u32
    }

    /// The handle the next call to [`Table::create`] will return.
    pub fn next_id(&self) -> Id<T> {
        match self.free.last() {
            Some(raw) => Id::from_index(*raw as usize - 1),
            None => Id::from_index(self.slots.len()),
        }
    }

    /// Iterates over live records in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Occupied(value) => Some((Id::from_index(i), value)),
                Slot::Free => None,
            })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Id<T>, &mut T)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Occupied(value) => Some((Id::from_index(i), value)),
                Slot::Free => None,
            })
    }

    /// Handles of all live records, in handle order.
    pub fn ids(&self) -> Vec<Id<T>> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }

    fn free_id(&self, raw: u32) -> Result<Id<T>, TableError> {
        Id::from_raw(raw)
            .filter(|id| id.index() < self.slots.len())
            .ok_or(TableError::InvalidHandle { kind: T::KIND, id: raw })
    }
}

#[inline]
fn invalid<T: Record>(id: Id<T>) -> TableError {
    TableError::InvalidHandle {
        kind: T::KIND,
        id: id.raw(),
    }
}

impl<T: Record + Persist> Persist for Table<T> {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> Result<(), StreamError> {
        w.write_len(self.slots.len())?;
        for slot in self.slots.iter() {
            match slot {
                Slot::Occupied(value) => {
                    w.write_bool(true)?;
                    value.write(w)?;
                }
                Slot::Free => w.write_bool(false)?,
            }
        }
        // The free list order decides which handles future creations get.
        w.write_len(self.free.len())?;
        for raw in self.free.iter() {
            w.write_u32(*raw)?;
        }
        Ok(())
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> Result<Self, StreamError> {
        let n = r.read_len()?;
        let mut slots = Vec::new();
        let mut len = 0;
        for _ in 0..n {
            if r.read_bool()? {
                slots.push(Slot::Occupied(T::read(r)?));
                len += 1;
            } else {
                slots.push(Slot::Free);
            }
        }
        let nfree = r.read_len()?;
        let mut free = Vec::new();
        for _ in 0..nfree {
            let raw = r.read_u32()?;
            match raw.checked_sub(1).and_then(|i| slots.get(i as usize)) {
                Some(Slot::Free) => free.push(raw),
                _ => {
                    return Err(TableError::InvalidHandle { kind: T::KIND, id: raw }.into());
                }
            }
        }
        Ok(Self { slots, free, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Node {
        weight: u32,
        next: Option<Id<Node>>,
    }

    impl Record for Node {
        const KIND: &'static str = "node";

        fn clear_links(&mut self) {
            self.next = None;
        }
    }

    fn node(weight: u32) -> Node {
        Node { weight, next: None }
    }

    #[test]
    fn handles_start_at_one() {
        let mut t = Table::new();
        let a = t.create(node(1)).unwrap();
        let b = t.create(node(2)).unwrap();
        assert_eq!(a.raw(), 1);
        assert_eq!(b.raw(), 2);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn destroyed_handles_are_recycled_with_fresh_data() {
        let mut t = Table::new();
        let a = t.create(node(10)).unwrap();
        let _b = t.create(node(20)).unwrap();
        assert_eq!(t.destroy(a).unwrap().weight, 10);
        assert!(t.get(a).is_err());

        let c = t.create(Node::default()).unwrap();
        assert_eq!(c, a);
        assert_eq!(t.get(c).unwrap().weight, 0);
    }

    #[test]
    fn double_destroy_is_an_invalid_handle() {
        let mut t = Table::new();
        let a = t.create(node(1)).unwrap();
        t.destroy(a).unwrap();
        assert_eq!(
            t.destroy(a),
            Err(TableError::InvalidHandle { kind: "node", id: 1 })
        );
    }

    #[test]
    fn create_at_fills_gaps_into_free_list() {
        let mut t = Table::new();
        let id = Id::from_raw(4).unwrap();
        t.create_at(id, node(4)).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.max_id(), 4);
        assert!(t.create_at(id, node(5)).is_err());

        let mut fresh: Vec<u32> = (0..3).map(|_| t.create(node(0)).unwrap().raw()).collect();
        fresh.sort();
        assert_eq!(fresh, vec![1, 2, 3]);
        assert_eq!(t.create(node(0)).unwrap().raw(), 5);
    }

    #[test]
    fn duplicate_drops_links() {
        let mut t = Table::new();
        let a = t.create(node(1)).unwrap();
        let b = t
            .create(Node {
                weight: 7,
                next: Some(a),
            })
            .unwrap();
        let c = t.duplicate(b).unwrap();
        assert_eq!(t.get(c).unwrap(), &node(7));
    }

    #[test]
    fn next_id_predicts_create() {
        let mut t = Table::new();
        let a = t.create(node(1)).unwrap();
        t.create(node(2)).unwrap();
        t.destroy(a).unwrap();
        assert_eq!(t.next_id(), a);
        assert_eq!(t.create(node(3)).unwrap(), a);
    }

    impl Persist for Node {
        fn write<W: std::io::Write>(&self, w: &mut DbWriter<W>) -> Result<(), StreamError> {
            w.write_u32(self.weight)?;
            w.write_id(self.next)
        }

        fn read<R: Read>(r: &mut DbReader<R>) -> Result<Self, StreamError> {
            Ok(Self {
                weight: r.read_u32()?,
                next: r.read_id()?,
            })
        }
    }

    #[test]
    fn stored_tables_keep_their_free_list() {
        let mut t = Table::new();
        let a = t.create(node(1)).unwrap();
        t.create(node(2)).unwrap();
        t.destroy(a).unwrap();
        let mut w = DbWriter::new(Vec::new(), 1);
        t.write(&mut w).unwrap();
        let bytes = w.into_inner();

        let mut read = Table::<Node>::read(&mut DbReader::new(bytes.as_slice(), 1)).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read.create(node(3)).unwrap(), a);
    }

    #[test]
    fn damaged_table_length_is_an_error() {
        let mut t = Table::new();
        t.create(node(1)).unwrap();
        let mut w = DbWriter::new(Vec::new(), 1);
        t.write(&mut w).unwrap();
        let mut bytes = w.into_inner();
        bytes[..4].copy_from_slice(&u32::MAX.to_le_bytes());

        let read = Table::<Node>::read(&mut DbReader::new(bytes.as_slice(), 1));
        assert!(matches!(read, Err(StreamError::Io(_))));
    }
}
