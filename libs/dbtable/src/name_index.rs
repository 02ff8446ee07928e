//! Name-to-handle lookup kept beside a [`Table`](crate::Table).

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use arcstr::ArcStr;

use crate::id::Id;

#[derive(Debug, Clone)]
pub struct NameIndex<T> {
    map: HashMap<ArcStr, Id<T>>,
}

impl<T> Default for NameIndex<T> {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
        }
    }
}

impl<T> NameIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `name` to `id`.
    ///
    /// Fails with the handle already registered under `name`, leaving the
    /// index unchanged.
    pub fn insert(&mut self, name: ArcStr, id: Id<T>) -> Result<(), Id<T>> {
        match self.map.entry(name) {
            Entry::Occupied(entry) => Err(*entry.get()),
            Entry::Vacant(entry) => {
                entry.insert(id);
                Ok(())
            }
        }
    }

    /// Removes `name` if it maps to `id`.
    pub fn remove(&mut self, name: &str, id: Id<T>) -> bool {
        match self.map.get(name) {
            Some(found) if *found == id => {
                self.map.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Moves `id` from `old` to `new`. Fails if `new` is taken by another handle.
    pub fn rename(&mut self, old: &str, new: ArcStr, id: Id<T>) -> Result<(), Id<T>> {
        if let Some(other) = self.map.get(&new) {
            return if *other == id { Ok(()) } else { Err(*other) };
        }
        self.remove(old, id);
        self.map.insert(new, id);
        Ok(())
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<Id<T>> {
        self.map.get(name).copied()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArcStr, Id<T>)> + '_ {
        self.map.iter().map(|(k, v)| (k, *v))
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use arcstr::literal;

    use super::*;

    struct Net;

    fn id(raw: u32) -> Id<Net> {
        Id::from_raw(raw).unwrap()
    }

    #[test]
    fn conflicts_report_existing_handle() {
        let mut idx = NameIndex::new();
        idx.insert(literal!("a"), id(1)).unwrap();
        assert_eq!(idx.insert(literal!("a"), id(2)), Err(id(1)));
        assert_eq!(idx.get("a"), Some(id(1)));
    }

    #[test]
    fn rename_moves_entry() {
        let mut idx = NameIndex::new();
        idx.insert(literal!("a"), id(1)).unwrap();
        idx.insert(literal!("b"), id(2)).unwrap();
        assert_eq!(idx.rename("a", literal!("b"), id(1)), Err(id(2)));
        idx.rename("a", literal!("c"), id(1)).unwrap();
        assert_eq!(idx.get("a"), None);
        assert_eq!(idx.get("c"), Some(id(1)));
    }

    #[test]
    fn remove_checks_handle() {
        let mut idx = NameIndex::new();
        idx.insert(literal!("a"), id(1)).unwrap();
        assert!(!idx.remove("a", id(3)));
        assert!(idx.remove("a", id(1)));
        assert!(idx.is_empty());
    }
}
