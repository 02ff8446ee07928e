//! Typed record handles.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::num::NonZeroU32;

/// A 1-based handle to a record in a [`Table`](crate::Table).
///
/// The type parameter names the kind of record the handle refers to, so a
/// net handle cannot index the instance table. The absent handle is
/// `Option<Id<T>>::None`, which has the same size as a bare `u32`.
///
/// Handles are weak references: the record may have been destroyed since the
/// handle was obtained, in which case table lookups fail with
/// [`TableError::InvalidHandle`](crate::TableError::InvalidHandle).
pub struct Id<T> {
    raw: NonZeroU32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    /// Creates a handle from its raw value. Returns `None` for `0`.
    #[inline]
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(|raw| Self {
            raw,
            _marker: PhantomData,
        })
    }

    /// Creates a handle from a 0-based slot index.
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        debug_assert!(index < u32::MAX as usize);
        Self {
            raw: NonZeroU32::new(index as u32 + 1).unwrap_or(NonZeroU32::MIN),
            _marker: PhantomData,
        }
    }

    /// The raw 1-based value of this handle.
    #[inline]
    pub fn raw(self) -> u32 {
        self.raw.get()
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.raw.get() as usize - 1
    }
}

/// Returns the raw value of an optional handle, with `0` for `None`.
#[inline]
pub fn raw_or_zero<T>(id: Option<Id<T>>) -> u32 {
    id.map(Id::raw).unwrap_or(0)
}

impl<T> Clone for Id<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T> Hash for Id<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state)
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = std::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "{short}#{}", self.raw)
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Thing;

    #[test]
    fn zero_is_null() {
        assert!(Id::<Thing>::from_raw(0).is_none());
        assert_eq!(Id::<Thing>::from_raw(7).unwrap().raw(), 7);
        assert_eq!(raw_or_zero::<Thing>(None), 0);
    }

    #[test]
    fn option_id_is_four_bytes() {
        assert_eq!(std::mem::size_of::<Option<Id<Thing>>>(), 4);
    }

    #[test]
    fn ids_order_by_raw_value() {
        let a = Id::<Thing>::from_raw(2).unwrap();
        let b = Id::<Thing>::from_raw(10).unwrap();
        assert!(a < b);
        assert_eq!(format!("{b}"), "10");
        assert_eq!(format!("{a:?}"), "Thing#2");
    }
}
