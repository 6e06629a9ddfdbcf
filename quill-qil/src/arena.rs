//! Index based storage for graph nodes.
//!
//! The QIL graph is a DAG with back references from loop bodies to their
//! iterators, so nodes live in a single vector and refer to each other by
//! [`Handle`]. Nothing is ever removed; the whole arena is dropped at once.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::num::NonZeroU32;
use std::ops::{Index, IndexMut};

/// A handle to a `T` allocated in an [`Arena`].
#[repr(transparent)]
pub struct Handle<T> {
    index: NonZeroU32,
    _phantom: PhantomData<T>,
}

impl<T> Handle<T> {
    fn new(index: NonZeroU32) -> Handle<T> {
        Handle {
            index,
            _phantom: PhantomData,
        }
    }

    #[inline(always)]
    pub fn as_u32(self) -> u32 {
        self.index.get()
    }

    #[inline(always)]
    fn slot(self) -> usize {
        self.index.get() as usize - 1
    }
}

// Derives would require T to implement these traits too; a handle never
// stores a T.

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Handle<T> {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(feature = "serde")]
impl<T> serde::Serialize for Handle<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.as_u32())
    }
}

/// Owns every instance of `T` of one graph.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Arena<T> {
        Arena { items: Vec::new() }
    }

    /// Adds an item, returning a stable handle to it. Equal items are not
    /// deduplicated.
    pub fn add(&mut self, item: T) -> Handle<T> {
        self.items.push(item);
        let index = u32::try_from(self.items.len()).unwrap_or(u32::MAX);
        // the length is at least one after a push
        Handle::new(NonZeroU32::MIN.saturating_add(index - 1))
    }

    pub fn get(&self, handle: Handle<T>) -> &T {
        &self.items[handle.slot()]
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> &mut T {
        &mut self.items[handle.slot()]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter_handles(&self) -> impl Iterator<Item = Handle<T>> + '_ {
        (0..self.items.len()).filter_map(|slot| {
            u32::try_from(slot + 1)
                .ok()
                .and_then(NonZeroU32::new)
                .map(Handle::new)
        })
    }
}

impl<T> Index<Handle<T>> for Arena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        self.get(handle)
    }
}

impl<T> IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        self.get_mut(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_stable() {
        let mut arena = Arena::new();
        let a = arena.add("a");
        let b = arena.add("b");
        assert_ne!(a, b);
        assert_eq!(arena[a], "a");
        assert_eq!(arena[b], "b");
        arena[a] = "c";
        assert_eq!(arena.get(a), &"c");
        assert_eq!(arena.iter_handles().collect::<Vec<_>>(), vec![a, b]);
    }
}
