//! Linear-scan set over a plain vector.
//!
//! Membership scans are linear and removal swaps the last element into the
//! removed slot, so iteration order is intentionally not preserved across
//! removals. The incidence sets this backs are small (a handful of edges or
//! triangles per vertex), where the linear scan beats hashed containers.

use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone, Default)]
pub(crate) struct VectorSet<T> {
    items: Vec<T>,
}

impl<T: PartialEq> VectorSet<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn find(&self, item: &T) -> Option<usize> {
        self.items.iter().position(|x| x == item)
    }

    pub fn find_mut(&mut self, item: &T) -> Option<&mut T> {
        self.items.iter_mut().find(|x| *x == item)
    }

    pub fn has(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn add_not_exists(&mut self, item: T) {
        debug_assert!(!self.has(&item));
        self.items.push(item);
    }

    /// Remove by swapping the last element into place.
    pub fn remove(&mut self, item: &T) -> bool {
        match self.find(item) {
            Some(i) => {
                self.items.swap_remove(i);
                true
            }
            None => false,
        }
    }

    pub fn remove_exists(&mut self, item: &T) {
        let removed = self.remove(item);
        debug_assert!(removed);
    }

    /// Drop all elements and release the backing storage.
    pub fn clear(&mut self) {
        self.items = Vec::new();
    }
}

impl<T> Deref for VectorSet<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> DerefMut for VectorSet<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}
