//! Growable unordered container used to gather results from worker threads.

use parking_lot::RwLock;

/// Array-backed bag without a stable order: removing an element moves the last
/// element into its slot.
///
/// Single-threaded mutation goes through `&mut self` and never touches the lock.
/// Workers holding only `&self` use [`SlimBag::concurrent_add`], which performs
/// the index reservation and the write under one exclusive lock so a reader can
/// never observe a slot of a buffer that is being reallocated.
#[derive(Debug)]
pub struct SlimBag<T> {
    items: RwLock<Vec<T>>,
}

impl<T> Default for SlimBag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlimBag<T> {
    pub fn new() -> Self {
        Self::with_capacity(4)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: RwLock::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn add(&mut self, item: T) {
        self.items.get_mut().push(item);
    }

    pub fn concurrent_add(&self, item: T) {
        self.items.write().push(item);
    }

    /// Removes the element at `index` by swapping the last element into its place.
    pub fn remove_at(&mut self, index: usize) -> T {
        self.items.get_mut().swap_remove(index)
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.items.read().capacity()
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.items.get_mut().as_mut_slice()
    }

    /// Empties the bag but keeps its allocation for the next step.
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.items.get_mut().drain(..)
    }

    pub fn clear(&mut self) {
        self.items.get_mut().clear();
    }
}

impl<T: PartialEq> SlimBag<T> {
    pub fn remove(&mut self, item: &T) -> bool {
        let items = self.items.get_mut();
        match items.iter().position(|candidate| candidate == item) {
            Some(index) => {
                items.swap_remove(index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn remove_swaps_last_into_slot() {
        let mut bag = SlimBag::new();
        for value in 0..5 {
            bag.add(value);
        }
        assert!(bag.remove(&1));
        assert!(!bag.remove(&42));
        assert_eq!(bag.as_mut_slice(), &[0, 4, 2, 3]);
        assert_eq!(bag.remove_at(0), 0);
        assert_eq!(bag.len(), 3);
    }

    #[test]
    fn concurrent_add_keeps_every_item_across_growth() {
        let bag = Arc::new(SlimBag::with_capacity(1));
        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let bag = Arc::clone(&bag);
                thread::spawn(move || {
                    for i in 0..500 {
                        bag.concurrent_add(worker * 1000 + i);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let mut bag = Arc::try_unwrap(bag).expect("all workers joined");
        let mut values: Vec<_> = bag.drain().collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), 8 * 500);
        assert!(bag.is_empty());
    }
}
