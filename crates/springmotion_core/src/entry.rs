//! Generational slot allocator backing every storage.
//!
//! Each entry maps a stable handle index onto the current dense
//! index of its motion. Freed entries bump their version so stale
//! handles stop resolving once the slot is reused.

/// A single slot of the [`StorageEntryList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageEntry {
    /// Next free entry, only meaningful while the entry is free.
    pub next: Option<u32>,
    /// Dense index of the live motion occupying this entry.
    pub dense_index: Option<u32>,
    /// Generation of the entry, never `0`.
    pub version: u32,
}

impl StorageEntry {
    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.dense_index.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct StorageEntryList {
    entries: Vec<StorageEntry>,
    free_head: Option<u32>,
}

impl StorageEntryList {
    pub fn new(initial_capacity: usize) -> Self {
        let mut list = Self {
            entries: Vec::new(),
            free_head: None,
        };
        list.ensure_capacity(initial_capacity.max(1));
        list
    }

    /// Occupies a free entry (growing the list when empty) and points
    /// it at `dense_index`.
    ///
    /// Returns the entry index together with its version.
    pub fn alloc(&mut self, dense_index: u32) -> (u32, u32) {
        let index = match self.free_head {
            Some(index) => index,
            None => {
                let current = self.entries.len();
                self.ensure_capacity((current * 2).max(1));
                current as u32
            }
        };

        let entry = &mut self.entries[index as usize];
        self.free_head = entry.next.take();
        entry.dense_index = Some(dense_index);

        (index, entry.version)
    }

    /// Returns an occupied entry to the free list.
    pub fn free(&mut self, index: u32) {
        let Some(entry) = self.entries.get_mut(index as usize) else {
            return;
        };
        if entry.dense_index.take().is_none() {
            return;
        }

        entry.version = next_version(entry.version);
        entry.next = self.free_head;
        self.free_head = Some(index);
    }

    /// Grows the list to hold at least `capacity` entries.
    ///
    /// New entries start at version `1` and are linked in front of
    /// the existing free list.
    pub fn ensure_capacity(&mut self, capacity: usize) {
        let current = self.entries.len();
        if current >= capacity {
            return;
        }

        let tail = self.free_head;
        self.entries.extend((current..capacity).map(|i| StorageEntry {
            next: if i + 1 == capacity {
                tail
            } else {
                Some(i as u32 + 1)
            },
            dense_index: None,
            version: 1,
        }));
        self.free_head = Some(current as u32);
    }

    /// Frees every entry while keeping their versions monotonic.
    pub fn reset(&mut self) {
        let len = self.entries.len();
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if entry.dense_index.take().is_some() {
                entry.version = next_version(entry.version);
            }
            entry.next = (i + 1 < len).then_some(i as u32 + 1);
        }

        self.free_head = (len > 0).then_some(0);
    }

    /// Dense index of the motion behind `index` if `version` is the
    /// current generation of that entry.
    #[inline]
    pub fn resolve(&self, index: u32, version: u32) -> Option<u32> {
        self.entries
            .get(index as usize)
            .filter(|entry| entry.version == version)
            .and_then(|entry| entry.dense_index)
    }

    #[inline]
    pub fn set_dense_index(&mut self, index: u32, dense_index: u32) {
        if let Some(entry) = self.entries.get_mut(index as usize) {
            entry.dense_index = Some(dense_index);
        }
    }

    #[inline]
    pub fn dense_index(&self, index: u32) -> Option<u32> {
        self.entries
            .get(index as usize)
            .and_then(|entry| entry.dense_index)
    }

    #[inline]
    pub fn get(&self, index: u32) -> Option<&StorageEntry> {
        self.entries.get(index as usize)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn occupied(&self) -> usize {
        self.entries.iter().filter(|e| e.is_occupied()).count()
    }
}

/// Increments a version, skipping `0` on wrap-around.
#[inline]
fn next_version(version: u32) -> u32 {
    version.wrapping_add(1).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_hands_out_sequential_entries() {
        let mut list = StorageEntryList::new(4);

        assert_eq!(list.alloc(0), (0, 1));
        assert_eq!(list.alloc(1), (1, 1));
        assert_eq!(list.alloc(2), (2, 1));
        assert_eq!(list.resolve(1, 1), Some(1));
    }

    #[test]
    fn alloc_doubles_capacity_when_full() {
        let mut list = StorageEntryList::new(2);
        for dense in 0..3 {
            list.alloc(dense);
        }

        assert_eq!(list.capacity(), 4);
        assert_eq!(list.occupied(), 3);
    }

    #[test]
    fn free_bumps_version_and_reuses_entry() {
        let mut list = StorageEntryList::new(4);
        let (index, version) = list.alloc(0);
        list.alloc(1);

        list.free(index);
        assert_eq!(list.resolve(index, version), None);
        assert!(!list.get(index).unwrap().is_occupied());

        // Most recently freed entries are reused first.
        let (reused, new_version) = list.alloc(0);
        assert_eq!(reused, index);
        assert_eq!(new_version, version + 1);
        assert_eq!(list.resolve(index, version), None);
        assert_eq!(list.resolve(index, new_version), Some(0));
    }

    #[test]
    fn double_free_is_ignored() {
        let mut list = StorageEntryList::new(2);
        let (index, _) = list.alloc(0);

        list.free(index);
        list.free(index);

        assert_eq!(list.get(index).unwrap().version, 2);
        let (a, _) = list.alloc(0);
        let (b, _) = list.alloc(1);
        assert_ne!(a, b);
    }

    #[test]
    fn zero_version_never_resolves() {
        let mut list = StorageEntryList::new(1);
        list.alloc(0);

        assert_eq!(list.resolve(0, 0), None);
        assert_eq!(next_version(u32::MAX), 1);
    }

    #[test]
    fn reset_invalidates_live_entries() {
        let mut list = StorageEntryList::new(2);
        let (a, va) = list.alloc(0);
        let (b, vb) = list.alloc(1);

        list.reset();

        assert_eq!(list.occupied(), 0);
        assert_eq!(list.resolve(a, va), None);
        assert_eq!(list.resolve(b, vb), None);
        assert_eq!(list.alloc(0), (0, 2));
    }
}
