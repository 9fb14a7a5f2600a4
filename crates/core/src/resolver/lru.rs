//! Fixed-capacity LRU cache
//!
//! Entries live in a `Vec` arena; a `HashMap` indexes them by key and an
//! intrusive doubly linked list threaded through the arena keeps recency
//! order. Eviction reuses the slot of the least recently used entry, so the
//! arena never grows past the capacity.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct LruCache<K, V> {
    capacity: usize,
    index: HashMap<K, usize>,
    entries: Vec<Entry<K, V>>,
    /// Most recently used
    head: Option<usize>,
    /// Least recently used
    tail: Option<usize>,
}

impl<K: Hash + Eq + Clone, V: Clone> LruCache<K, V> {
    /// A capacity of zero is treated as one
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            index: HashMap::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    pub(crate) fn get(&mut self, key: &K) -> Option<V> {
        let slot = *self.index.get(key)?;
        self.touch(slot);
        Some(self.entries[slot].value.clone())
    }

    pub(crate) fn put(&mut self, key: K, value: V) {
        if let Some(&slot) = self.index.get(&key) {
            self.entries[slot].value = value;
            self.touch(slot);
            return;
        }

        let slot = if self.entries.len() < self.capacity {
            self.entries.push(Entry {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            });
            self.entries.len() - 1
        } else {
            let Some(lru) = self.tail else {
                return;
            };
            self.unlink(lru);
            let entry = &mut self.entries[lru];
            self.index.remove(&entry.key);
            entry.key = key.clone();
            entry.value = value;
            lru
        };

        self.index.insert(key, slot);
        self.push_front(slot);
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
        self.head = None;
        self.tail = None;
    }

    fn touch(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.push_front(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.entries[slot].prev, self.entries[slot].next);
        match prev {
            Some(p) => self.entries[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.entries[n].prev = prev,
            None => self.tail = prev,
        }
        self.entries[slot].prev = None;
        self.entries[slot].next = None;
    }

    fn push_front(&mut self, slot: usize) {
        self.entries[slot].prev = None;
        self.entries[slot].next = self.head;
        if let Some(h) = self.head {
            self.entries[h].prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }
}
