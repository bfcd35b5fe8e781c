//! Least-recently-used eviction
//!
//! Recency is tracked in an arena-backed doubly linked list of keys with a
//! hash index into it, so touch, insert and evict are all O(1).

use sqlweave_types::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

use crate::cache::{Cache, CacheStats};
use crate::error::Result;
use crate::key::CacheKey;

pub const DEFAULT_LRU_CAPACITY: usize = 1024;

pub struct LruCache {
    delegate: Box<dyn Cache>,
    order: Mutex<RecencyList>,
}

impl LruCache {
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self::with_capacity(delegate, DEFAULT_LRU_CAPACITY)
    }

    pub fn with_capacity(delegate: Box<dyn Cache>, capacity: usize) -> Self {
        Self {
            delegate,
            order: Mutex::new(RecencyList::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.order().capacity
    }

    /// Change the bound; takes effect on the next insert
    pub fn set_capacity(&self, capacity: usize) {
        self.order().capacity = capacity;
    }

    fn order(&self) -> MutexGuard<'_, RecencyList> {
        self.order.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Cache for LruCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: Value) {
        let mut order = self.order();
        self.delegate.put(key.clone(), value);
        if let Some(eldest) = order.touch_or_insert(key) {
            trace!(cache = %self.id(), key = %eldest, "evicting least recently used entry");
            self.delegate.remove(&eldest);
        }
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        let mut order = self.order();
        order.touch(key);
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> Option<Value> {
        let mut order = self.order();
        order.remove(key);
        self.delegate.remove(key)
    }

    fn release(&self, key: &CacheKey) {
        self.delegate.release(key);
    }

    fn clear(&self) {
        let mut order = self.order();
        order.clear();
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }

    fn stats(&self) -> Option<CacheStats> {
        self.delegate.stats()
    }
}

// ============================================================================
// Recency list
// ============================================================================

struct Slot {
    key: CacheKey,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Keys ordered from most (`head`) to least (`tail`) recently used
struct RecencyList {
    capacity: usize,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<CacheKey, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl RecencyList {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(&slot) = self.index.get(key) {
            self.unlink(slot);
            self.push_front(slot);
        }
    }

    /// Mark `key` most recent, returning the evicted eldest key if the list
    /// grew past capacity
    fn touch_or_insert(&mut self, key: CacheKey) -> Option<CacheKey> {
        if self.index.contains_key(&key) {
            self.touch(&key);
            return None;
        }

        let node = Slot {
            key: key.clone(),
            prev: None,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(node);
                i
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.index.insert(key, slot);
        self.push_front(slot);

        if self.len() > self.capacity {
            let eldest = self.tail?;
            return self.release_slot(eldest);
        }
        None
    }

    fn remove(&mut self, key: &CacheKey) {
        if let Some(&slot) = self.index.get(key) {
            self.release_slot(slot);
        }
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    fn release_slot(&mut self, slot: usize) -> Option<CacheKey> {
        self.unlink(slot);
        let node = self.slots.get_mut(slot)?.take()?;
        self.index.remove(&node.key);
        self.free.push(slot);
        Some(node.key)
    }

    fn links(&self, slot: usize) -> (Option<usize>, Option<usize>) {
        self.slots
            .get(slot)
            .and_then(Option::as_ref)
            .map_or((None, None), |n| (n.prev, n.next))
    }

    fn node_mut(&mut self, slot: usize) -> Option<&mut Slot> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = self.links(slot);
        match prev {
            Some(p) => {
                if let Some(n) = self.node_mut(p) {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.node_mut(n) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(node) = self.node_mut(slot) {
            node.prev = None;
            node.next = None;
        }
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(slot) {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(node) = self.node_mut(h) {
                node.prev = Some(slot);
            }
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    #[cfg(test)]
    fn keys_most_recent_first(&self) -> Vec<CacheKey> {
        let mut out = Vec::new();
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let Some(node) = self.slots[slot].as_ref() else {
                break;
            };
            out.push(node.key.clone());
            cursor = node.next;
        }
        out
    }
}
