use crate::entry::CacheEntry;
use crate::key::CacheKey;

use core::fmt;

use ahash::{HashMap, HashMapExt};
use generational_arena::{Arena, Index};

#[derive(Debug)]
struct Node<V> {
  key: CacheKey,
  entry: CacheEntry<V>,
  next: Option<Index>,
  prev: Option<Index>,
  // Write-order links, independent of recency.
  newer: Option<Index>,
  older: Option<Index>,
}

/// An ordered key→entry map.
///
/// Entries live in an arena and are threaded on two intrusive doubly linked
/// lists, one ordered by recency and one by write time, so `get`, `put`,
/// `remove`, `touch` and both oldest-entry lookups are all O(1). It carries no
/// policy logic; eviction decisions belong to `EvictionPolicy`.
pub(crate) struct CacheStore<V> {
  // Arena stores all nodes contiguously.
  nodes: Arena<Node<V>>,
  // HashMap for O(1) lookup of a key to its node index in the arena.
  lookup: HashMap<CacheKey, Index>,
  // Head is the most-recently-used entry.
  head: Option<Index>,
  // Tail is the least-recently-used entry.
  tail: Option<Index>,
  newest_written: Option<Index>,
  oldest_written: Option<Index>,
}

impl<V> fmt::Debug for CacheStore<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheStore")
      .field("len", &self.lookup.len())
      .finish()
  }
}

impl<V> CacheStore<V> {
  pub fn new() -> Self {
    Self {
      nodes: Arena::new(),
      lookup: HashMap::new(),
      head: None,
      tail: None,
      newest_written: None,
      oldest_written: None,
    }
  }

  // Helper to unlink a node from the list.
  // This is a private method as it doesn't handle arena/map removal.
  fn unlink(&mut self, index: Index) {
    let node = &self.nodes[index];
    let prev_node_idx = node.prev;
    let next_node_idx = node.next;

    if let Some(prev_idx) = prev_node_idx {
      self.nodes[prev_idx].next = next_node_idx;
    } else {
      // We are unlinking the head of the list.
      self.head = next_node_idx;
    }

    if let Some(next_idx) = next_node_idx {
      self.nodes[next_idx].prev = prev_node_idx;
    } else {
      // We are unlinking the tail of the list.
      self.tail = prev_node_idx;
    }
  }

  // Helper to push a node to the front (making it the new head).
  // Assumes the node is already in the arena and unlinked.
  fn push_front_node(&mut self, index: Index) {
    let old_head_idx = self.head;
    self.nodes[index].next = old_head_idx;
    self.nodes[index].prev = None;
    self.head = Some(index);

    if let Some(old_head) = old_head_idx {
      self.nodes[old_head].prev = Some(index);
    }

    if self.tail.is_none() {
      self.tail = Some(index);
    }
  }

  fn unlink_written(&mut self, index: Index) {
    let (newer, older) = {
      let node = &self.nodes[index];
      (node.newer, node.older)
    };

    match newer {
      Some(newer_idx) => self.nodes[newer_idx].older = older,
      None => self.newest_written = older,
    }
    match older {
      Some(older_idx) => self.nodes[older_idx].newer = newer,
      None => self.oldest_written = newer,
    }
  }

  // Assumes the node is already in the arena and off the write list.
  fn push_newest_written(&mut self, index: Index) {
    let old_newest = self.newest_written;
    self.nodes[index].older = old_newest;
    self.nodes[index].newer = None;
    self.newest_written = Some(index);

    match old_newest {
      Some(old) => self.nodes[old].newer = Some(index),
      None => self.oldest_written = Some(index),
    }
  }

  pub fn len(&self) -> usize {
    self.lookup.len()
  }

  #[cfg(test)]
  pub fn is_empty(&self) -> bool {
    self.lookup.is_empty()
  }

  #[cfg(test)]
  pub fn contains(&self, key: &CacheKey) -> bool {
    self.lookup.contains_key(key)
  }

  pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry<V>> {
    let index = *self.lookup.get(key)?;
    self.nodes.get(index).map(|node| &node.entry)
  }

  pub fn get_mut(&mut self, key: &CacheKey) -> Option<&mut CacheEntry<V>> {
    let index = *self.lookup.get(key)?;
    self.nodes.get_mut(index).map(|node| &mut node.entry)
  }

  /// Inserts or replaces the entry for `key`, making it both the most recently
  /// used and the newest written. Returns the replaced entry, if any.
  pub fn put(&mut self, key: CacheKey, entry: CacheEntry<V>) -> Option<CacheEntry<V>> {
    if let Some(&index) = self.lookup.get(&key) {
      let old = std::mem::replace(&mut self.nodes[index].entry, entry);
      self.touch(&key);
      self.unlink_written(index);
      self.push_newest_written(index);
      Some(old)
    } else {
      let new_node = Node {
        key: key.clone(),
        entry,
        next: None,
        prev: None,
        newer: None,
        older: None,
      };
      let index = self.nodes.insert(new_node);
      self.lookup.insert(key, index);
      self.push_front_node(index);
      self.push_newest_written(index);
      None
    }
  }

  /// Marks `key` as the most recently used. Returns `false` if it is absent.
  pub fn touch(&mut self, key: &CacheKey) -> bool {
    match self.lookup.get(key) {
      Some(&index) => {
        // Only move if it's not already the head.
        if self.head != Some(index) {
          self.unlink(index);
          self.push_front_node(index);
        }
        true
      }
      None => false,
    }
  }

  pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry<V>> {
    let index = self.lookup.remove(key)?;
    self.unlink(index);
    self.unlink_written(index);
    self.nodes.remove(index).map(|node| node.entry)
  }

  /// Returns the least recently used entry without removing it.
  pub fn peek_oldest(&self) -> Option<(&CacheKey, &CacheEntry<V>)> {
    let node = self.nodes.get(self.tail?)?;
    Some((&node.key, &node.entry))
  }

  /// Returns the entry written longest ago, ignoring reads.
  pub fn peek_oldest_written(&self) -> Option<(&CacheKey, &CacheEntry<V>)> {
    let node = self.nodes.get(self.oldest_written?)?;
    Some((&node.key, &node.entry))
  }

  /// Removes and returns the least recently used entry.
  pub fn pop_oldest(&mut self) -> Option<(CacheKey, CacheEntry<V>)> {
    let tail_index = self.tail?;
    let key = self.nodes.get(tail_index)?.key.clone();
    let entry = self.remove(&key)?;
    Some((key, entry))
  }

  /// Iterates over all entries from least to most recently used.
  pub fn iter_in_recency_order(&self) -> RecencyIter<'_, V> {
    RecencyIter {
      store: self,
      cursor: self.tail,
    }
  }

  /// Removes every entry, returning how many were dropped.
  pub fn clear(&mut self) -> usize {
    let count = self.lookup.len();
    self.nodes.clear();
    self.lookup.clear();
    self.head = None;
    self.tail = None;
    self.newest_written = None;
    self.oldest_written = None;
    count
  }
}

/// Oldest-first iterator over a `CacheStore`.
pub(crate) struct RecencyIter<'a, V> {
  store: &'a CacheStore<V>,
  cursor: Option<Index>,
}

impl<'a, V> Iterator for RecencyIter<'a, V> {
  type Item = (&'a CacheKey, &'a CacheEntry<V>);

  fn next(&mut self) -> Option<Self::Item> {
    let node = self.store.nodes.get(self.cursor?)?;
    self.cursor = node.prev;
    Some((&node.key, &node.entry))
  }
}
