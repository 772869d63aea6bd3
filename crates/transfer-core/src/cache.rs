//! Bounded-byte-capacity LRU cache of in-flight chunk payloads, so the
//! sender can retransmit on timeout without re-reading the source file.

use std::collections::VecDeque;
use std::collections::HashMap;

/// Least-recently-used `index -> bytes` map capped by total byte size
/// rather than entry count, since chunk sizes vary near EOF.
pub struct LruChunkCache {
    capacity_bytes: u64,
    used_bytes: u64,
    entries: HashMap<u32, Vec<u8>>,
    order: VecDeque<u32>,
}

impl LruChunkCache {
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            capacity_bytes,
            used_bytes: 0,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Inserts or refreshes an entry, evicting least-recently-used entries
    /// until it fits.
    pub fn put(&mut self, index: u32, data: Vec<u8>) {
        if let Some(old) = self.entries.remove(&index) {
            self.used_bytes -= old.len() as u64;
            self.order.retain(|i| *i != index);
        }
        let size = data.len() as u64;
        while self.used_bytes + size > self.capacity_bytes && !self.order.is_empty() {
            if let Some(evict) = self.order.pop_front() {
                if let Some(evicted) = self.entries.remove(&evict) {
                    self.used_bytes -= evicted.len() as u64;
                }
            }
        }
        self.entries.insert(index, data);
        self.order.push_back(index);
        self.used_bytes += size;
    }

    /// Looks up an entry, marking it most-recently-used. `None` means the
    /// caller must fall back to re-reading the index from the source file.
    pub fn get(&mut self, index: u32) -> Option<&[u8]> {
        if self.entries.contains_key(&index) {
            self.order.retain(|i| *i != index);
            self.order.push_back(index);
            self.entries.get(&index).map(|v| v.as_slice())
        } else {
            None
        }
    }

    /// Removes an entry once it has been acknowledged.
    pub fn evict(&mut self, index: u32) {
        if let Some(old) = self.entries.remove(&index) {
            self.used_bytes -= old.len() as u64;
            self.order.retain(|i| *i != index);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.used_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get_round_trips() {
        let mut cache = LruChunkCache::new(1024);
        cache.put(0, vec![1, 2, 3]);
        assert_eq!(cache.get(0), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn evict_on_ack_frees_space() {
        let mut cache = LruChunkCache::new(1024);
        cache.put(0, vec![0u8; 100]);
        cache.evict(0);
        assert_eq!(cache.used_bytes(), 0);
        assert!(cache.get(0).is_none());
    }

    #[test]
    fn full_cache_evicts_least_recently_used() {
        let mut cache = LruChunkCache::new(30);
        cache.put(0, vec![0u8; 10]);
        cache.put(1, vec![1u8; 10]);
        cache.get(0);
        cache.put(2, vec![2u8; 10]);
        // 0 was touched most recently by get(); 1 should be the eviction target.
        cache.put(3, vec![3u8; 10]);
        assert!(cache.get(1).is_none());
        assert!(cache.get(0).is_some());
    }

    #[test]
    fn refreshing_existing_entry_does_not_duplicate_usage() {
        let mut cache = LruChunkCache::new(1024);
        cache.put(0, vec![0u8; 50]);
        cache.put(0, vec![0u8; 60]);
        assert_eq!(cache.used_bytes(), 60);
        assert_eq!(cache.len(), 1);
    }
}
