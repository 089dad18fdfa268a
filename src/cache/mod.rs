//! Bounded LRU cache for query embeddings.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Thread-safe LRU cache for query embeddings.
///
/// Keyed by (model, query) so retrievers bound to different embedding models
/// can share one cache without mixing vector spaces.
pub struct EmbeddingCache {
    entries: Mutex<LruCache<(String, String), Vec<f32>>>,
}

impl EmbeddingCache {
    /// Create a cache holding at most `capacity` embeddings. A capacity of
    /// zero is clamped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("clamped to at least 1");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached embedding for a query under the given model, if present.
    /// Marks the entry as recently used.
    pub fn get(&self, model: &str, query: &str) -> Option<Vec<f32>> {
        let mut entries = self.entries.lock().expect("embedding cache poisoned");
        entries
            .get(&(model.to_string(), query.to_string()))
            .cloned()
    }

    /// Insert an embedding, evicting the least recently used entry when at
    /// capacity.
    pub fn put(&self, model: &str, query: &str, embedding: Vec<f32>) {
        let mut entries = self.entries.lock().expect("embedding cache poisoned");
        entries.put((model.to_string(), query.to_string()), embedding);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("embedding cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_roundtrip() {
        let cache = EmbeddingCache::new(4);
        cache.put("mini", "nearest hospital", vec![0.1, 0.2]);
        assert_eq!(
            cache.get("mini", "nearest hospital"),
            Some(vec![0.1, 0.2])
        );
        assert!(cache.get("mini", "other query").is_none());
    }

    #[test]
    fn test_keys_scoped_by_model() {
        let cache = EmbeddingCache::new(4);
        cache.put("mini", "q", vec![1.0]);
        assert!(cache.get("large", "q").is_none());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = EmbeddingCache::new(2);
        cache.put("m", "a", vec![1.0]);
        cache.put("m", "b", vec![2.0]);
        // Touch "a" so "b" becomes the eviction candidate.
        cache.get("m", "a");
        cache.put("m", "c", vec![3.0]);
        assert!(cache.get("m", "a").is_some());
        assert!(cache.get("m", "b").is_none());
        assert!(cache.get("m", "c").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let cache = EmbeddingCache::new(0);
        cache.put("m", "q", vec![1.0]);
        assert_eq!(cache.len(), 1);
    }
}
