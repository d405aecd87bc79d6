//! In-memory LRU image cache bounded by decoded size.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::ImageKey;

/// Default budget for decoded pixels held in memory (64 MB).
pub const DEFAULT_MEMORY_BUDGET: usize = 64 * 1024 * 1024;

/// Returns the cost charged for keeping `image` in memory.
#[must_use]
pub fn image_cost(image: &image::DynamicImage) -> usize {
    image.as_bytes().len().max(1)
}

struct CacheState {
    entries: LruCache<ImageKey, (Arc<image::DynamicImage>, usize)>,
    total_cost: usize,
}

impl CacheState {
    fn remove(&mut self, key: &ImageKey) -> Option<Arc<image::DynamicImage>> {
        let (image, cost) = self.entries.pop(key)?;
        self.total_cost -= cost;
        Some(image)
    }
}

/// In-memory LRU cache for decoded images.
///
/// The lock is only held for O(1) map operations. Eviction never touches disk;
/// an evicted image is simply read back from disk on the next miss.
pub struct MemoryImageCache {
    state: Mutex<CacheState>,
    max_cost: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a new cache holding at most `max_cost` bytes of decoded pixels.
    #[must_use]
    pub fn new(max_cost: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                total_cost: 0,
            }),
            max_cost: max_cost.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Creates a new cache with the default budget.
    #[must_use]
    pub fn with_default_budget() -> Self {
        Self::new(DEFAULT_MEMORY_BUDGET)
    }

    /// Gets an image and marks it as recently used.
    pub fn get(&self, key: &ImageKey) -> Option<Arc<image::DynamicImage>> {
        let found = self.state.lock().entries.get(key).map(|(img, _)| img.clone());
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
        }
        found
    }

    /// Peeks at an image without promoting it in the LRU.
    pub fn peek(&self, key: &ImageKey) -> Option<Arc<image::DynamicImage>> {
        self.state.lock().entries.peek(key).map(|(img, _)| img.clone())
    }

    /// Stores an image, evicting least recently used entries while over budget.
    /// The entry just inserted is never evicted by its own insertion.
    pub fn put(&self, key: ImageKey, image: Arc<image::DynamicImage>) {
        let cost = image_cost(&image);
        let evicted = {
            let mut state = self.state.lock();
            self.insert_locked(&mut state, key.clone(), image, cost)
        };
        self.record_evictions(&key, evicted);
        trace!(key = %key, cost = cost, "Stored image in memory cache");
    }

    /// Stores `image` only if `key` is not cached yet.
    /// Returns whichever image is resident afterwards.
    pub fn insert_if_absent(
        &self,
        key: ImageKey,
        image: Arc<image::DynamicImage>,
    ) -> Arc<image::DynamicImage> {
        let cost = image_cost(&image);
        let evicted = {
            let mut state = self.state.lock();
            if let Some((resident, _)) = state.entries.get(&key) {
                return resident.clone();
            }
            self.insert_locked(&mut state, key.clone(), image.clone(), cost)
        };
        self.record_evictions(&key, evicted);
        image
    }

    fn insert_locked(
        &self,
        state: &mut CacheState,
        key: ImageKey,
        image: Arc<image::DynamicImage>,
        cost: usize,
    ) -> u64 {
        if let Some((_, old_cost)) = state.entries.put(key, (image, cost)) {
            state.total_cost -= old_cost;
        }
        state.total_cost += cost;

        let mut evicted = 0;
        while state.total_cost > self.max_cost && state.entries.len() > 1 {
            let Some((_, (_, lru_cost))) = state.entries.pop_lru() else {
                break;
            };
            state.total_cost -= lru_cost;
            evicted += 1;
        }
        evicted
    }

    fn record_evictions(&self, key: &ImageKey, evicted: u64) {
        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
            debug!(key = %key, evicted = evicted, "Evicted images to stay within memory budget");
        }
    }

    /// Removes an image.
    pub fn remove(&self, key: &ImageKey) -> Option<Arc<image::DynamicImage>> {
        let removed = self.state.lock().remove(key);
        if removed.is_some() {
            debug!(key = %key, "Removed image from memory cache");
        }
        removed
    }

    /// Clears all images.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.total_cost = 0;
        debug!("Cleared memory image cache");
    }

    /// Returns the number of cached images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the decoded bytes currently held.
    #[must_use]
    pub fn total_cost(&self) -> usize {
        self.state.lock().total_cost
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let (size, cost) = {
            let state = self.state.lock();
            (state.entries.len(), state.total_cost)
        };
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate,
            size,
            cost,
        }
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::with_default_budget()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries dropped to stay within budget.
    pub evictions: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Decoded bytes currently held.
    pub cost: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images ({} bytes), {:.1}% hit rate ({} hits, {} misses, {} evictions)",
            self.size, self.cost, self.hit_rate, self.hits, self.misses, self.evictions
        )
    }
}
