//! Per-key single-flight persistence pipeline.
//!
//! Every `enqueue` mints a fresh generation for its key and replaces the
//! previous active write. Background jobs re-check their generation before
//! encoding, right before the filesystem write, and when delivering the
//! outcome; a job that lost its generation becomes a silent no-op.
//!
//! Lock order: per-key slot, then I/O gate (shared). Removals take the I/O
//! gate exclusively, so no write validated before a removal can land after
//! the removal's delete.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{RwLock, RwLockReadGuard, Semaphore, oneshot};
use tracing::{debug, trace, warn};

use crate::domain::entities::{ImageKey, StorageFormat, StoredImage};
use crate::domain::errors::{LibraryError, LibraryResult, WriteFailure};

use super::disk_store::DiskImageStore;

/// Default number of writes encoding or writing at the same time.
pub const DEFAULT_MAX_CONCURRENT_WRITES: usize = 4;

/// Terminal outcome of an accepted write.
pub type WriteResult = Result<StoredImage, WriteFailure>;

/// Resolves once the write it was returned for settles.
#[derive(Debug)]
#[must_use = "dropping a WriteHandle does not cancel the write, but its outcome is lost"]
pub struct WriteHandle {
    key: ImageKey,
    generation: u64,
    rx: oneshot::Receiver<WriteResult>,
}

impl WriteHandle {
    /// Key this write was issued for.
    #[must_use]
    pub fn key(&self) -> &ImageKey {
        &self.key
    }

    /// Generation assigned to this write.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Waits for the outcome.
    ///
    /// Returns `None` if the write was superseded by a newer write for the
    /// same key or cancelled by a removal; no outcome is ever delivered for
    /// such writes.
    pub async fn wait(self) -> Option<WriteResult> {
        self.rx.await.ok()
    }
}

/// Entry for the write currently allowed to land for a key.
struct ActiveWrite {
    generation: u64,
    image: Arc<image::DynamicImage>,
    slot: Arc<tokio::sync::Mutex<()>>,
    tx: oneshot::Sender<WriteResult>,
}

/// Everything a background job needs, detached from the coordinator borrow.
struct WriteJob {
    key: ImageKey,
    generation: u64,
    image: Arc<image::DynamicImage>,
    format: StorageFormat,
    quality: f32,
    slot: Arc<tokio::sync::Mutex<()>>,
}

struct Shared {
    active: Mutex<HashMap<ImageKey, ActiveWrite>>,
    io_gate: RwLock<()>,
    permits: Semaphore,
    store: DiskImageStore,
}

impl Shared {
    fn is_current(&self, key: &ImageKey, generation: u64) -> bool {
        self.active
            .lock()
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
    }

    /// Delivers `result` and retires the entry if `generation` is still active.
    fn settle(&self, key: &ImageKey, generation: u64, result: WriteResult) -> bool {
        let mut active = self.active.lock();
        if active
            .get(key)
            .is_none_or(|entry| entry.generation != generation)
        {
            return false;
        }
        if let Some(entry) = active.remove(key) {
            let _ = entry.tx.send(result);
        }
        true
    }
}

/// Manages one outstanding persist operation per key for a library.
pub struct WriteCoordinator {
    shared: Arc<Shared>,
    next_generation: AtomicU64,
}

impl std::fmt::Debug for WriteCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteCoordinator")
            .field("store", &self.shared.store)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl WriteCoordinator {
    /// Creates a coordinator owning `store`, running at most
    /// `max_concurrent_writes` jobs at once.
    #[must_use]
    pub fn new(store: DiskImageStore, max_concurrent_writes: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                active: Mutex::new(HashMap::new()),
                io_gate: RwLock::new(()),
                permits: Semaphore::new(max_concurrent_writes.max(1)),
                store,
            }),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &DiskImageStore {
        &self.shared.store
    }

    /// Schedules `image` to be persisted under `key`, superseding any earlier
    /// write for the same key. Never blocks; must be called inside a tokio runtime.
    pub fn enqueue(
        &self,
        key: ImageKey,
        image: Arc<image::DynamicImage>,
        format: StorageFormat,
        quality: f32,
    ) -> WriteHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let slot = {
            let mut active = self.shared.active.lock();
            let slot = active
                .get(&key)
                .map_or_else(|| Arc::new(tokio::sync::Mutex::new(())), |e| e.slot.clone());
            let superseded = active.insert(
                key.clone(),
                ActiveWrite {
                    generation,
                    image: image.clone(),
                    slot: slot.clone(),
                    tx,
                },
            );
            if let Some(old) = superseded {
                trace!(key = %key, superseded = old.generation, generation, "Superseded pending write");
            }
            slot
        };

        debug!(key = %key, generation, format = %format, "Enqueued image write");

        let job = WriteJob {
            key: key.clone(),
            generation,
            image,
            format,
            quality,
            slot,
        };
        tokio::spawn(run_job(self.shared.clone(), job));

        WriteHandle {
            key,
            generation,
            rx,
        }
    }

    /// Returns the image of the active write for `key`, if one is pending.
    #[must_use]
    pub fn pending_image(&self, key: &ImageKey) -> Option<Arc<image::DynamicImage>> {
        self.shared
            .active
            .lock()
            .get(key)
            .map(|entry| entry.image.clone())
    }

    /// Returns true if a write for `key` is pending.
    #[must_use]
    pub fn is_pending(&self, key: &ImageKey) -> bool {
        self.shared.active.lock().contains_key(key)
    }

    /// Returns the number of pending writes.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.active.lock().len()
    }

    /// Holds off removals until the returned guard is dropped.
    pub async fn read_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.shared.io_gate.read().await
    }

    /// Cancels the pending write for `key` and deletes its files.
    ///
    /// `after_cancel` runs once the exclusive I/O gate is held and the token is
    /// invalidated, before the delete.
    ///
    /// # Errors
    /// Returns `Io` if an existing file cannot be removed.
    pub async fn remove<F: FnOnce()>(&self, key: &ImageKey, after_cancel: F) -> LibraryResult<()> {
        let _gate = self.shared.io_gate.write().await;
        if self.shared.active.lock().remove(key).is_some() {
            debug!(key = %key, "Cancelled pending write");
        }
        after_cancel();
        self.shared.store.delete(key).await
    }

    /// Cancels every pending write and deletes the library directory.
    ///
    /// # Errors
    /// Returns `Io` if the directory cannot be removed.
    pub async fn remove_all<F: FnOnce()>(&self, after_cancel: F) -> LibraryResult<()> {
        let _gate = self.shared.io_gate.write().await;
        let cancelled = {
            let mut active = self.shared.active.lock();
            let count = active.len();
            active.clear();
            count
        };
        if cancelled > 0 {
            debug!(count = cancelled, "Cancelled all pending writes");
        }
        after_cancel();
        self.shared.store.delete_all().await
    }
}

async fn run_job(shared: Arc<Shared>, job: WriteJob) {
    let Ok(_permit) = shared.permits.acquire().await else {
        return;
    };

    if !shared.is_current(&job.key, job.generation) {
        trace!(key = %job.key, generation = job.generation, "Skipping stale write before encode");
        return;
    }

    let encoded = shared
        .store
        .encode(job.image.clone(), job.format, job.quality)
        .await;
    let bytes = match encoded {
        Ok(bytes) => bytes,
        Err(error) => {
            fail(&shared, &job, error);
            return;
        }
    };

    let _slot = job.slot.lock().await;
    let _gate = shared.io_gate.read().await;

    if !shared.is_current(&job.key, job.generation) {
        trace!(key = %job.key, generation = job.generation, "Dropping stale write before disk");
        return;
    }

    let size = bytes.len() as u64;
    match shared.store.write(&job.key, job.format, bytes).await {
        Ok(path) => deliver(&shared, &job, path, size),
        Err(error) => fail(&shared, &job, error),
    }
}

fn deliver(shared: &Shared, job: &WriteJob, path: PathBuf, size: u64) {
    let stored = StoredImage {
        key: job.key.clone(),
        image: job.image.clone(),
        format: job.format,
        path,
        size,
    };
    if shared.settle(&job.key, job.generation, Ok(stored)) {
        debug!(key = %job.key, generation = job.generation, size, "Image write completed");
    } else {
        trace!(key = %job.key, generation = job.generation, "Write landed after being superseded");
    }
}

fn fail(shared: &Shared, job: &WriteJob, error: LibraryError) {
    warn!(key = %job.key, generation = job.generation, error = %error, "Image write failed");
    let failure = WriteFailure {
        key: job.key.as_str().to_string(),
        image: job.image.clone(),
        error,
    };
    shared.settle(&job.key, job.generation, Err(failure));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mock::MockImageCodec;
    use tempfile::TempDir;

    fn create_coordinator(codec: MockImageCodec) -> (WriteCoordinator, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskImageStore::new(temp_dir.path().join("lib"), Arc::new(codec));
        (WriteCoordinator::new(store, 2), temp_dir)
    }

    fn solid(width: u32) -> Arc<image::DynamicImage> {
        Arc::new(image::DynamicImage::new_rgba8(width, 1))
    }

    #[tokio::test]
    async fn test_write_completes_and_clears_entry() {
        let (coordinator, _temp) = create_coordinator(MockImageCodec::new());
        let key = ImageKey::new("a");

        let handle = coordinator.enqueue(key.clone(), solid(3), StorageFormat::Lossless, 1.0);
        assert!(coordinator.is_pending(&key));
        assert_eq!(coordinator.pending_image(&key).map(|i| i.width()), Some(3));

        let stored = handle.wait().await.unwrap().unwrap();
        assert_eq!(stored.format, StorageFormat::Lossless);
        assert!(stored.path.exists());
        assert!(!coordinator.is_pending(&key));
    }

    #[tokio::test]
    async fn test_superseded_write_never_delivers() {
        let (coordinator, _temp) = create_coordinator(MockImageCodec::new());
        let key = ImageKey::new("a");

        let first = coordinator.enqueue(key.clone(), solid(1), StorageFormat::Lossy, 0.8);
        let second = coordinator.enqueue(key.clone(), solid(2), StorageFormat::Lossy, 0.8);
        assert!(second.generation() > first.generation());

        let second = second.wait().await.unwrap().unwrap();
        assert!(first.wait().await.is_none());

        let on_disk = coordinator.store().read(&key).await.unwrap();
        assert_eq!(on_disk.width(), 2);
        assert_eq!(second.image.width(), 2);
    }

    #[tokio::test]
    async fn test_last_enqueued_wins_under_burst() {
        let (coordinator, _temp) = create_coordinator(MockImageCodec::new());
        let key = ImageKey::new("burst");

        let handles: Vec<_> = (1..=20)
            .map(|w| coordinator.enqueue(key.clone(), solid(w), StorageFormat::Lossless, 1.0))
            .collect();

        let mut delivered = Vec::new();
        for handle in handles {
            if let Some(Ok(stored)) = handle.wait().await {
                delivered.push(stored.image.width());
            }
        }

        assert_eq!(delivered, vec![20]);
        assert_eq!(coordinator.store().read(&key).await.unwrap().width(), 20);
    }

    #[tokio::test]
    async fn test_stale_writes_skip_encoding() {
        let codec = MockImageCodec::new();
        let encodes = codec.encodes.clone();
        let temp = TempDir::new().unwrap();
        let store = DiskImageStore::new(temp.path().join("lib"), Arc::new(codec));
        let coordinator = WriteCoordinator::new(store, 1);
        let key = ImageKey::new("burst");

        let burst = 20;
        let handles: Vec<_> = (1..=burst)
            .map(|w| coordinator.enqueue(key.clone(), solid(w), StorageFormat::Lossy, 0.8))
            .collect();
        for handle in handles {
            let _ = handle.wait().await;
        }

        let encodes = encodes.load(std::sync::atomic::Ordering::SeqCst);
        assert!(encodes >= 1);
        assert!(encodes < burst as usize);
    }

    #[tokio::test]
    async fn test_encode_failure_reports_original_image() {
        let (coordinator, _temp) = create_coordinator(MockImageCodec::failing());
        let key = ImageKey::new("broken");
        let image = solid(5);

        let handle = coordinator.enqueue(key.clone(), image.clone(), StorageFormat::Lossy, 0.8);
        let failure = handle.wait().await.unwrap().unwrap_err();

        assert!(Arc::ptr_eq(&failure.image, &image));
        assert!(matches!(failure.error, LibraryError::Encode { .. }));
        assert!(!coordinator.is_pending(&key));
        assert!(!coordinator.store().contains(&key).await);
    }

    #[tokio::test]
    async fn test_remove_cancels_pending_write() {
        let (coordinator, _temp) = create_coordinator(MockImageCodec::new());
        let key = ImageKey::new("a");

        let handle = coordinator.enqueue(key.clone(), solid(4), StorageFormat::Lossless, 1.0);
        let mut hook_ran = false;
        coordinator.remove(&key, || hook_ran = true).await.unwrap();

        assert!(hook_ran);
        assert!(handle.wait().await.is_none());
        assert!(!coordinator.store().contains(&key).await);
    }

    #[tokio::test]
    async fn test_remove_all_cancels_everything() {
        let (coordinator, _temp) = create_coordinator(MockImageCodec::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                coordinator.enqueue(
                    ImageKey::new(format!("key{i}")),
                    solid(1),
                    StorageFormat::Lossy,
                    0.8,
                )
            })
            .collect();
        coordinator.remove_all(|| {}).await.unwrap();

        assert_eq!(coordinator.pending_count(), 0);
        for handle in handles {
            assert!(handle.wait().await.is_none());
        }
        assert!(!coordinator.store().library_path().exists());
    }
}
