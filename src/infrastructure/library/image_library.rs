//! A single named image library.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tracing::{debug, info};

use crate::domain::entities::{ImageKey, ImageSource, LoadedImage, StorageFormat};
use crate::domain::errors::LibraryResult;
use crate::domain::ports::ImageCodecPort;
use crate::infrastructure::image::{
    CacheStats, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_CONCURRENT_WRITES, DEFAULT_MEMORY_BUDGET,
    DiskImageStore, MemoryImageCache, WriteCoordinator, WriteHandle, path_mapper,
};

/// Per-library tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LibraryOptions {
    /// Store images as PNG unless the caller says otherwise.
    pub default_lossless: bool,
    /// JPEG quality in `0.0..=1.0`.
    pub jpeg_quality: f32,
    /// Decoded bytes kept in memory.
    pub memory_budget: usize,
    /// Writes encoding or writing at the same time.
    pub max_concurrent_writes: usize,
}

impl Default for LibraryOptions {
    fn default() -> Self {
        Self {
            default_lossless: false,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            memory_budget: DEFAULT_MEMORY_BUDGET,
            max_concurrent_writes: DEFAULT_MAX_CONCURRENT_WRITES,
        }
    }
}

fn clamp_quality(quality: f32) -> f32 {
    if quality.is_nan() {
        DEFAULT_JPEG_QUALITY
    } else {
        quality.clamp(0.0, 1.0)
    }
}

/// One named, isolated image store: a memory cache in front of a directory.
///
/// Reads are served from memory when possible, then from a write that has not
/// landed yet, then from disk. Writes return immediately and persist in the
/// background.
pub struct ImageLibrary {
    name: String,
    library_path: PathBuf,
    default_lossless: AtomicBool,
    jpeg_quality: AtomicU32,
    memory: MemoryImageCache,
    writes: WriteCoordinator,
}

impl std::fmt::Debug for ImageLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLibrary")
            .field("name", &self.name)
            .field("library_path", &self.library_path)
            .field("default_lossless", &self.default_lossless())
            .field("jpeg_quality", &self.jpeg_quality())
            .finish_non_exhaustive()
    }
}

impl ImageLibrary {
    /// Creates a library named `name` under `root`.
    ///
    /// Nothing is created on disk until the first write lands.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        root: &Path,
        options: LibraryOptions,
        codec: Arc<dyn ImageCodecPort>,
    ) -> Self {
        let name = name.into();
        let library_path = path_mapper::library_path(root, &name);
        let store = DiskImageStore::new(library_path.clone(), codec);

        debug!(library = %name, path = %library_path.display(), "Created image library");

        Self {
            name,
            library_path,
            default_lossless: AtomicBool::new(options.default_lossless),
            jpeg_quality: AtomicU32::new(clamp_quality(options.jpeg_quality).to_bits()),
            memory: MemoryImageCache::new(options.memory_budget),
            writes: WriteCoordinator::new(store, options.max_concurrent_writes),
        }
    }

    /// Library name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding this library's files.
    #[must_use]
    pub fn library_path(&self) -> &Path {
        &self.library_path
    }

    /// Whether images default to PNG.
    #[must_use]
    pub fn default_lossless(&self) -> bool {
        self.default_lossless.load(Ordering::Relaxed)
    }

    /// Changes the default format for later writes.
    pub fn set_default_lossless(&self, lossless: bool) {
        self.default_lossless.store(lossless, Ordering::Relaxed);
    }

    /// JPEG quality used for lossy writes.
    #[must_use]
    pub fn jpeg_quality(&self) -> f32 {
        f32::from_bits(self.jpeg_quality.load(Ordering::Relaxed))
    }

    /// Changes the JPEG quality for later writes. Clamped to `0.0..=1.0`.
    pub fn set_jpeg_quality(&self, quality: f32) {
        self.jpeg_quality
            .store(clamp_quality(quality).to_bits(), Ordering::Relaxed);
    }

    fn resolve_format(&self, lossless: Option<bool>) -> StorageFormat {
        StorageFormat::from_lossless(lossless.unwrap_or_else(|| self.default_lossless()))
    }

    /// Puts an image into the library.
    ///
    /// The image is visible to `image_for_key` as soon as this returns; it is
    /// written to disk in the background. `lossless` picks PNG or JPEG and
    /// falls back to the library default.
    ///
    /// Must be called from within a tokio runtime.
    pub fn set_image(
        &self,
        image: impl Into<Arc<image::DynamicImage>>,
        key: impl Into<ImageKey>,
        lossless: Option<bool>,
    ) -> WriteHandle {
        let image = image.into();
        let key = key.into();
        let format = self.resolve_format(lossless);

        self.memory.put(key.clone(), image.clone());
        self.writes.enqueue(key, image, format, self.jpeg_quality())
    }

    /// Loads an image from memory, a pending write, or disk.
    ///
    /// # Errors
    /// Returns `NotFound` if nothing is stored under `key`, `Decode` if the
    /// stored file is corrupt, `Io` if it cannot be read.
    pub async fn load_image(&self, key: impl Into<ImageKey>) -> LibraryResult<LoadedImage> {
        let key = key.into();

        if let Some(image) = self.memory.get(&key) {
            return Ok(LoadedImage {
                key,
                image,
                source: ImageSource::MemoryCache,
            });
        }

        // Held until memory is populated so a removal cannot slip in between.
        let _gate = self.writes.read_gate().await;
        if let Some(image) = self.writes.pending_image(&key) {
            return Ok(self.cache_pending(key, image));
        }

        let image = self.writes.store().read(&key).await?;

        // A set_image may have raced the disk read.
        if let Some(newer) = self.writes.pending_image(&key) {
            return Ok(self.cache_pending(key, newer));
        }

        let image = self.memory.insert_if_absent(key.clone(), image);
        Ok(LoadedImage {
            key,
            image,
            source: ImageSource::Disk,
        })
    }

    fn cache_pending(&self, key: ImageKey, image: Arc<image::DynamicImage>) -> LoadedImage {
        let image = self.memory.insert_if_absent(key.clone(), image);
        LoadedImage {
            key,
            image,
            source: ImageSource::PendingWrite,
        }
    }

    /// Returns the image for `key`, or `None` if it is missing or unreadable.
    pub async fn image_for_key(&self, key: impl Into<ImageKey>) -> Option<Arc<image::DynamicImage>> {
        self.load_image(key).await.ok().map(|loaded| loaded.image)
    }

    /// Path `key` is written to in the library's default format.
    #[must_use]
    pub fn path_for_key(&self, key: impl Into<ImageKey>) -> PathBuf {
        self.path_for_key_with_format(key, self.resolve_format(None))
    }

    /// Path `key` is written to in `format`.
    #[must_use]
    pub fn path_for_key_with_format(
        &self,
        key: impl Into<ImageKey>,
        format: StorageFormat,
    ) -> PathBuf {
        path_mapper::image_path(&self.library_path, &key.into(), format)
    }

    /// Path of the file currently on disk for `key`, whichever format it used.
    pub async fn stored_path(&self, key: impl Into<ImageKey>) -> Option<PathBuf> {
        let key = key.into();
        let store = self.writes.store();
        store
            .stored_format(&key)
            .await
            .map(|format| store.path_for(&key, format))
    }

    /// Removes an image from memory and disk, cancelling any pending write.
    ///
    /// # Errors
    /// Returns `Io` if an existing file cannot be deleted.
    pub async fn remove_image_for_key(&self, key: impl Into<ImageKey>) -> LibraryResult<()> {
        let key = key.into();
        self.writes
            .remove(&key, || {
                self.memory.remove(&key);
            })
            .await?;
        debug!(library = %self.name, key = %key, "Removed image");
        Ok(())
    }

    /// Removes every image, cancelling all pending writes, and deletes the
    /// library directory.
    ///
    /// # Errors
    /// Returns `Io` if the directory cannot be deleted.
    pub async fn remove_all_images(&self) -> LibraryResult<()> {
        self.writes.remove_all(|| self.memory.clear()).await?;
        info!(library = %self.name, "Removed all images");
        Ok(())
    }

    /// Memory cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.memory.stats()
    }

    /// Number of writes that have not settled yet.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.writes.pending_count()
    }
}
