//! Disk persistence for one library directory.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, trace, warn};

use crate::domain::entities::{ImageKey, StorageFormat};
use crate::domain::errors::{LibraryError, LibraryResult};
use crate::domain::ports::ImageCodecPort;

use super::path_mapper;

/// Encodes, writes, reads and deletes images under a library directory.
///
/// The directory is created lazily on the first write, so constructing a store
/// never touches the filesystem.
pub struct DiskImageStore {
    library_path: PathBuf,
    codec: Arc<dyn ImageCodecPort>,
}

impl std::fmt::Debug for DiskImageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImageStore")
            .field("library_path", &self.library_path)
            .finish_non_exhaustive()
    }
}

impl DiskImageStore {
    /// Creates a store rooted at `library_path`.
    #[must_use]
    pub fn new(library_path: PathBuf, codec: Arc<dyn ImageCodecPort>) -> Self {
        Self {
            library_path,
            codec,
        }
    }

    /// Returns the library directory.
    #[must_use]
    pub fn library_path(&self) -> &Path {
        &self.library_path
    }

    /// Returns the path `key` is stored at in `format`.
    #[must_use]
    pub fn path_for(&self, key: &ImageKey, format: StorageFormat) -> PathBuf {
        path_mapper::image_path(&self.library_path, key, format)
    }

    /// Returns the format `key` is currently stored in, if any.
    pub async fn stored_format(&self, key: &ImageKey) -> Option<StorageFormat> {
        for format in StorageFormat::ALL {
            if fs::try_exists(self.path_for(key, format))
                .await
                .unwrap_or(false)
            {
                return Some(format);
            }
        }
        None
    }

    /// Checks if an image is stored for `key`.
    pub async fn contains(&self, key: &ImageKey) -> bool {
        self.stored_format(key).await.is_some()
    }

    /// Encodes an image on a blocking thread.
    ///
    /// # Errors
    /// Returns `Encode` if the codec rejects the image.
    pub async fn encode(
        &self,
        image: Arc<image::DynamicImage>,
        format: StorageFormat,
        quality: f32,
    ) -> LibraryResult<Vec<u8>> {
        let codec = self.codec.clone();
        tokio::task::spawn_blocking(move || codec.encode(&image, format, quality))
            .await
            .map_err(|e| LibraryError::encode(format!("Encode task panicked: {e}")))?
    }

    /// Reads raw bytes for `key`, trying each format in turn.
    ///
    /// # Errors
    /// Returns `NotFound` if no file exists, `Io` on any other read failure.
    pub async fn read_bytes(&self, key: &ImageKey) -> LibraryResult<(Vec<u8>, StorageFormat)> {
        for format in StorageFormat::ALL {
            let path = self.path_for(key, format);
            match fs::read(&path).await {
                Ok(bytes) => {
                    trace!(key = %key, path = %path.display(), "Disk hit");
                    return Ok((bytes, format));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(LibraryError::io(format!(
                        "Failed to read {}: {e}",
                        path.display()
                    )));
                }
            }
        }
        trace!(key = %key, "Disk miss");
        Err(LibraryError::not_found(key.as_str()))
    }

    /// Loads and decodes an image.
    ///
    /// # Errors
    /// Returns `NotFound`, `Io`, or `Decode`.
    pub async fn read(&self, key: &ImageKey) -> LibraryResult<Arc<image::DynamicImage>> {
        let (bytes, format) = self.read_bytes(key).await?;
        let codec = self.codec.clone();

        let decoded = tokio::task::spawn_blocking(move || codec.decode(&bytes))
            .await
            .map_err(|e| LibraryError::decode(format!("Decode task panicked: {e}")))?;

        match decoded {
            Ok(img) => {
                debug!(key = %key, format = %format, "Decoded image from disk");
                Ok(Arc::new(img))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to decode stored image");
                Err(e)
            }
        }
    }

    /// Writes encoded bytes for `key`, replacing any previous file atomically.
    ///
    /// A file stored under the other format is removed afterwards. Failing to
    /// remove it is logged and does not fail the write.
    ///
    /// # Errors
    /// Returns `Io` if the directory or file cannot be written.
    pub async fn write(
        &self,
        key: &ImageKey,
        format: StorageFormat,
        bytes: Vec<u8>,
    ) -> LibraryResult<PathBuf> {
        let path = self.path_for(key, format);
        let dir = self.library_path.clone();
        let target = path.clone();
        let size = bytes.len();

        tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &bytes))
            .await
            .map_err(|e| LibraryError::io(format!("Write task panicked: {e}")))??;

        // The new file has landed; a leftover sibling only wastes space.
        let sibling = self.path_for(key, format.sibling());
        if let Err(e) = remove_if_present(&sibling).await {
            warn!(key = %key, path = %sibling.display(), error = %e, "Failed to remove previous format");
        }

        debug!(key = %key, path = %path.display(), size = size, "Stored image on disk");
        Ok(path)
    }

    /// Removes every file stored for `key`. Missing files are not an error.
    ///
    /// # Errors
    /// Returns `Io` if an existing file cannot be removed.
    pub async fn delete(&self, key: &ImageKey) -> LibraryResult<()> {
        for format in StorageFormat::ALL {
            remove_if_present(&self.path_for(key, format)).await?;
        }
        debug!(key = %key, "Deleted image from disk");
        Ok(())
    }

    /// Removes the whole library directory. A missing directory is not an error.
    ///
    /// # Errors
    /// Returns `Io` if the directory exists but cannot be removed.
    pub async fn delete_all(&self) -> LibraryResult<()> {
        match fs::remove_dir_all(&self.library_path).await {
            Ok(()) => {
                debug!(path = %self.library_path.display(), "Deleted library directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LibraryError::io(format!(
                "Failed to remove {}: {e}",
                self.library_path.display()
            ))),
        }
    }
}

fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> LibraryResult<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| LibraryError::io(format!("Failed to create library dir: {e}")))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| LibraryError::io(format!("Failed to create temp file: {e}")))?;
    temp_file
        .write_all(bytes)
        .map_err(|e| LibraryError::io(format!("Failed to write image file: {e}")))?;
    temp_file
        .persist(path)
        .map_err(|e| LibraryError::io(format!("Failed to persist image file: {}", e.error)))?;
    Ok(())
}

async fn remove_if_present(path: &Path) -> LibraryResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LibraryError::io(format!(
            "Failed to remove {}: {e}",
            path.display()
        ))),
    }
}
