//! Domain types for stored images.

use std::path::PathBuf;
use std::sync::Arc;

/// Caller-chosen identifier of one image within a library.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey(pub String);

impl ImageKey {
    /// Creates a new `ImageKey` from any string-like input.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns a filesystem-safe file stem derived from the key.
    ///
    /// The stem is the hex encoding of the first 16 bytes of the key's
    /// SHA-256 digest, so it is stable and never contains path separators.
    #[must_use]
    pub fn file_stem(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ImageKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ImageKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Encoding used when an image is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageFormat {
    /// PNG, exact pixels.
    Lossless,
    /// JPEG at the library's configured quality.
    Lossy,
}

impl StorageFormat {
    /// All formats, in lookup order.
    pub const ALL: [Self; 2] = [Self::Lossless, Self::Lossy];

    /// Maps the caller's `lossless` flag to a format.
    #[must_use]
    pub const fn from_lossless(lossless: bool) -> Self {
        if lossless { Self::Lossless } else { Self::Lossy }
    }

    /// File extension written for this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Lossless => "png",
            Self::Lossy => "jpg",
        }
    }

    /// The other format.
    #[must_use]
    pub const fn sibling(self) -> Self {
        match self {
            Self::Lossless => Self::Lossy,
            Self::Lossy => Self::Lossless,
        }
    }
}

impl std::fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lossless => write!(f, "lossless"),
            Self::Lossy => write!(f, "lossy"),
        }
    }
}

/// Where an image was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Served from the in-memory LRU cache.
    MemoryCache,
    /// Served from a write that has not landed on disk yet.
    PendingWrite,
    /// Read and decoded from disk.
    Disk,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::PendingWrite => write!(f, "pending"),
            Self::Disk => write!(f, "disk"),
        }
    }
}

/// An image returned by a lookup, with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// The key that was looked up.
    pub key: ImageKey,
    /// The decoded image.
    pub image: Arc<image::DynamicImage>,
    /// Which tier served it.
    pub source: ImageSource,
}

/// A write that landed on disk.
#[derive(Debug, Clone)]
pub struct StoredImage {
    /// The key the image was stored under.
    pub key: ImageKey,
    /// The image that was encoded.
    pub image: Arc<image::DynamicImage>,
    /// The format actually used.
    pub format: StorageFormat,
    /// Final location of the file.
    pub path: PathBuf,
    /// Encoded size in bytes.
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem_is_hex_and_stable() {
        let key = ImageKey::new("avatars/user 42.png");
        let stem = key.file_stem();
        assert_eq!(stem.len(), 32);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(stem, ImageKey::new("avatars/user 42.png").file_stem());
    }

    #[test]
    fn test_distinct_keys_have_distinct_stems() {
        assert_ne!(
            ImageKey::new("a").file_stem(),
            ImageKey::new("b").file_stem()
        );
    }

    #[test]
    fn test_format_extensions() {
        assert_eq!(StorageFormat::from_lossless(true).extension(), "png");
        assert_eq!(StorageFormat::from_lossless(false).extension(), "jpg");
        assert_eq!(StorageFormat::Lossless.sibling(), StorageFormat::Lossy);
    }
}
