//! Name to library lookup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::domain::ports::ImageCodecPort;
use crate::infrastructure::image::StandardCodec;

use super::image_library::{ImageLibrary, LibraryOptions};

/// Name of the library returned by [`LibraryRegistry::default_library`].
pub const DEFAULT_LIBRARY_NAME: &str = "Default";

/// Owns every named library under one root directory.
///
/// Lookups take a shared lock; the first lookup of a name takes the exclusive
/// lock and constructs the library exactly once. Construction does no I/O, so
/// it cannot fail; filesystem errors surface from the library's operations.
pub struct LibraryRegistry {
    root: PathBuf,
    options: LibraryOptions,
    codec: Arc<dyn ImageCodecPort>,
    libraries: RwLock<HashMap<String, Arc<ImageLibrary>>>,
}

impl std::fmt::Debug for LibraryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryRegistry")
            .field("root", &self.root)
            .field("options", &self.options)
            .field("libraries", &self.names())
            .finish_non_exhaustive()
    }
}

impl LibraryRegistry {
    /// Creates a registry storing libraries under `root` with the PNG/JPEG codec.
    #[must_use]
    pub fn new(root: PathBuf, options: LibraryOptions) -> Self {
        Self::with_codec(root, options, Arc::new(StandardCodec::new()))
    }

    /// Creates a registry with a custom codec.
    #[must_use]
    pub fn with_codec(
        root: PathBuf,
        options: LibraryOptions,
        codec: Arc<dyn ImageCodecPort>,
    ) -> Self {
        info!(root = %root.display(), "Image library registry ready");
        Self {
            root,
            options,
            codec,
            libraries: RwLock::new(HashMap::new()),
        }
    }

    /// Root directory holding every library.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the library named `"Default"`.
    #[must_use]
    pub fn default_library(&self) -> Arc<ImageLibrary> {
        self.library_with_name(DEFAULT_LIBRARY_NAME)
    }

    /// Returns the library named `name`, creating it on first use.
    ///
    /// Concurrent callers asking for the same new name all receive the same instance.
    #[must_use]
    pub fn library_with_name(&self, name: &str) -> Arc<ImageLibrary> {
        if let Some(library) = self.libraries.read().get(name) {
            return library.clone();
        }

        let mut libraries = self.libraries.write();
        libraries
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(ImageLibrary::new(
                    name,
                    &self.root,
                    self.options,
                    self.codec.clone(),
                ))
            })
            .clone()
    }

    /// Names of every library created so far, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.libraries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of libraries created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.libraries.read().len()
    }

    /// Returns true if no library has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mock::MockImageCodec;
    use tempfile::TempDir;

    fn create_registry() -> (Arc<LibraryRegistry>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let registry = LibraryRegistry::with_codec(
            temp_dir.path().to_path_buf(),
            LibraryOptions::default(),
            Arc::new(MockImageCodec::new()),
        );
        (Arc::new(registry), temp_dir)
    }

    #[test]
    fn test_default_library() {
        let (registry, _temp) = create_registry();
        assert!(registry.is_empty());

        let library = registry.default_library();
        assert_eq!(library.name(), DEFAULT_LIBRARY_NAME);
        assert!(Arc::ptr_eq(&library, &registry.default_library()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_construction_is_lazy_on_disk() {
        let (registry, _temp) = create_registry();
        let library = registry.library_with_name("thumbs");
        assert!(!library.library_path().exists());
        assert!(library.library_path().starts_with(registry.root()));
    }

    #[test]
    fn test_concurrent_lookup_returns_same_instance() {
        let (registry, _temp) = create_registry();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.library_with_name("X"))
            })
            .collect();
        let libraries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(libraries.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.names(), vec!["X".to_string()]);
    }

    #[tokio::test]
    async fn test_libraries_are_isolated() {
        let (registry, _temp) = create_registry();
        let a = registry.library_with_name("A");
        let b = registry.library_with_name("B");

        a.set_image(image::DynamicImage::new_rgba8(2, 2), "shared", None)
            .wait()
            .await
            .unwrap()
            .unwrap();

        assert!(a.image_for_key("shared").await.is_some());
        assert!(b.image_for_key("shared").await.is_none());
        assert_ne!(a.path_for_key("shared"), b.path_for_key("shared"));

        b.remove_all_images().await.unwrap();
        assert!(a.image_for_key("shared").await.is_some());
    }
}
