//! Infrastructure layer with storage adapters.

/// Vault configuration.
pub mod config;
/// Image codec, caching and persistence.
pub mod image;
/// Named libraries and the registry.
pub mod library;

pub use config::{CliArgs, ConfigStore, LogLevel, VaultConfig};
pub use self::image::{
    CacheStats, DiskImageStore, MemoryImageCache, StandardCodec, WriteCoordinator, WriteHandle,
    WriteResult,
};
pub use library::{DEFAULT_LIBRARY_NAME, ImageLibrary, LibraryOptions, LibraryRegistry};
