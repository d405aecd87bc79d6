//! Domain layer with core types, errors, and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{ImageKey, ImageSource, LoadedImage, StorageFormat, StoredImage};
pub use errors::{LibraryError, LibraryResult, WriteFailure};
pub use ports::ImageCodecPort;
