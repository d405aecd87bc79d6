//! Imagevault - named image libraries.
//!
//! Each library pairs a bounded in-memory LRU cache of decoded images with a
//! directory on disk. Writes return immediately and are persisted by
//! background tasks; only the most recent write per key ever lands, and
//! removals cancel anything still in flight.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing codec, cache, disk and config adapters.
pub mod infrastructure;

pub use domain::{ImageKey, LibraryError, LibraryResult, StorageFormat};
pub use infrastructure::{ImageLibrary, LibraryOptions, LibraryRegistry, WriteHandle};

/// Current version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "imagevault";
