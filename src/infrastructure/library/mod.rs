//! Named image libraries and their registry.

pub mod image_library;
pub mod registry;

pub use image_library::{ImageLibrary, LibraryOptions};
pub use registry::{DEFAULT_LIBRARY_NAME, LibraryRegistry};
