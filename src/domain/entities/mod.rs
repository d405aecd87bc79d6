//! Domain entity definitions.

mod image;

pub use self::image::{ImageKey, ImageSource, LoadedImage, StorageFormat, StoredImage};
