//! Port definition for image encoding and decoding.

use image::DynamicImage;

use crate::domain::entities::StorageFormat;
use crate::domain::errors::LibraryResult;

/// Port for converting between decoded images and stored bytes.
/// Implementations are called from blocking worker threads and must be thread-safe.
pub trait ImageCodecPort: Send + Sync {
    /// Encodes an image. `quality` is in `0.0..=1.0` and only applies to lossy output.
    fn encode(
        &self,
        image: &DynamicImage,
        format: StorageFormat,
        quality: f32,
    ) -> LibraryResult<Vec<u8>>;

    /// Decodes stored bytes back into an image.
    fn decode(&self, bytes: &[u8]) -> LibraryResult<DynamicImage>;
}
