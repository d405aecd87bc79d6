//! PNG/JPEG codec backed by the `image` crate.

use std::io::Cursor;

use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;

use crate::domain::entities::StorageFormat;
use crate::domain::errors::{LibraryError, LibraryResult};
use crate::domain::ports::ImageCodecPort;

/// Default JPEG quality, as a fraction.
pub const DEFAULT_JPEG_QUALITY: f32 = 0.8;

/// Encodes lossless images as PNG and lossy images as JPEG.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCodec;

impl StandardCodec {
    /// Creates a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Maps a `0.0..=1.0` quality to the encoder's `1..=100` scale.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn jpeg_quality_percent(quality: f32) -> u8 {
    let quality = if quality.is_nan() { DEFAULT_JPEG_QUALITY } else { quality };
    ((quality.clamp(0.0, 1.0) * 100.0).round() as u8).max(1)
}

impl ImageCodecPort for StandardCodec {
    fn encode(
        &self,
        image: &DynamicImage,
        format: StorageFormat,
        quality: f32,
    ) -> LibraryResult<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        match format {
            StorageFormat::Lossless => image
                .write_to(&mut buffer, image::ImageFormat::Png)
                .map_err(|e| LibraryError::encode(format!("PNG: {e}")))?,
            StorageFormat::Lossy => {
                // JPEG has no alpha channel.
                let rgb = image.to_rgb8();
                let mut encoder =
                    JpegEncoder::new_with_quality(&mut buffer, jpeg_quality_percent(quality));
                encoder
                    .encode_image(&rgb)
                    .map_err(|e| LibraryError::encode(format!("JPEG: {e}")))?;
            }
        }
        Ok(buffer.into_inner())
    }

    fn decode(&self, bytes: &[u8]) -> LibraryResult<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| LibraryError::decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        let buffer = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x * 16) as u8, (y * 16) as u8, 128, 255])
        });
        DynamicImage::ImageRgba8(buffer)
    }

    #[test_case(0.0, 1 ; "zero_clamps_to_one")]
    #[test_case(0.8, 80 ; "default")]
    #[test_case(1.0, 100 ; "max")]
    #[test_case(7.5, 100 ; "above_range")]
    #[test_case(-1.0, 1 ; "below_range")]
    fn test_quality_mapping(input: f32, expected: u8) {
        assert_eq!(jpeg_quality_percent(input), expected);
    }

    #[test]
    fn test_png_preserves_pixels() {
        let codec = StandardCodec::new();
        let original = gradient(8, 8);

        let bytes = codec
            .encode(&original, StorageFormat::Lossless, 1.0)
            .unwrap();
        assert_eq!(&bytes[1..4], b"PNG");

        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.to_rgba8(), original.to_rgba8());
    }

    #[test]
    fn test_jpeg_output_decodes_with_same_dimensions() {
        let codec = StandardCodec::new();
        let original = gradient(16, 12);

        let bytes = codec.encode(&original, StorageFormat::Lossy, 0.5).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 12));
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let codec = StandardCodec::new();
        let err = codec.decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, LibraryError::Decode { .. }));
    }
}
