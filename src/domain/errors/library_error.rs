//! Image library error types.

use std::sync::Arc;

use thiserror::Error;

/// Result type for library operations.
pub type LibraryResult<T> = std::result::Result<T, LibraryError>;

/// Errors surfaced by library operations.
///
/// Messages are carried as strings so errors can be cloned into
/// write outcomes and logged from background tasks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum LibraryError {
    #[error("image not found: {key}")]
    NotFound { key: String },

    #[error("failed to encode image: {message}")]
    Encode { message: String },

    #[error("failed to decode image: {message}")]
    Decode { message: String },

    #[error("io error: {message}")]
    Io { message: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl LibraryError {
    /// Creates not found error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates encode error.
    #[must_use]
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates io error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns whether the error means nothing is stored under the key.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns whether the error came from the codec rather than the filesystem.
    #[must_use]
    pub const fn is_codec_error(&self) -> bool {
        matches!(self, Self::Encode { .. } | Self::Decode { .. })
    }
}

/// A persist operation that did not land, with the image it was carrying.
#[derive(Debug, Clone, Error)]
#[error("failed to store image {key}: {error}")]
pub struct WriteFailure {
    /// Key of the failed write.
    pub key: String,
    /// The image the caller passed to `set_image`.
    pub image: Arc<image::DynamicImage>,
    /// What went wrong.
    #[source]
    pub error: LibraryError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(LibraryError::not_found("k").is_not_found());
        assert!(LibraryError::decode("bad header").is_codec_error());
        assert!(LibraryError::encode("unsupported").is_codec_error());
        assert!(!LibraryError::io("disk full").is_codec_error());
    }

    #[test]
    fn test_write_failure_message() {
        let failure = WriteFailure {
            key: "avatar".to_string(),
            image: Arc::new(image::DynamicImage::new_rgb8(1, 1)),
            error: LibraryError::io("permission denied"),
        };
        assert_eq!(
            failure.to_string(),
            "failed to store image avatar: io error: permission denied"
        );
    }
}
