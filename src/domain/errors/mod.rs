//! Domain error types.

mod library_error;

pub use library_error::{LibraryError, LibraryResult, WriteFailure};
