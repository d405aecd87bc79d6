//! Library and key to on-disk path mapping.
//!
//! Layout:
//! ```text
//! <root>/<library dir>/<sha256(key)[..16] as hex>.<png|jpg>
//! ```

use std::path::{Path, PathBuf};

use crate::domain::entities::{ImageKey, StorageFormat};

/// Separator between a sanitized library name and its hash suffix.
/// Never produced by a verbatim name, so the two forms cannot collide.
const HASH_SEPARATOR: char = '~';

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// Returns the directory name used for a library.
///
/// Names made only of ASCII alphanumerics, `_`, `-` and `.` (and not starting
/// with `.`) are used verbatim. Anything else is sanitized and suffixed with a
/// short hash of the original name.
#[must_use]
pub fn library_dir_name(name: &str) -> String {
    if !name.is_empty() && !name.starts_with('.') && name.chars().all(is_safe_char) {
        return name.to_string();
    }

    let sanitized: String = name
        .chars()
        .enumerate()
        .map(|(i, c)| match c {
            '.' if i == 0 => '_',
            c if is_safe_char(c) => c,
            _ => '_',
        })
        .collect();
    let short_hash = &ImageKey::new(name).file_stem()[..8];
    format!("{sanitized}{HASH_SEPARATOR}{short_hash}")
}

/// Returns the root directory of a library under `root`.
#[must_use]
pub fn library_path(root: &Path, name: &str) -> PathBuf {
    root.join(library_dir_name(name))
}

/// Returns the file path for `key` stored in `format` inside `library_path`.
#[must_use]
pub fn image_path(library_path: &Path, key: &ImageKey, format: StorageFormat) -> PathBuf {
    library_path.join(format!("{}.{}", key.file_stem(), format.extension()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Default", "Default" ; "plain")]
    #[test_case("thumbs-v2.small", "thumbs-v2.small" ; "dash_and_dot")]
    #[test_case("user_avatars", "user_avatars" ; "underscore")]
    fn test_safe_names_are_verbatim(name: &str, expected: &str) {
        assert_eq!(library_dir_name(name), expected);
    }

    #[test_case("../escape" ; "parent_dir")]
    #[test_case("a/b" ; "separator")]
    #[test_case(".hidden" ; "leading_dot")]
    #[test_case("" ; "empty")]
    #[test_case("héllo wörld" ; "unicode_and_space")]
    fn test_unsafe_names_are_sanitized(name: &str) {
        let dir = library_dir_name(name);
        assert!(dir.contains(HASH_SEPARATOR));
        assert!(!dir.contains('/'));
        assert!(!dir.starts_with('.'));
    }

    #[test_case("../escape", "_._escape" ; "parent_dir")]
    #[test_case(".hidden", "_hidden" ; "leading_dot")]
    fn test_leading_dot_is_replaced(name: &str, prefix: &str) {
        let dir = library_dir_name(name);
        assert!(dir.starts_with(&format!("{prefix}{HASH_SEPARATOR}")));
    }

    #[test]
    fn test_sanitized_names_do_not_collide() {
        assert_ne!(library_dir_name("a/b"), library_dir_name("a b"));
    }

    #[test]
    fn test_image_path_layout() {
        let root = PathBuf::from("/cache");
        let lib = library_path(&root, "Default");
        let key = ImageKey::new("profile");

        let png = image_path(&lib, &key, StorageFormat::Lossless);
        let jpg = image_path(&lib, &key, StorageFormat::Lossy);

        assert_eq!(png.parent(), Some(Path::new("/cache/Default")));
        assert_eq!(png.extension().and_then(|e| e.to_str()), Some("png"));
        assert_eq!(jpg.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert_eq!(png.file_stem(), jpg.file_stem());
        assert_eq!(png, image_path(&lib, &key, StorageFormat::Lossless));
    }

    #[test]
    fn test_same_key_in_different_libraries_differs() {
        let root = PathBuf::from("/cache");
        let key = ImageKey::new("shared");
        assert_ne!(
            image_path(&library_path(&root, "A"), &key, StorageFormat::Lossy),
            image_path(&library_path(&root, "B"), &key, StorageFormat::Lossy)
        );
    }
}
