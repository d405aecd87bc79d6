//! Vault configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::errors::{LibraryError, LibraryResult};
use crate::infrastructure::image::{
    DEFAULT_JPEG_QUALITY, DEFAULT_MAX_CONCURRENT_WRITES, DEFAULT_MEMORY_BUDGET,
};
use crate::infrastructure::library::LibraryOptions;

const APP_NAME: &str = "imagevault";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";

const BYTES_PER_MB: usize = 1024 * 1024;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Vault configuration loaded from `config.toml`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path. Logs go to stderr when unset.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory holding every library. Defaults to the user cache directory.
    #[serde(default)]
    pub root_dir: Option<PathBuf>,

    /// Library defaults.
    #[serde(default)]
    pub library: LibraryConfig,
}

/// Defaults applied to every library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Store as PNG unless told otherwise.
    #[serde(default)]
    pub default_lossless: bool,

    /// JPEG quality, `0.0` to `1.0`.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: f32,

    /// Decoded image budget per library, in megabytes.
    #[serde(default = "default_memory_budget_mb")]
    pub memory_budget_mb: usize,

    /// Background writes running at once per library.
    #[serde(default = "default_max_concurrent_writes")]
    pub max_concurrent_writes: usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            default_lossless: false,
            jpeg_quality: default_jpeg_quality(),
            memory_budget_mb: default_memory_budget_mb(),
            max_concurrent_writes: default_max_concurrent_writes(),
        }
    }
}

impl LibraryConfig {
    /// Converts to the options libraries are built with.
    ///
    /// # Errors
    /// Returns `Config` if `jpeg_quality` is outside `0.0..=1.0` or no
    /// concurrent writes are allowed.
    pub fn to_options(&self) -> LibraryResult<LibraryOptions> {
        if !(0.0..=1.0).contains(&self.jpeg_quality) {
            return Err(LibraryError::config(format!(
                "jpeg_quality must be between 0.0 and 1.0, got {}",
                self.jpeg_quality
            )));
        }
        if self.max_concurrent_writes == 0 {
            return Err(LibraryError::config(
                "max_concurrent_writes must be at least 1",
            ));
        }

        Ok(LibraryOptions {
            default_lossless: self.default_lossless,
            jpeg_quality: self.jpeg_quality,
            memory_budget: self.memory_budget_mb.saturating_mul(BYTES_PER_MB),
            max_concurrent_writes: self.max_concurrent_writes,
        })
    }
}

fn default_jpeg_quality() -> f32 {
    DEFAULT_JPEG_QUALITY
}

fn default_memory_budget_mb() -> usize {
    DEFAULT_MEMORY_BUDGET / BYTES_PER_MB
}

fn default_max_concurrent_writes() -> usize {
    DEFAULT_MAX_CONCURRENT_WRITES
}

use super::args::CliArgs;

impl VaultConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(root_dir) = &args.root_dir {
            self.root_dir = Some(root_dir.clone());
        }
        if let Some(quality) = args.jpeg_quality {
            self.library.jpeg_quality = quality;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default root directory for libraries.
    #[must_use]
    pub fn default_root_dir() -> PathBuf {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME).map_or_else(
            || std::env::temp_dir().join(APP_NAME).join("libraries"),
            |dirs| dirs.cache_dir().join("libraries"),
        )
    }

    /// Returns effective root directory.
    #[must_use]
    pub fn effective_root_dir(&self) -> PathBuf {
        self.root_dir.clone().unwrap_or_else(Self::default_root_dir)
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            root_dir: None,
            library: LibraryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use test_case::test_case;

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
            root_dir = "/srv/images"
            log_level = "debug"

            [library]
            default_lossless = true
            jpeg_quality = 0.5
        "#;

        let config: VaultConfig = toml::from_str(toml_content).expect("Failed to parse config");

        assert_eq!(config.effective_root_dir(), PathBuf::from("/srv/images"));
        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(config.library.default_lossless);
        assert!((config.library.jpeg_quality - 0.5).abs() < f32::EPSILON);
        assert_eq!(
            config.library.max_concurrent_writes,
            DEFAULT_MAX_CONCURRENT_WRITES
        );
    }

    #[test]
    fn test_default_config() {
        let config = VaultConfig::default();
        let options = config.library.to_options().unwrap();

        assert!(config.root_dir.is_none());
        assert!(!options.default_lossless);
        assert_eq!(options.memory_budget, DEFAULT_MEMORY_BUDGET);
    }

    #[test]
    fn test_args_override_file() {
        let mut config: VaultConfig = toml::from_str("root_dir = \"/from/file\"").unwrap();
        let args = CliArgs::parse_from([
            "imagevault",
            "--root-dir",
            "/from/cli",
            "--jpeg-quality",
            "0.3",
            "clear",
            "Default",
        ]);

        config.merge_with_args(&args);

        assert_eq!(config.effective_root_dir(), PathBuf::from("/from/cli"));
        assert!((config.library.jpeg_quality - 0.3).abs() < f32::EPSILON);
    }

    #[test_case(f32::NAN, 4 ; "nan_quality")]
    #[test_case(1.5, 4 ; "quality_above_one")]
    #[test_case(-0.1, 4 ; "negative_quality")]
    #[test_case(0.8, 0 ; "no_writers")]
    fn test_invalid_library_config_is_rejected(jpeg_quality: f32, max_concurrent_writes: usize) {
        let config = LibraryConfig {
            jpeg_quality,
            max_concurrent_writes,
            ..LibraryConfig::default()
        };

        let err = config.to_options().unwrap_err();
        assert!(matches!(err, LibraryError::Config { .. }));
    }
}
