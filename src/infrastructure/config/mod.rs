//! Vault configuration.

pub mod app_config;
pub mod args;
pub mod storage;

pub use app_config::{LibraryConfig, LogLevel, VaultConfig};
pub use args::{CliArgs, Command};
pub use storage::{ConfigError, ConfigStore};
