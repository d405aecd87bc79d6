use super::app_config::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "imagevault",
    version,
    about = "Named image libraries with a memory cache and disk persistence",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Directory holding every library.
    #[arg(long, value_name = "PATH", env = "IMAGEVAULT_ROOT")]
    pub root_dir: Option<PathBuf>,

    /// JPEG quality for lossy writes (0.0 to 1.0).
    #[arg(long)]
    pub jpeg_quality: Option<f32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store an image file under a key.
    Put {
        /// Library name.
        library: String,
        /// Key to store the image under.
        key: String,
        /// Image file to read.
        file: PathBuf,
        /// Store as PNG.
        #[arg(long, conflicts_with = "lossy")]
        lossless: bool,
        /// Store as JPEG.
        #[arg(long)]
        lossy: bool,
    },
    /// Write a stored image out as PNG.
    Get {
        /// Library name.
        library: String,
        /// Key to look up.
        key: String,
        /// Where to write the image.
        output: PathBuf,
    },
    /// Print where a key is stored.
    Path {
        /// Library name.
        library: String,
        /// Key to look up.
        key: String,
    },
    /// Delete one image.
    Remove {
        /// Library name.
        library: String,
        /// Key to delete.
        key: String,
    },
    /// Delete every image in a library.
    Clear {
        /// Library name.
        library: String,
    },
}

impl Command {
    /// Library the command operates on.
    #[must_use]
    pub fn library(&self) -> &str {
        match self {
            Self::Put { library, .. }
            | Self::Get { library, .. }
            | Self::Path { library, .. }
            | Self::Remove { library, .. }
            | Self::Clear { library } => library,
        }
    }
}

/// Maps the `--lossless`/`--lossy` flags to an explicit choice, if any.
#[must_use]
pub const fn lossless_flag(lossless: bool, lossy: bool) -> Option<bool> {
    match (lossless, lossy) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(false, false, None ; "library_default")]
    #[test_case(true, false, Some(true) ; "lossless")]
    #[test_case(false, true, Some(false) ; "lossy")]
    fn test_lossless_flag(lossless: bool, lossy: bool, expected: Option<bool>) {
        assert_eq!(lossless_flag(lossless, lossy), expected);
    }

    #[test]
    fn test_parse_put() {
        let args = CliArgs::parse_from([
            "imagevault",
            "put",
            "Avatars",
            "user-1",
            "face.png",
            "--lossless",
        ]);
        assert_eq!(args.command.library(), "Avatars");
        match args.command {
            Command::Put {
                key, lossless, lossy, ..
            } => {
                assert_eq!(key, "user-1");
                assert!(lossless);
                assert!(!lossy);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_conflicting_format_flags_rejected() {
        let result = CliArgs::try_parse_from([
            "imagevault",
            "put",
            "A",
            "k",
            "f.png",
            "--lossless",
            "--lossy",
        ]);
        assert!(result.is_err());
    }
}
