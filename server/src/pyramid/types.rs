//! Pyramid-related types and error definitions

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Extension of the Deep Zoom descriptor written next to the tile tree
pub const DESCRIPTOR_EXTENSION: &str = "dzi";

/// Suffix appended to the destination prefix for the tile directory tree
pub const TILES_DIR_SUFFIX: &str = "_files";

/// Errors that can occur while generating a pyramid
#[derive(Debug, Error)]
pub enum PyramidError {
    #[error("Failed to launch tiler {binary:?}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Tiler exited with status {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Tiler timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Tiler reported success but produced no complete pyramid at {0:?}")]
    IncompleteOutput(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Tile encoding chosen at upload time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// The tiler's own default codec and quality
    #[default]
    Default,
    /// JPEG tiles at the configured quality
    Jpeg,
    /// Lossy WebP tiles at the configured quality
    Webp,
    /// Lossless PNG tiles
    Png,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [Self::Default, Self::Jpeg, Self::Webp, Self::Png];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
            Self::Png => "png",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    /// Parse a user-supplied format name; an empty string selects the default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(Self::Default),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            "png" => Ok(Self::Png),
            other => Err(format!(
                "Unsupported output format '{}' (expected one of: default, jpeg, webp, png)",
                other
            )),
        }
    }
}

/// Location of a generated pyramid: `<prefix>.dzi` plus `<prefix>_files/<level>/...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyramidHandle {
    pub descriptor: PathBuf,
    pub tiles_dir: PathBuf,
}

impl PyramidHandle {
    /// Derive descriptor and tile directory paths from a destination prefix
    pub fn from_prefix(prefix: &Path) -> Self {
        Self {
            descriptor: with_suffix(prefix, &format!(".{}", DESCRIPTOR_EXTENSION)),
            tiles_dir: with_suffix(prefix, TILES_DIR_SUFFIX),
        }
    }

    /// True when the descriptor exists and at least one level directory holds a tile
    pub fn is_complete(&self) -> bool {
        if !self.descriptor.is_file() {
            return false;
        }

        let Ok(levels) = std::fs::read_dir(&self.tiles_dir) else {
            return false;
        };

        levels.flatten().any(|level| {
            level.path().is_dir()
                && std::fs::read_dir(level.path())
                    .map(|mut tiles| tiles.any(|t| t.map(|t| t.path().is_file()).unwrap_or(false)))
                    .unwrap_or(false)
        })
    }

    /// [`PyramidHandle::is_complete`] run on the blocking pool
    pub async fn check_complete(&self) -> bool {
        let handle = self.clone();
        tokio::task::spawn_blocking(move || handle.is_complete())
            .await
            .unwrap_or(false)
    }
}

/// Append a raw suffix to the final path component (`a/b` + `.dzi` -> `a/b.dzi`)
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("".parse::<OutputFormat>(), Ok(OutputFormat::Default));
        assert_eq!("WebP".parse::<OutputFormat>(), Ok(OutputFormat::Webp));
        assert_eq!("jpg".parse::<OutputFormat>(), Ok(OutputFormat::Jpeg));
        assert!("tiff".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_output_format_serde_names() {
        let json = serde_json::to_string(&OutputFormat::Webp).unwrap();
        assert_eq!(json, "\"webp\"");
        for format in OutputFormat::ALL {
            assert_eq!(format.as_str().parse::<OutputFormat>(), Ok(format));
        }
    }

    #[test]
    fn test_handle_from_prefix() {
        let handle = PyramidHandle::from_prefix(Path::new("/data/pyramids/abc"));
        assert_eq!(handle.descriptor, PathBuf::from("/data/pyramids/abc.dzi"));
        assert_eq!(handle.tiles_dir, PathBuf::from("/data/pyramids/abc_files"));
    }

    #[test]
    fn test_is_complete_requires_descriptor_and_tile() {
        let dir = tempfile::tempdir().unwrap();
        let handle = PyramidHandle::from_prefix(&dir.path().join("img"));
        assert!(!handle.is_complete());

        fs::write(&handle.descriptor, "<Image/>").unwrap();
        assert!(!handle.is_complete());

        fs::create_dir_all(handle.tiles_dir.join("0")).unwrap();
        assert!(!handle.is_complete());

        fs::write(handle.tiles_dir.join("0").join("0_0.jpeg"), b"x").unwrap();
        assert!(handle.is_complete());
    }

    #[tokio::test]
    async fn test_check_complete_matches_blocking_check() {
        let dir = tempfile::tempdir().unwrap();
        let handle = PyramidHandle::from_prefix(&dir.path().join("img"));
        assert!(!handle.check_complete().await);

        fs::create_dir_all(handle.tiles_dir.join("3")).unwrap();
        fs::write(handle.tiles_dir.join("3").join("0_0.png"), b"x").unwrap();
        fs::write(&handle.descriptor, "<Image/>").unwrap();
        assert!(handle.check_complete().await);
    }
}
