//! On-disk layout of assets beneath the storage root

use std::path::{Path, PathBuf};

use crate::pyramid::PyramidHandle;

const UPLOADS_DIR: &str = "uploads";
const METADATA_DIR: &str = "metadata";
const PYRAMIDS_DIR: &str = "pyramids";
const STAGING_DIR: &str = "staging";

/// Longest accepted asset id
const MAX_ID_LEN: usize = 64;

/// Fallback extension for uploads whose filename carries none
const DEFAULT_SOURCE_EXTENSION: &str = "bin";

/// Derives every artifact path of an asset from its id
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    /// Directory served under `/pyramid-files`
    pub fn pyramids_dir(&self) -> PathBuf {
        self.root.join(PYRAMIDS_DIR)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// All directories the store expects to exist
    pub fn directories(&self) -> [PathBuf; 4] {
        [
            self.uploads_dir(),
            self.metadata_dir(),
            self.pyramids_dir(),
            self.staging_dir(),
        ]
    }

    pub fn source_path(&self, source_file: &str) -> PathBuf {
        self.uploads_dir().join(source_file)
    }

    pub fn metadata_path(&self, id: &str) -> PathBuf {
        self.metadata_dir().join(format!("{}.json", id))
    }

    /// Scratch file the metadata record is written to before being renamed into place
    pub fn metadata_tmp_path(&self, id: &str) -> PathBuf {
        self.metadata_dir().join(format!("{}.json.tmp", id))
    }

    /// Published pyramid location for `id`
    pub fn pyramid(&self, id: &str) -> PyramidHandle {
        PyramidHandle::from_prefix(&self.pyramids_dir().join(id))
    }

    /// Prefix handed to the generator; output is moved to `pyramid(id)` once complete
    pub fn staging_prefix(&self, id: &str) -> PathBuf {
        self.staging_dir().join(id)
    }
}

/// Name of the stored source file: the id plus the upload's extension
pub fn source_file_name(id: &str, original_filename: &str) -> String {
    let ext = Path::new(original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_SOURCE_EXTENSION.to_string());
    format!("{}.{}", id, ext)
}

/// Whether `id` is safe to embed in a storage path
pub fn is_valid_asset_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
