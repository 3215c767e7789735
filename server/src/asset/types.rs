//! Asset-related types and error definitions

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotation::Annotation;
use crate::pyramid::{OutputFormat, PyramidError, PyramidHandle};

/// Errors surfaced by the asset store and annotation manager
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Annotation '{annotation_id}' not found on asset {asset_id}")]
    AnnotationNotFound {
        asset_id: String,
        annotation_id: String,
    },

    #[error("Annotation '{annotation_id}' already exists on asset {asset_id}")]
    DuplicateAnnotation {
        asset_id: String,
        annotation_id: String,
    },

    #[error("Pyramid generation failed: {0}")]
    Generation(#[from] PyramidError),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Corrupt metadata record for asset {id}: {source}")]
    CorruptRecord {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Persisted metadata record, one JSON file per asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Display name supplied at upload, preserved verbatim
    pub original_name: String,
    #[serde(default)]
    pub output_format: OutputFormat,
    /// File name of the stored source bytes inside the uploads directory
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl AssetRecord {
    pub fn new(original_name: &str, output_format: OutputFormat, source_file: String) -> Self {
        Self {
            original_name: original_name.to_string(),
            output_format,
            source_file: Some(source_file),
            created_at: Some(Utc::now()),
            annotations: Vec::new(),
        }
    }
}

/// An asset as seen by callers of the store
#[derive(Debug, Clone)]
pub struct Asset {
    pub id: String,
    pub original_filename: String,
    pub source_path: Option<PathBuf>,
    pub output_format: OutputFormat,
    pub created_at: Option<DateTime<Utc>>,
    /// Present only when the pyramid is fully generated
    pub pyramid: Option<PyramidHandle>,
    pub annotations: Vec<Annotation>,
}

/// Listing entry for an asset with a complete pyramid
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSummary {
    pub id: String,
    pub display_name: String,
    /// Size of the uploaded source file
    pub size_bytes: u64,
    /// When the pyramid was published
    pub modified_time: DateTime<Utc>,
    #[serde(rename = "thumbnailURL")]
    pub thumbnail_url: Option<String>,
}
