//! Test Utilities Module
//!
//! Fixtures shared by unit tests: a temporary store and generator doubles that
//! never spawn the real tiler. Only compiled when running tests.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::asset::{AssetStore, StorageLayout};
use crate::pyramid::{OutputFormat, PyramidError, PyramidGenerator, PyramidHandle};

/// Levels the fake generator writes tiles for
pub const FAKE_LEVELS: &[u32] = &[0, 8, 9];

/// Writes a minimal pyramid: a descriptor plus one tile per level in [`FAKE_LEVELS`]
pub struct FakeGenerator;

impl FakeGenerator {
    pub fn tile_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Default | OutputFormat::Jpeg => "jpeg",
            OutputFormat::Webp => "webp",
            OutputFormat::Png => "png",
        }
    }
}

#[async_trait]
impl PyramidGenerator for FakeGenerator {
    async fn generate(
        &self,
        source: &Path,
        destination_prefix: &Path,
        format: OutputFormat,
    ) -> Result<PyramidHandle, PyramidError> {
        // Mirror the real tool, which fails on a missing input
        tokio::fs::metadata(source).await?;

        let handle = PyramidHandle::from_prefix(destination_prefix);
        let ext = Self::tile_extension(format);
        for level in FAKE_LEVELS {
            let level_dir = handle.tiles_dir.join(level.to_string());
            tokio::fs::create_dir_all(&level_dir).await?;
            tokio::fs::write(level_dir.join(format!("0_0.{}", ext)), b"tile").await?;
        }
        tokio::fs::write(
            &handle.descriptor,
            format!(r#"<Image Format="{}" Overlap="1" TileSize="254"/>"#, ext),
        )
        .await?;
        Ok(handle)
    }
}

/// Always exits as if the tiler returned a nonzero status
pub struct FailingGenerator;

#[async_trait]
impl PyramidGenerator for FailingGenerator {
    async fn generate(
        &self,
        _source: &Path,
        _destination_prefix: &Path,
        _format: OutputFormat,
    ) -> Result<PyramidHandle, PyramidError> {
        Err(PyramidError::Failed {
            status: "exit status: 1".to_string(),
            stderr: "VipsForeignLoad: file is not a known image format".to_string(),
        })
    }
}

/// A store rooted in a temporary directory with all storage directories created
pub struct StoreFixture {
    pub dir: TempDir,
    pub store: Arc<AssetStore>,
}

impl StoreFixture {
    pub fn new(generator: Arc<dyn PyramidGenerator>) -> Self {
        Self::build(generator, None)
    }

    pub fn with_sample(generator: Arc<dyn PyramidGenerator>, sample_id: &str) -> Self {
        Self::build(generator, Some(sample_id.to_string()))
    }

    fn build(generator: Arc<dyn PyramidGenerator>, sample_id: Option<String>) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let layout = StorageLayout::new(dir.path().join("data"));
        for d in layout.directories() {
            std::fs::create_dir_all(d).expect("Failed to create storage dir");
        }
        let store = AssetStore::new(layout, generator).with_sample_id(sample_id);
        Self {
            dir,
            store: Arc::new(store),
        }
    }
}
