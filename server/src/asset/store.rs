//! Asset store: owns every file an asset consists of
//!
//! The store is the only component that touches the storage root. Each asset id
//! maps to a source file, a JSON metadata record and a published pyramid. All
//! metadata mutations run under the per-asset lock from [`AssetLocks`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::pyramid::{DESCRIPTOR_EXTENSION, OutputFormat, PyramidGenerator, PyramidHandle};

use super::layout::{StorageLayout, is_valid_asset_id, source_file_name};
use super::locks::AssetLocks;
use super::thumbnail::find_thumbnail;
use super::types::{Asset, AssetError, AssetRecord, AssetSummary};

/// Route prefix under which the pyramids directory is served
pub const PYRAMID_FILES_ROUTE: &str = "/pyramid-files";

pub struct AssetStore {
    layout: StorageLayout,
    generator: Arc<dyn PyramidGenerator>,
    locks: AssetLocks,
    public_base_url: Option<String>,
    sample_id: Option<String>,
}

impl AssetStore {
    pub fn new(layout: StorageLayout, generator: Arc<dyn PyramidGenerator>) -> Self {
        Self {
            layout,
            generator,
            locks: AssetLocks::new(),
            public_base_url: None,
            sample_id: None,
        }
    }

    pub fn with_public_base_url(mut self, url: Option<String>) -> Self {
        self.public_base_url = url;
        self
    }

    /// Id of the pre-provisioned sample asset, used when no id is given
    pub fn with_sample_id(mut self, id: Option<String>) -> Self {
        self.sample_id = id;
        self
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Create the storage directories and discard anything an interrupted run left behind
    ///
    /// Must run before the store is shared: it assumes no operation is in flight.
    pub async fn init(&self) -> Result<(), AssetError> {
        for dir in self.layout.directories() {
            tokio::fs::create_dir_all(&dir).await?;
        }

        // Staging output never survives a restart
        let mut staged = tokio::fs::read_dir(self.layout.staging_dir()).await?;
        while let Some(entry) = staged.next_entry().await? {
            warn!("Removing stale staging output {:?}", entry.path());
            remove_any(&entry.path()).await?;
        }

        let mut records = tokio::fs::read_dir(self.layout.metadata_dir()).await?;
        while let Some(entry) = records.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".json.tmp") {
                warn!("Removing partial metadata write {:?}", path);
                remove_file_if_exists(&path).await?;
                continue;
            }
            let Some(id) = record_id(&path) else {
                continue;
            };
            if !self.layout.pyramid(&id).check_complete().await {
                warn!("Rolling back asset {} left without a complete pyramid", id);
                self.remove_artifacts(&id).await?;
                remove_file_if_exists(&self.layout.metadata_path(&id)).await?;
            }
        }

        info!("Asset store ready at {:?}", self.layout.root());
        Ok(())
    }

    /// Store an upload under a fresh id and generate its pyramid
    pub async fn create(
        &self,
        source_bytes: &[u8],
        original_filename: &str,
        output_format: OutputFormat,
    ) -> Result<Asset, AssetError> {
        if original_filename.trim().is_empty() {
            return Err(AssetError::Validation("Missing file name".to_string()));
        }
        if source_bytes.is_empty() {
            return Err(AssetError::Validation("Uploaded file is empty".to_string()));
        }

        let mut id = new_asset_id();
        while tokio::fs::try_exists(self.layout.metadata_path(&id)).await? {
            id = new_asset_id();
        }

        self.create_with_id(&id, source_bytes, original_filename, output_format)
            .await
    }

    async fn create_with_id(
        &self,
        id: &str,
        source_bytes: &[u8],
        original_filename: &str,
        output_format: OutputFormat,
    ) -> Result<Asset, AssetError> {
        let _guard = self.locks.lock(id).await;
        counter!("dzi_uploads_total", "format" => output_format.as_str()).increment(1);

        let source_file = source_file_name(id, original_filename);
        let source_path = self.layout.source_path(&source_file);
        let record = AssetRecord::new(original_filename, output_format, source_file);

        // Source first: the record is the commit point that makes the asset visible to `get`
        if let Err(e) = self
            .persist_upload(id, &source_path, source_bytes, &record)
            .await
        {
            error!("Failed to persist upload {}: {}", id, e);
            self.rollback(id).await;
            counter!("dzi_upload_failures_total", "reason" => "storage").increment(1);
            return Err(e);
        }
        debug!(
            "Stored source for asset {} ({} bytes) at {:?}",
            id,
            source_bytes.len(),
            source_path
        );

        let staging_prefix = self.layout.staging_prefix(id);
        let staged = match self
            .generator
            .generate(&source_path, &staging_prefix, output_format)
            .await
        {
            Ok(staged) => staged,
            Err(e) => {
                warn!("Pyramid generation failed for asset {}: {}", id, e);
                self.rollback(id).await;
                counter!("dzi_upload_failures_total", "reason" => "generation").increment(1);
                return Err(AssetError::Generation(e));
            }
        };

        let pyramid = match self.publish(id, &staged).await {
            Ok(pyramid) => pyramid,
            Err(e) => {
                error!("Failed to publish pyramid for asset {}: {}", id, e);
                self.rollback(id).await;
                counter!("dzi_upload_failures_total", "reason" => "storage").increment(1);
                return Err(e);
            }
        };

        info!(
            "Created asset {} ('{}', format={})",
            id, original_filename, output_format
        );

        Ok(Asset {
            id: id.to_string(),
            original_filename: record.original_name,
            source_path: Some(source_path),
            output_format,
            created_at: record.created_at,
            pyramid: Some(pyramid),
            annotations: record.annotations,
        })
    }

    /// Summaries of every asset with a complete pyramid, newest first
    pub async fn list(&self) -> Result<Vec<AssetSummary>, AssetError> {
        let layout = self.layout.clone();
        let base_url = self.public_base_url.clone();

        let summaries = tokio::task::spawn_blocking(move || scan_summaries(&layout, &base_url))
            .await
            .map_err(|e| AssetError::Storage(std::io::Error::other(e)))??;

        gauge!("dzi_assets_listed").set(summaries.len() as f64);
        Ok(summaries)
    }

    pub async fn get(&self, id: &str) -> Result<Asset, AssetError> {
        let record = self.read_record(id).await?;
        let pyramid = self.layout.pyramid(id);
        let complete = pyramid.check_complete().await;
        let source_path = record
            .source_file
            .as_deref()
            .map(|file| self.layout.source_path(file));

        Ok(Asset {
            id: id.to_string(),
            original_filename: record.original_name,
            source_path,
            output_format: record.output_format,
            created_at: record.created_at,
            pyramid: complete.then_some(pyramid),
            annotations: record.annotations,
        })
    }

    /// Remove the source file, pyramid and metadata record of `id`
    ///
    /// Missing artifacts are skipped. The record is removed last, so a failed
    /// delete can be retried.
    pub async fn delete(&self, id: &str) -> Result<(), AssetError> {
        if !is_valid_asset_id(id) {
            return Err(AssetError::NotFound(id.to_string()));
        }

        let _guard = self.locks.lock(id).await;
        let metadata_path = self.layout.metadata_path(id);
        if !tokio::fs::try_exists(&metadata_path).await? {
            return Err(AssetError::NotFound(id.to_string()));
        }

        self.remove_artifacts(id).await?;
        remove_file_if_exists(&metadata_path).await?;

        counter!("dzi_assets_deleted_total").increment(1);
        info!("Deleted asset {}", id);
        Ok(())
    }

    /// Load the metadata record of `id`
    pub async fn read_record(&self, id: &str) -> Result<AssetRecord, AssetError> {
        if !is_valid_asset_id(id) {
            return Err(AssetError::NotFound(id.to_string()));
        }

        let bytes = match tokio::fs::read(self.layout.metadata_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AssetError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes).map_err(|source| AssetError::CorruptRecord {
            id: id.to_string(),
            source,
        })
    }

    /// Read-modify-write the record of `id` under its lock
    ///
    /// Nothing is written when `mutate` returns an error.
    pub async fn mutate_record<T, F>(&self, id: &str, mutate: F) -> Result<T, AssetError>
    where
        F: FnOnce(&mut AssetRecord) -> Result<T, AssetError>,
    {
        if !is_valid_asset_id(id) {
            return Err(AssetError::NotFound(id.to_string()));
        }

        let _guard = self.locks.lock(id).await;
        let mut record = self.read_record(id).await?;
        let result = mutate(&mut record)?;
        self.write_record(id, &record).await?;
        Ok(result)
    }

    /// Resolve the asset served when no id is given
    ///
    /// The sample asset wins when its pyramid is complete; otherwise the most
    /// recently published asset is used.
    pub async fn resolve_default(&self) -> Result<Asset, AssetError> {
        if let Some(sample_id) = &self.sample_id {
            match self.get(sample_id).await {
                Ok(asset) if asset.pyramid.is_some() => return Ok(asset),
                Ok(_) | Err(AssetError::NotFound(_)) => {}
                Err(e) => warn!("Sample asset {} unreadable: {}", sample_id, e),
            }
        }

        let latest = self
            .list()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AssetError::NotFound("default".to_string()))?;
        self.get(&latest.id).await
    }

    /// Create the sample asset from `path` unless it already has a complete pyramid
    ///
    /// Returns `Ok(None)` when no sample id is configured, the file is absent, or
    /// the sample is already provisioned.
    pub async fn provision_sample(
        &self,
        path: &Path,
        output_format: OutputFormat,
    ) -> Result<Option<Asset>, AssetError> {
        let Some(sample_id) = self.sample_id.clone() else {
            return Ok(None);
        };
        if !is_valid_asset_id(&sample_id) {
            return Err(AssetError::Validation(format!(
                "Invalid sample asset id '{}'",
                sample_id
            )));
        }
        if !tokio::fs::try_exists(path).await? {
            info!("No sample image at {:?}, skipping sample asset", path);
            return Ok(None);
        }

        match self.get(&sample_id).await {
            Ok(asset) if asset.pyramid.is_some() => {
                debug!("Sample asset {} already provisioned", sample_id);
                return Ok(None);
            }
            Ok(_) => self.delete(&sample_id).await?,
            Err(AssetError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| sample_id.clone());

        info!("Provisioning sample asset {} from {:?}", sample_id, path);
        self.create_with_id(&sample_id, &bytes, &name, output_format)
            .await
            .map(Some)
    }

    /// Public URL of the descriptor for `id`
    pub fn pyramid_url(&self, id: &str) -> String {
        file_url(
            &self.public_base_url,
            &format!("{}.{}", id, DESCRIPTOR_EXTENSION),
        )
    }

    async fn persist_upload(
        &self,
        id: &str,
        source_path: &Path,
        source_bytes: &[u8],
        record: &AssetRecord,
    ) -> Result<(), AssetError> {
        tokio::fs::write(source_path, source_bytes).await?;
        self.write_record(id, record).await
    }

    async fn write_record(&self, id: &str, record: &AssetRecord) -> Result<(), AssetError> {
        let bytes = serde_json::to_vec_pretty(record).map_err(std::io::Error::other)?;
        let tmp = self.layout.metadata_tmp_path(id);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, self.layout.metadata_path(id)).await?;
        Ok(())
    }

    /// Move a staged pyramid into the served directory; the descriptor goes last
    async fn publish(&self, id: &str, staged: &PyramidHandle) -> Result<PyramidHandle, AssetError> {
        let target = self.layout.pyramid(id);
        remove_file_if_exists(&target.descriptor).await?;
        remove_dir_if_exists(&target.tiles_dir).await?;

        tokio::fs::rename(&staged.tiles_dir, &target.tiles_dir).await?;
        tokio::fs::rename(&staged.descriptor, &target.descriptor).await?;
        Ok(target)
    }

    /// Remove source, pyramid and staging output of `id`, attempting every artifact
    async fn remove_artifacts(&self, id: &str) -> Result<(), AssetError> {
        let pyramid = self.layout.pyramid(id);
        let staged = PyramidHandle::from_prefix(&self.layout.staging_prefix(id));

        let mut first_error: Option<std::io::Error> = None;
        let mut note = |result: std::io::Result<bool>, what: &Path| {
            if let Err(e) = result {
                error!("Failed to remove {:?} for asset {}: {}", what, id, e);
                first_error.get_or_insert(e);
            }
        };

        match self.source_files(id).await {
            Ok(sources) => {
                for source in sources {
                    note(remove_file_if_exists(&source).await, &source);
                }
            }
            Err(e) => note(Err(e), &self.layout.uploads_dir()),
        }
        // Descriptor first so the pyramid stops counting as complete immediately
        note(
            remove_file_if_exists(&pyramid.descriptor).await,
            &pyramid.descriptor,
        );
        note(
            remove_dir_if_exists(&pyramid.tiles_dir).await,
            &pyramid.tiles_dir,
        );
        note(
            remove_file_if_exists(&staged.descriptor).await,
            &staged.descriptor,
        );
        note(
            remove_dir_if_exists(&staged.tiles_dir).await,
            &staged.tiles_dir,
        );

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Undo a failed create; errors are logged, the original failure is what callers see
    async fn rollback(&self, id: &str) {
        if let Err(e) = self.remove_artifacts(id).await {
            error!("Rollback of asset {} left artifacts behind: {}", id, e);
        }
        if let Err(e) = remove_file_if_exists(&self.layout.metadata_tmp_path(id)).await {
            error!("Failed to remove temp record for {}: {}", id, e);
        }
        if let Err(e) = remove_file_if_exists(&self.layout.metadata_path(id)).await {
            error!("Failed to remove record for {}: {}", id, e);
        }
    }

    /// Every uploaded file whose stem is `id`, so corrupt records still clean up
    async fn source_files(&self, id: &str) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(self.layout.uploads_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(id) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

fn new_asset_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Asset id of a `metadata/<id>.json` path
fn record_id(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|id| is_valid_asset_id(id))
        .map(str::to_string)
}

fn file_url(base_url: &Option<String>, relative: &str) -> String {
    format!(
        "{}{}/{}",
        base_url.as_deref().unwrap_or(""),
        PYRAMID_FILES_ROUTE,
        relative
    )
}

/// Build listing entries; runs on the blocking pool
fn scan_summaries(
    layout: &StorageLayout,
    base_url: &Option<String>,
) -> Result<Vec<AssetSummary>, AssetError> {
    let mut summaries = Vec::new();
    let pyramids_dir = layout.pyramids_dir();

    for entry in std::fs::read_dir(layout.metadata_dir())?.flatten() {
        let path = entry.path();
        let Some(id) = record_id(&path) else {
            continue;
        };

        let pyramid = layout.pyramid(&id);
        if !pyramid.is_complete() {
            debug!("Skipping asset {} without a complete pyramid", id);
            continue;
        }

        let record: AssetRecord = match std::fs::read(&path)
            .map_err(AssetError::from)
            .and_then(|bytes| {
                serde_json::from_slice(&bytes).map_err(|source| AssetError::CorruptRecord {
                    id: id.clone(),
                    source,
                })
            }) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable record {:?}: {}", path, e);
                continue;
            }
        };

        let size_bytes = record
            .source_file
            .as_deref()
            .and_then(|file| std::fs::metadata(layout.source_path(file)).ok())
            .map(|m| m.len())
            .unwrap_or(0);

        let modified_time: DateTime<Utc> = std::fs::metadata(&pyramid.descriptor)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH)
            .into();

        let thumbnail_url = find_thumbnail(&pyramid).and_then(|tile| {
            let relative = tile.strip_prefix(&pyramids_dir).ok()?;
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            Some(file_url(base_url, &relative))
        });

        summaries.push(AssetSummary {
            id,
            display_name: record.original_name,
            size_bytes,
            modified_time,
            thumbnail_url,
        });
    }

    summaries.sort_by(|a, b| {
        b.modified_time
            .cmp(&a.modified_time)
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(summaries)
}

async fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

async fn remove_dir_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

async fn remove_any(path: &Path) -> std::io::Result<bool> {
    if tokio::fs::metadata(path).await?.is_dir() {
        remove_dir_if_exists(path).await
    } else {
        remove_file_if_exists(path).await
    }
}
