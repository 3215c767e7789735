//! Annotation manager: CRUD over an asset's annotation list
//!
//! Every operation loads the asset's record, edits the list and writes it back
//! under the asset lock held by [`AssetStore::mutate_record`].

use std::sync::Arc;

use metrics::counter;
use serde_json::{Map, Value};
use tracing::debug;

use crate::asset::{AssetError, AssetStore};

use super::types::{Annotation, AnnotationPatch};

pub struct AnnotationManager {
    store: Arc<AssetStore>,
}

impl AnnotationManager {
    pub fn new(store: Arc<AssetStore>) -> Self {
        Self { store }
    }

    /// Append an annotation; a missing id is generated, an existing one is rejected
    pub async fn add(
        &self,
        asset_id: &str,
        document: Map<String, Value>,
    ) -> Result<Annotation, AssetError> {
        let annotation = Annotation::from_document(document).map_err(AssetError::Validation)?;

        let added = self
            .store
            .mutate_record(asset_id, |record| {
                if record.annotations.iter().any(|a| a.id == annotation.id) {
                    return Err(AssetError::DuplicateAnnotation {
                        asset_id: asset_id.to_string(),
                        annotation_id: annotation.id.clone(),
                    });
                }
                record.annotations.push(annotation.clone());
                Ok(annotation)
            })
            .await?;

        counter!("dzi_annotation_mutations_total", "op" => "add").increment(1);
        debug!("Added annotation {} to asset {}", added.id, asset_id);
        Ok(added)
    }

    /// Annotations of an asset in insertion order
    pub async fn list(&self, asset_id: &str) -> Result<Vec<Annotation>, AssetError> {
        Ok(self.store.read_record(asset_id).await?.annotations)
    }

    /// Shallow-merge `patch` into the first annotation with `annotation_id`
    pub async fn update(
        &self,
        asset_id: &str,
        annotation_id: &str,
        patch: &AnnotationPatch,
    ) -> Result<Annotation, AssetError> {
        let updated = self
            .store
            .mutate_record(asset_id, |record| {
                let annotation = record
                    .annotations
                    .iter_mut()
                    .find(|a| a.id == annotation_id)
                    .ok_or_else(|| AssetError::AnnotationNotFound {
                        asset_id: asset_id.to_string(),
                        annotation_id: annotation_id.to_string(),
                    })?;
                annotation.merge(patch);
                Ok(annotation.clone())
            })
            .await?;

        counter!("dzi_annotation_mutations_total", "op" => "update").increment(1);
        debug!("Updated annotation {} on asset {}", annotation_id, asset_id);
        Ok(updated)
    }

    /// Remove every annotation with `annotation_id`; returns how many were removed
    pub async fn delete(&self, asset_id: &str, annotation_id: &str) -> Result<usize, AssetError> {
        let removed = self
            .store
            .mutate_record(asset_id, |record| {
                let before = record.annotations.len();
                record.annotations.retain(|a| a.id != annotation_id);
                match before - record.annotations.len() {
                    0 => Err(AssetError::AnnotationNotFound {
                        asset_id: asset_id.to_string(),
                        annotation_id: annotation_id.to_string(),
                    }),
                    n => Ok(n),
                }
            })
            .await?;

        counter!("dzi_annotation_mutations_total", "op" => "delete").increment(1);
        debug!(
            "Deleted {} annotation(s) {} from asset {}",
            removed, annotation_id, asset_id
        );
        Ok(removed)
    }
}
