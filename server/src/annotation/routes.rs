//! HTTP route handlers for the annotation API

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, put},
};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::asset::{AssetError, AssetErrorResponse};

use super::manager::AnnotationManager;
use super::types::{Annotation, AnnotationPatch};

/// Application state for annotation routes
#[derive(Clone)]
pub struct AnnotationAppState {
    pub manager: Arc<AnnotationManager>,
}

/// Unwrap a JSON body, turning axum's rejection into a validation error
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AssetErrorResponse> {
    body.map(|Json(value)| value).map_err(|rejection| {
        AssetError::Validation(format!("Invalid JSON body: {}", rejection.body_text())).into()
    })
}

/// POST /assets/:id/annotations - Append an annotation
pub async fn create_annotation(
    State(state): State<AnnotationAppState>,
    Path(id): Path<String>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<(StatusCode, Json<Annotation>), AssetErrorResponse> {
    let document = json_body(body)?;
    let annotation = state.manager.add(&id, document).await.map_err(|e| {
        tracing::debug!("Failed to add annotation to {}: {}", id, e);
        AssetErrorResponse::from(e)
    })?;

    Ok((StatusCode::CREATED, Json(annotation)))
}

/// GET /assets/:id/annotations - List annotations in insertion order
pub async fn list_annotations(
    State(state): State<AnnotationAppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Annotation>>, AssetErrorResponse> {
    Ok(Json(state.manager.list(&id).await?))
}

/// PUT /assets/:id/annotations/:annotation_id - Merge fields into an annotation
pub async fn update_annotation(
    State(state): State<AnnotationAppState>,
    Path((id, annotation_id)): Path<(String, String)>,
    body: Result<Json<AnnotationPatch>, JsonRejection>,
) -> Result<Json<Annotation>, AssetErrorResponse> {
    let patch = json_body(body)?;
    let annotation = state
        .manager
        .update(&id, &annotation_id, &patch)
        .await
        .map_err(|e| {
            tracing::debug!("Failed to update annotation {}/{}: {}", id, annotation_id, e);
            AssetErrorResponse::from(e)
        })?;

    Ok(Json(annotation))
}

/// DELETE /assets/:id/annotations/:annotation_id - Remove an annotation
pub async fn delete_annotation(
    State(state): State<AnnotationAppState>,
    Path((id, annotation_id)): Path<(String, String)>,
) -> Result<StatusCode, AssetErrorResponse> {
    state
        .manager
        .delete(&id, &annotation_id)
        .await
        .map_err(|e| {
            tracing::debug!("Failed to delete annotation {}/{}: {}", id, annotation_id, e);
            AssetErrorResponse::from(e)
        })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Build annotation API routes
pub fn annotation_routes(state: AnnotationAppState) -> Router {
    Router::new()
        .route(
            "/assets/:id/annotations",
            get(list_annotations).post(create_annotation),
        )
        .route(
            "/assets/:id/annotations/:annotation_id",
            put(update_annotation).delete(delete_annotation),
        )
        .with_state(state)
}
