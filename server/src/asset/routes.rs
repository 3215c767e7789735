//! HTTP route handlers for the asset API

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::pyramid::{OutputFormat, PyramidError};

use super::store::AssetStore;
use super::types::{Asset, AssetError, AssetSummary};

/// Application state for asset routes
#[derive(Clone)]
pub struct AssetAppState {
    pub store: Arc<AssetStore>,
    /// Body limit applied to uploads
    pub max_upload_size: usize,
}

/// Error response shared by the asset and annotation APIs
#[derive(Debug, Serialize, Deserialize)]
pub struct AssetErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<AssetError> for AssetErrorResponse {
    fn from(e: AssetError) -> Self {
        let code = match &e {
            AssetError::Validation(_) => "validation_error",
            AssetError::NotFound(_) => "not_found",
            AssetError::AnnotationNotFound { .. } => "annotation_not_found",
            AssetError::DuplicateAnnotation { .. } => "duplicate_annotation",
            AssetError::Generation(PyramidError::Spawn { .. }) => "generator_unavailable",
            AssetError::Generation(PyramidError::TimedOut(_)) => "generation_timeout",
            AssetError::Generation(_) => "generation_failed",
            AssetError::Storage(_) => "storage_error",
            AssetError::CorruptRecord { .. } => "corrupt_record",
        };
        Self {
            error: e.to_string(),
            code: code.to_string(),
        }
    }
}

impl IntoResponse for AssetErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.code.as_str() {
            "validation_error" => StatusCode::BAD_REQUEST,
            "not_found" | "annotation_not_found" => StatusCode::NOT_FOUND,
            "duplicate_annotation" => StatusCode::CONFLICT,
            "payload_too_large" => StatusCode::PAYLOAD_TOO_LARGE,
            "generation_failed" => StatusCode::UNPROCESSABLE_ENTITY,
            "generator_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            "generation_timeout" => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

fn multipart_error(e: MultipartError) -> AssetErrorResponse {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AssetErrorResponse {
            error: e.body_text(),
            code: "payload_too_large".to_string(),
        }
    } else {
        AssetError::Validation(format!("Malformed multipart body: {}", e.body_text())).into()
    }
}

/// Response for POST /assets
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAssetResponse {
    pub id: String,
    pub display_name: String,
    pub format: OutputFormat,
    pub pyramid_url: String,
}

/// Response for pyramid-info lookups
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PyramidInfoResponse {
    pub id: String,
    pub display_name: String,
    pub pyramid_url: String,
}

/// POST /assets - Upload an image and generate its pyramid
///
/// Multipart fields: `file` (required) and `format` (optional).
pub async fn upload_asset(
    State(state): State<AssetAppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CreatedAssetResponse>), AssetErrorResponse> {
    let mut file: Option<(String, bytes::Bytes)> = None;
    let mut format_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().map(str::to_string).unwrap_or_default();
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some((file_name, data));
            }
            Some("format") => {
                format_name = Some(field.text().await.map_err(multipart_error)?);
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    let format: OutputFormat = format_name
        .as_deref()
        .unwrap_or_default()
        .parse()
        .map_err(AssetError::Validation)?;
    let (file_name, data) =
        file.ok_or_else(|| AssetError::Validation("Missing 'file' field".to_string()))?;

    let asset = state
        .store
        .create(&data, &file_name, format)
        .await
        .map_err(|e| {
            tracing::warn!("Upload of '{}' failed: {}", file_name, e);
            AssetErrorResponse::from(e)
        })?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedAssetResponse {
            pyramid_url: state.store.pyramid_url(&asset.id),
            id: asset.id,
            display_name: asset.original_filename,
            format: asset.output_format,
        }),
    ))
}

/// GET /assets - List assets with a complete pyramid
pub async fn list_assets(
    State(state): State<AssetAppState>,
) -> Result<Json<Vec<AssetSummary>>, AssetErrorResponse> {
    let assets = state.store.list().await.map_err(|e| {
        tracing::error!("Failed to list assets: {}", e);
        AssetErrorResponse::from(e)
    })?;

    Ok(Json(assets))
}

/// DELETE /assets/:id - Remove an asset and everything generated from it
pub async fn delete_asset(
    State(state): State<AssetAppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AssetErrorResponse> {
    state.store.delete(&id).await.map_err(|e| {
        tracing::warn!("Failed to delete asset {}: {}", id, e);
        AssetErrorResponse::from(e)
    })?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /assets/:id/pyramid-info - Descriptor location for one asset
pub async fn get_pyramid_info(
    State(state): State<AssetAppState>,
    Path(id): Path<String>,
) -> Result<Json<PyramidInfoResponse>, AssetErrorResponse> {
    let asset = state.store.get(&id).await?;
    pyramid_info(&state, asset)
}

/// GET /pyramid-info - Descriptor location for the default asset
pub async fn get_default_pyramid_info(
    State(state): State<AssetAppState>,
) -> Result<Json<PyramidInfoResponse>, AssetErrorResponse> {
    let asset = state.store.resolve_default().await.map_err(|e| {
        tracing::debug!("No default asset: {}", e);
        AssetErrorResponse::from(e)
    })?;
    pyramid_info(&state, asset)
}

fn pyramid_info(
    state: &AssetAppState,
    asset: Asset,
) -> Result<Json<PyramidInfoResponse>, AssetErrorResponse> {
    if asset.pyramid.is_none() {
        return Err(AssetErrorResponse {
            error: format!("Asset {} has no generated pyramid", asset.id),
            code: "not_found".to_string(),
        });
    }

    Ok(Json(PyramidInfoResponse {
        pyramid_url: state.store.pyramid_url(&asset.id),
        id: asset.id,
        display_name: asset.original_filename,
    }))
}

/// Build asset API routes
pub fn asset_routes(state: AssetAppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_size);
    Router::new()
        .route(
            "/assets",
            get(list_assets).post(upload_asset).layer(upload_limit),
        )
        .route("/assets/:id", delete(delete_asset))
        .route("/assets/:id/pyramid-info", get(get_pyramid_info))
        .route("/pyramid-info", get(get_default_pyramid_info))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_map_to_status() {
        let cases = [
            (AssetError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AssetError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                AssetError::AnnotationNotFound {
                    asset_id: "a".into(),
                    annotation_id: "b".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                AssetError::DuplicateAnnotation {
                    asset_id: "a".into(),
                    annotation_id: "b".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                AssetError::Generation(PyramidError::Failed {
                    status: "exit status: 1".into(),
                    stderr: String::new(),
                }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AssetError::Generation(PyramidError::Spawn {
                    binary: "vips".into(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AssetError::Generation(PyramidError::TimedOut(
                    std::time::Duration::from_secs(30),
                )),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                AssetError::Storage(std::io::Error::other("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            let response = AssetErrorResponse::from(error).into_response();
            assert_eq!(response.status(), status);
        }
    }
}
