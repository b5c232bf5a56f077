// ============================
// crates/backend-lib/src/handlers/images.rs
// ============================
//! Stored image listing and deletion.
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use crate::error::AppError;
use crate::storage::ImageMeta;
use crate::AppState;

/// `GET /api/images`
pub async fn list_images(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ImageMeta>>, AppError> {
    Ok(Json(state.images.list_images().await?))
}

/// `DELETE /api/images/{id}`
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if state.images.delete_image(&id).await? {
        info!(%id, "image deleted");
        Ok(Json(json!({ "success": true })))
    } else {
        Err(AppError::NotFound(format!("image {id}")))
    }
}
