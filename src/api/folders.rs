//! Folder endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::error::Result;
use crate::server::AppState;
use crate::store::{Folder, FolderFilter, FolderPatch, NewFolder};

use super::validation::Validate;
use super::{request_scope, ApiJson};

/// POST /api/v1/folders - Create a folder
#[tracing::instrument(
    name = "http.create_folder",
    skip(state, request),
    fields(parent_id = ?request.parent_id)
)]
pub async fn create_folder(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NewFolder>,
) -> Result<(StatusCode, Json<Folder>)> {
    request.validate()?;
    let (cancel, _guard) = request_scope();

    let folder = state.service.create_folder(request, &cancel).await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

/// POST /api/v1/folders/filter - Filter folders
#[tracing::instrument(name = "http.filter_folders", skip(state, filter))]
pub async fn filter_folders(
    State(state): State<AppState>,
    ApiJson(filter): ApiJson<FolderFilter>,
) -> Result<Json<Vec<Folder>>> {
    let (cancel, _guard) = request_scope();
    let folders = state.service.filter_folders(&filter, &cancel).await?;
    Ok(Json(folders))
}

/// PATCH /api/v1/folders/{id} - Update supplied fields of a folder
#[tracing::instrument(name = "http.update_folder", skip(state, patch))]
pub async fn update_folder(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(patch): ApiJson<FolderPatch>,
) -> Result<StatusCode> {
    patch.validate()?;
    let (cancel, _guard) = request_scope();

    state.service.update_folder(id, patch, &cancel).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/folders/{id} - Delete a folder and everything under it
#[tracing::instrument(name = "http.delete_folder", skip(state))]
pub async fn delete_folder(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let (cancel, _guard) = request_scope();
    state.service.delete_folder(id, &cancel).await?;
    Ok(StatusCode::NO_CONTENT)
}
