use super::DirectoryParam;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: String,
    pub filename: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub directory: String,
    pub total_files: usize,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFolderResponse {
    pub status: String,
    pub message: String,
    pub db_records_removed: usize,
    pub objects_deleted: usize,
}

/// Indexed faces of one directory, oldest first.
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    DirectoryParam(directory): DirectoryParam,
) -> ApiResult<Json<ListFilesResponse>> {
    let files: Vec<FileEntry> = state
        .faces
        .list_directory(&directory)
        .await?
        .into_iter()
        .map(|r| FileEntry {
            id: r.id,
            filename: r.filename,
            source: r.source,
            created_at: r.created_at,
        })
        .collect();

    Ok(Json(ListFilesResponse {
        directory,
        total_files: files.len(),
        files,
    }))
}

/// Remove a directory's face records, then its stored objects.
///
/// Objects stored directly in the directory without a record (uploads whose
/// extraction failed) are removed too.
pub async fn delete_folder(
    State(state): State<Arc<AppState>>,
    DirectoryParam(directory): DirectoryParam,
) -> ApiResult<Json<DeleteFolderResponse>> {
    let removed_ids = state.faces.delete_directory(&directory).await?;

    let mut keys: BTreeSet<String> = removed_ids.iter().cloned().collect();
    keys.extend(state.objects.list(&directory).await?.into_iter().map(|o| o.key));

    if keys.is_empty() {
        return Ok(Json(DeleteFolderResponse {
            status: "success".into(),
            message: format!("Folder '{directory}' was empty or didn't exist in database."),
            db_records_removed: 0,
            objects_deleted: 0,
        }));
    }

    let keys: Vec<String> = keys.into_iter().collect();
    let objects_deleted = state.objects.delete_many(&keys).await?;
    tracing::info!(
        %directory,
        records = removed_ids.len(),
        objects = objects_deleted,
        "deleted folder"
    );

    Ok(Json(DeleteFolderResponse {
        status: "success".into(),
        message: format!("Successfully deleted folder '{directory}'"),
        db_records_removed: removed_ids.len(),
        objects_deleted,
    }))
}
