use super::MultipartForm;
use crate::error::{ApiError, ApiResult};
use crate::ingest::{ingest_many, ingest_one, BulkUploadResponse, ImageUploadResponse, Mode, Upload};
use crate::state::AppState;
use axum::extract::{Multipart, State};
use axum::Json;
use facesearch_store::clean_directory;
use std::sync::Arc;

/// Watermark + compress one image, then store and index it.
pub async fn upload_single(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<Json<ImageUploadResponse>> {
    let form = MultipartForm::read(multipart).await?;
    let mode = processed_mode(&state, &form);
    single(&state, form, &mode).await
}

/// Watermark + compress up to `max_bulk_files` images.
pub async fn upload_bulk(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<Json<BulkUploadResponse>> {
    let form = MultipartForm::read(multipart).await?;
    let mode = processed_mode(&state, &form);
    bulk(&state, form, &mode).await
}

/// Store and index one image exactly as uploaded.
pub async fn upload_original_single(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<Json<ImageUploadResponse>> {
    let form = MultipartForm::read(multipart).await?;
    single(&state, form, &Mode::Original).await
}

pub async fn upload_original_bulk(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<Json<BulkUploadResponse>> {
    let form = MultipartForm::read(multipart).await?;
    bulk(&state, form, &Mode::Original).await
}

/// A request watermark overrides the configured one.
fn processed_mode(state: &AppState, form: &MultipartForm) -> Mode {
    let watermark = form
        .watermark
        .clone()
        .map(Arc::new)
        .or_else(|| state.default_watermark.clone());
    Mode::Processed { watermark }
}

async fn single(
    state: &AppState,
    form: MultipartForm,
    mode: &Mode,
) -> ApiResult<Json<ImageUploadResponse>> {
    let directory = clean_directory(form.text("directory").unwrap_or_default());
    let upload: Upload = form
        .files
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::BadRequest("No file uploaded".into()))?;
    Ok(Json(ingest_one(state, upload, &directory, mode).await))
}

async fn bulk(state: &AppState, form: MultipartForm, mode: &Mode) -> ApiResult<Json<BulkUploadResponse>> {
    let directory = clean_directory(form.text("directory").unwrap_or_default());
    if form.files.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded".into()));
    }
    if form.files.len() > state.config.max_bulk_files {
        return Err(ApiError::TooManyFiles(state.config.max_bulk_files));
    }
    Ok(Json(ingest_many(state, form.files, &directory, mode).await))
}
