//! Per-file upload pipeline: validate, optionally process, store the object,
//! extract the embedding, persist the face record.

use crate::engine::EngineError;
use crate::state::AppState;
use chrono::Utc;
use facesearch_core::FaceRecord;
use facesearch_media::{allowed_extension, content_type_for};
use facesearch_store::{object_key, ObjectStoreError, StoreError};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;

/// One file received from a multipart body.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Whether uploads are watermarked and compressed before storage.
#[derive(Debug, Clone)]
pub enum Mode {
    Processed { watermark: Option<Arc<Vec<u8>>> },
    Original,
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No filename provided")]
    MissingFilename,
    #[error("Invalid file type. Allowed: {0}")]
    InvalidType(String),
    #[error("File is empty")]
    Empty,
    #[error("File too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
    #[error("image processing task failed: {0}")]
    Processing(String),
    #[error("storage upload failed: {0}")]
    Objects(#[from] ObjectStoreError),
    #[error("{0}")]
    Engine(#[from] EngineError),
    #[error("database insert failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUploadResponse {
    pub filename: String,
    pub url: String,
    pub processed: bool,
    pub embedding_stored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUploadResponse {
    pub total_files: usize,
    pub successful_uploads: usize,
    pub failed_uploads: usize,
    pub results: Vec<ImageUploadResponse>,
    /// Wall-clock seconds, two decimals.
    pub processing_time: f64,
}

/// Seconds since `started`, rounded to two decimals.
pub fn elapsed_secs(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 100.0).round() / 100.0
}

/// Run the pipeline for one file. Failures are reported inside the
/// response, never returned.
pub async fn ingest_one(
    state: &AppState,
    upload: Upload,
    directory: &str,
    mode: &Mode,
) -> ImageUploadResponse {
    let mut response = ImageUploadResponse {
        filename: upload.filename.clone(),
        url: String::new(),
        processed: false,
        embedding_stored: false,
        error: None,
    };

    if let Err(e) = run(state, upload, directory, mode, &mut response).await {
        tracing::warn!(filename = %response.filename, directory, error = %e, "upload failed");
        response.error = Some(e.to_string());
    }
    response
}

async fn run(
    state: &AppState,
    upload: Upload,
    directory: &str,
    mode: &Mode,
    response: &mut ImageUploadResponse,
) -> Result<(), IngestError> {
    let config = &state.config;
    if upload.filename.trim().is_empty() {
        return Err(IngestError::MissingFilename);
    }
    let ext = allowed_extension(&upload.filename, &config.allowed_extensions)
        .ok_or_else(|| IngestError::InvalidType(config.allowed_extensions.join(", ")))?;
    if upload.bytes.is_empty() {
        return Err(IngestError::Empty);
    }
    if upload.bytes.len() > config.max_file_size {
        return Err(IngestError::TooLarge {
            size: upload.bytes.len(),
            max: config.max_file_size,
        });
    }

    let (bytes, ext) = match mode {
        Mode::Original => (upload.bytes, ext),
        Mode::Processed { watermark } => {
            let processor = state.processor.clone();
            let watermark = watermark.clone();
            let input = upload.bytes;
            let processed = tokio::task::spawn_blocking(move || {
                processor.process(&input, watermark.as_deref().map(Vec::as_slice))
            })
            .await
            .map_err(|e| IngestError::Processing(e.to_string()))?;
            response.processed = processed.transformed;
            let ext = processed.extension(ext);
            (processed.bytes, ext)
        }
    };

    let key = object_key(directory, ext);
    response.url = state
        .objects
        .put(&key, bytes.clone(), &content_type_for(ext))
        .await?;

    let extraction = state.engine.extract(bytes).await?;

    let record = FaceRecord {
        id: key.clone(),
        directory: directory.to_string(),
        filename: upload.filename,
        source: response.url.clone(),
        embedding: extraction.embedding,
        created_at: Utc::now(),
    };
    state.faces.insert(&record).await?;
    response.embedding_stored = true;

    tracing::info!(
        %key,
        filename = %record.filename,
        confidence = extraction.face.confidence,
        processed = response.processed,
        "face stored"
    );
    Ok(())
}

/// Run the pipeline over many files, at most `upload_concurrency` at a time.
/// Results keep the input order.
pub async fn ingest_many(
    state: &AppState,
    uploads: Vec<Upload>,
    directory: &str,
    mode: &Mode,
) -> BulkUploadResponse {
    let started = Instant::now();
    let total_files = uploads.len();
    let permits = Semaphore::new(state.config.upload_concurrency.max(1));
    let permits = &permits;

    let results = join_all(uploads.into_iter().map(|upload| async move {
        let _permit = permits.acquire().await;
        ingest_one(state, upload, directory, mode).await
    }))
    .await;

    let successful_uploads = results.iter().filter(|r| r.embedding_stored).count();
    let response = BulkUploadResponse {
        total_files,
        successful_uploads,
        failed_uploads: total_files - successful_uploads,
        results,
        processing_time: elapsed_secs(started),
    };
    tracing::info!(
        directory,
        total = response.total_files,
        ok = response.successful_uploads,
        failed = response.failed_uploads,
        secs = response.processing_time,
        "bulk upload finished"
    );
    response
}
