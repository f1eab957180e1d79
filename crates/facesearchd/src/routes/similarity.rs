use super::MultipartForm;
use crate::error::{ApiError, ApiResult};
use crate::ingest::elapsed_secs;
use crate::state::AppState;
use axum::extract::{Multipart, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use facesearch_core::matcher;
use facesearch_core::{Matcher, SimilarityResult};
use facesearch_media::allowed_extension;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    pub id: String,
    pub url: String,
    pub similarity_score: f32,
}

impl From<SimilarityResult> for FaceMatch {
    fn from(r: SimilarityResult) -> Self {
        Self {
            id: r.id,
            url: r.source,
            similarity_score: r.score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub total_matches: usize,
    pub matches: Vec<FaceMatch>,
    pub processing_time: f64,
}

/// Find stored faces similar to the uploaded one.
///
/// `threshold` and `max_results` (alias `limit`) may come from the form or
/// the query string; the form wins. `directory` restricts the candidates.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(mut query): Query<HashMap<String, String>>,
    multipart: Multipart,
) -> ApiResult<Json<SearchResponse>> {
    let started = Instant::now();
    let mut form = MultipartForm::read(multipart).await?;
    form.alias("limit", "max_results");
    if let Some(limit) = query.remove("limit") {
        query.entry("max_results".to_string()).or_insert(limit);
    }
    form.fill_missing(query);

    let threshold = form
        .parse::<f32>("threshold")?
        .unwrap_or(state.config.similarity_threshold);
    let limit = form
        .parse::<usize>("max_results")?
        .unwrap_or(state.config.max_results);
    matcher::validate(threshold, limit)?;
    let directory = form.text("directory").map(str::to_string);

    let upload = form
        .files
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::BadRequest("No file uploaded".into()))?;
    if allowed_extension(&upload.filename, &state.config.allowed_extensions).is_none() {
        return Err(ApiError::BadRequest(format!(
            "Invalid file type. Allowed: {}",
            state.config.allowed_extensions.join(", ")
        )));
    }
    if upload.bytes.is_empty() {
        return Err(ApiError::BadRequest("File is empty".into()));
    }
    if upload.bytes.len() > state.config.max_file_size {
        return Err(ApiError::BadRequest(format!(
            "File too large: {} bytes (max {})",
            upload.bytes.len(),
            state.config.max_file_size
        )));
    }

    let extraction = state.engine.extract(upload.bytes).await?;
    let candidates = state.faces.candidates(directory.as_deref()).await?;
    let results = state
        .matcher
        .search(&extraction.embedding, &candidates, threshold, limit)?;

    let response = SearchResponse {
        total_matches: results.len(),
        matches: results.into_iter().map(FaceMatch::from).collect(),
        processing_time: elapsed_secs(started),
    };
    tracing::info!(
        filename = %upload.filename,
        directory = directory.as_deref().unwrap_or("*"),
        candidates = candidates.len(),
        matches = response.total_matches,
        threshold,
        limit,
        "similarity search"
    );
    Ok(Json(response))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let total_faces = state.faces.count().await?;
    Ok(Json(json!({
        "total_faces": total_faces,
        "status": "healthy",
    })))
}
