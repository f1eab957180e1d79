use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use facesearch_media::{content_type_for, extension_of};
use std::sync::Arc;

/// Serve stored image bytes; the URLs handed out by uploads point here.
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state.objects.get(&key).await?;
    let content_type = content_type_for(extension_of(&key));
    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}
