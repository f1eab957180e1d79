//! HTTP route handlers
//!
//! - `health`: liveness and service info
//! - `upload`: single and bulk ingestion, processed or original
//! - `similarity`: face search and gallery stats
//! - `management`: directory listing and deletion
//! - `objects`: serving stored image bytes

pub mod health;
pub mod management;
pub mod objects;
pub mod similarity;
pub mod upload;

use crate::error::{ApiError, ApiResult};
use crate::ingest::Upload;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header;
use axum::Form;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

/// Fallback for undefined routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("route".into())
}

/// A drained multipart body: file parts plus text fields.
#[derive(Debug, Default)]
pub struct MultipartForm {
    /// Parts named `file` or `files`, in arrival order.
    pub files: Vec<Upload>,
    /// Non-empty `watermark_file` part.
    pub watermark: Option<Vec<u8>>,
    fields: HashMap<String, String>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" | "files" => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let bytes = field.bytes().await?;
                    form.files.push(Upload {
                        filename,
                        bytes: bytes.to_vec(),
                    });
                }
                "watermark_file" => {
                    let bytes = field.bytes().await?;
                    if !bytes.is_empty() {
                        form.watermark = Some(bytes.to_vec());
                    }
                }
                _ => {
                    let value = field.text().await?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(form)
    }

    /// Text field `name`, trimmed; blank counts as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Parse text field `name`, rejecting unparseable values.
    pub fn parse<T: FromStr>(&self, name: &str) -> ApiResult<Option<T>> {
        self.text(name)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| ApiError::BadRequest(format!("invalid {name}: {raw:?}")))
            })
            .transpose()
    }

    /// Move field `alias` to `canonical` unless `canonical` is already set.
    pub fn alias(&mut self, alias: &str, canonical: &str) {
        if let Some(value) = self.fields.remove(alias) {
            self.fields.entry(canonical.to_string()).or_insert(value);
        }
    }

    /// Add `extra` entries whose keys the body did not set.
    pub fn fill_missing(&mut self, extra: HashMap<String, String>) {
        for (key, value) in extra {
            self.fields.entry(key).or_insert(value);
        }
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryForm {
    directory: Option<String>,
}

/// Required `directory` field from a urlencoded or multipart body.
#[derive(Debug)]
pub struct DirectoryParam(pub String);

impl<S> FromRequest<S> for DirectoryParam
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        let directory = if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            MultipartForm::read(multipart)
                .await?
                .text("directory")
                .map(str::to_string)
        } else {
            let Form(form) = Form::<DirectoryForm>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            form.directory
        };

        directory
            .map(|d| d.trim().trim_matches('/').to_string())
            .filter(|d| !d.is_empty())
            .map(Self)
            .ok_or_else(|| ApiError::BadRequest("directory is required".into()))
    }
}
