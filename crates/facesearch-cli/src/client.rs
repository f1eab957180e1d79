use anyhow::{bail, Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bulk uploads on a CPU-only daemon can take a while.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Thin HTTP client for a running `facesearchd`.
pub struct DaemonClient {
    http: Client,
    base_url: String,
}

/// Upload endpoint for a batch of `count` files.
pub fn upload_path(original: bool, count: usize) -> &'static str {
    match (original, count) {
        (false, 1) => "/upload/single",
        (false, _) => "/upload/bulk",
        (true, 1) => "/upload/original/single",
        (true, _) => "/upload/original/bulk",
    }
}

impl DaemonClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> Result<Value> {
        send(self.http.get(self.url("/health"))).await
    }

    pub async fn stats(&self) -> Result<Value> {
        send(self.http.get(self.url("/similarity/stats"))).await
    }

    pub async fn upload(&self, files: &[PathBuf], directory: Option<&str>, original: bool) -> Result<Value> {
        if files.is_empty() {
            bail!("no files given");
        }
        let field = if files.len() == 1 { "file" } else { "files" };
        let mut form = Form::new();
        for path in files {
            form = form.part(field, file_part(path).await?);
        }
        if let Some(dir) = directory {
            form = form.text("directory", dir.to_string());
        }
        tracing::debug!(count = files.len(), original, "uploading");
        send(
            self.http
                .post(self.url(upload_path(original, files.len())))
                .multipart(form),
        )
        .await
    }

    pub async fn search(
        &self,
        file: &Path,
        directory: Option<&str>,
        threshold: Option<f32>,
        limit: Option<usize>,
    ) -> Result<Value> {
        let mut form = Form::new().part("file", file_part(file).await?);
        if let Some(dir) = directory {
            form = form.text("directory", dir.to_string());
        }
        if let Some(t) = threshold {
            form = form.text("threshold", t.to_string());
        }
        if let Some(k) = limit {
            form = form.text("max_results", k.to_string());
        }
        send(self.http.post(self.url("/similarity/search")).multipart(form)).await
    }

    pub async fn list(&self, directory: &str) -> Result<Value> {
        send(
            self.http
                .post(self.url("/management/list-files"))
                .form(&[("directory", directory)]),
        )
        .await
    }

    pub async fn delete(&self, directory: &str) -> Result<Value> {
        send(
            self.http
                .delete(self.url("/management/delete-folder"))
                .form(&[("directory", directory)]),
        )
        .await
    }
}

async fn file_part(path: &Path) -> Result<Part> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string();
    Ok(Part::bytes(bytes).file_name(name))
}

async fn send(req: RequestBuilder) -> Result<Value> {
    let resp = req.send().await.context("request to facesearchd failed")?;
    let status = resp.status();
    let body = resp.text().await.context("failed to read response body")?;
    let json: Value = serde_json::from_str(&body).unwrap_or(Value::String(body));

    if !status.is_success() {
        let message = json
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| json.to_string());
        bail!("facesearchd returned {status}: {message}");
    }
    Ok(json)
}
