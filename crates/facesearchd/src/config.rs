use facesearch_media::DEFAULT_ALLOWED_EXTENSIONS;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Daemon configuration, loaded from environment variables.
///
/// Built once at startup and shared read-only with every handler.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on.
    pub bind_addr: SocketAddr,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Root directory of the object store.
    pub object_root: PathBuf,
    /// Public prefix stored objects are served under.
    pub public_url: String,
    /// Default minimum cosine similarity for a search hit.
    pub similarity_threshold: f32,
    /// Default number of search hits returned.
    pub max_results: usize,
    /// Per-file upload limit in bytes.
    pub max_file_size: usize,
    /// Maximum files accepted by one bulk upload.
    pub max_bulk_files: usize,
    /// Concurrent per-file pipelines within one bulk upload.
    pub upload_concurrency: usize,
    /// Accepted filename extensions, lowercase with leading dot.
    pub allowed_extensions: Vec<String>,
    /// Watermark applied to processed uploads that bring none of their own.
    pub watermark_path: Option<PathBuf>,
    /// Byte budget for processed uploads.
    pub compress_target_bytes: usize,
}

impl Config {
    /// Load configuration from `FACESEARCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facesearch");

        let bind_addr = parse_or(&lookup, "FACESEARCH_BIND", || {
            SocketAddr::from(([0, 0, 0, 0], 8000))
        });

        let public_url = lookup("FACESEARCH_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{}/objects", bind_addr.port()));

        let allowed_extensions = lookup("FACESEARCH_ALLOWED_EXTENSIONS")
            .map(|raw| parse_extensions(&raw))
            .filter(|exts| !exts.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_ALLOWED_EXTENSIONS
                    .iter()
                    .map(|e| e.to_string())
                    .collect()
            });

        Self {
            bind_addr,
            model_dir: lookup("FACESEARCH_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(facesearch_core::default_model_dir),
            db_path: lookup("FACESEARCH_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("faces.db")),
            object_root: lookup("FACESEARCH_OBJECT_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("objects")),
            public_url,
            similarity_threshold: parse_or(&lookup, "FACESEARCH_SIMILARITY_THRESHOLD", || 0.60),
            max_results: parse_or(&lookup, "FACESEARCH_MAX_RESULTS", || 5),
            max_file_size: parse_or(&lookup, "FACESEARCH_MAX_FILE_SIZE", || 10 * 1024 * 1024),
            max_bulk_files: parse_or(&lookup, "FACESEARCH_MAX_BULK_FILES", || 100),
            upload_concurrency: parse_or::<usize, _>(&lookup, "FACESEARCH_UPLOAD_CONCURRENCY", || 5).max(1),
            allowed_extensions,
            watermark_path: lookup("FACESEARCH_WATERMARK_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            compress_target_bytes: parse_or(&lookup, "FACESEARCH_COMPRESS_TARGET_BYTES", || {
                500 * 1024
            }),
        }
    }

    /// Request body ceiling for bulk uploads.
    pub fn max_body_size(&self) -> usize {
        self.max_file_size.saturating_mul(self.max_bulk_files.max(1))
    }
}

fn parse_or<T, F>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: F) -> T
where
    T: FromStr,
    F: FnOnce() -> T,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "unparseable setting; using default");
                default()
            }
        },
        None => default(),
    }
}

/// `"jpg, .PNG"` → `[".jpg", ".png"]`.
fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{e}"))
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("HOME", "/home/alice")]);
        assert_eq!(cfg.bind_addr.to_string(), "0.0.0.0:8000");
        assert_eq!(cfg.db_path, PathBuf::from("/home/alice/.local/share/facesearch/faces.db"));
        assert_eq!(cfg.object_root, PathBuf::from("/home/alice/.local/share/facesearch/objects"));
        assert_eq!(cfg.public_url, "http://localhost:8000/objects");
        assert!((cfg.similarity_threshold - 0.60).abs() < f32::EPSILON);
        assert_eq!(cfg.max_results, 5);
        assert_eq!(cfg.max_file_size, 10 * 1024 * 1024);
        assert_eq!(cfg.upload_concurrency, 5);
        assert_eq!(cfg.allowed_extensions, [".jpg", ".jpeg", ".png", ".bmp"]);
        assert!(cfg.watermark_path.is_none());
        assert_eq!(cfg.compress_target_bytes, 500 * 1024);
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("FACESEARCH_BIND", "127.0.0.1:9100"),
            ("FACESEARCH_SIMILARITY_THRESHOLD", "0.75"),
            ("FACESEARCH_MAX_RESULTS", "20"),
            ("FACESEARCH_ALLOWED_EXTENSIONS", "JPG, png ,"),
            ("FACESEARCH_WATERMARK_PATH", "/etc/facesearch/mark.png"),
            ("FACESEARCH_UPLOAD_CONCURRENCY", "0"),
        ]);
        assert_eq!(cfg.bind_addr.port(), 9100);
        assert_eq!(cfg.public_url, "http://localhost:9100/objects");
        assert!((cfg.similarity_threshold - 0.75).abs() < f32::EPSILON);
        assert_eq!(cfg.max_results, 20);
        assert_eq!(cfg.allowed_extensions, [".jpg", ".png"]);
        assert_eq!(cfg.watermark_path, Some(PathBuf::from("/etc/facesearch/mark.png")));
        assert_eq!(cfg.upload_concurrency, 1);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let cfg = config(&[
            ("FACESEARCH_BIND", "not-an-address"),
            ("FACESEARCH_MAX_RESULTS", "many"),
            ("FACESEARCH_ALLOWED_EXTENSIONS", " , "),
        ]);
        assert_eq!(cfg.bind_addr.port(), 8000);
        assert_eq!(cfg.max_results, 5);
        assert_eq!(cfg.allowed_extensions.len(), 4);
    }
}
