use crate::config::Config;
use crate::engine::EngineHandle;
use facesearch_core::CosineMatcher;
use facesearch_media::ImageProcessor;
use facesearch_store::{FaceStore, ObjectStore};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state.
///
/// Every collaborator a handler needs is reachable from here; nothing is
/// looked up from globals.
pub struct AppState {
    pub config: Config,
    pub engine: EngineHandle,
    pub faces: Arc<dyn FaceStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub processor: ImageProcessor,
    pub matcher: CosineMatcher,
    /// Decoded-on-demand watermark bytes from `FACESEARCH_WATERMARK_PATH`.
    pub default_watermark: Option<Arc<Vec<u8>>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Config,
        engine: EngineHandle,
        faces: Arc<dyn FaceStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        let processor = ImageProcessor::new(config.compress_target_bytes);
        Self {
            config,
            engine,
            faces,
            objects,
            processor,
            matcher: CosineMatcher,
            default_watermark: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_watermark(mut self, bytes: Vec<u8>) -> Self {
        self.default_watermark = Some(Arc::new(bytes));
        self
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
