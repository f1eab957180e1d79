use facesearch_core::{EmbeddingExtractor, ExtractError, Extraction};
use facesearch_media::MediaError;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Pending requests the engine thread will queue before senders wait.
const QUEUE_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Decode(#[from] MediaError),
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Extract {
        image_bytes: Vec<u8>,
        reply: oneshot::Sender<Result<Extraction, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Decode `image_bytes` and extract the embedding of its most confident face.
    pub async fn extract(&self, image_bytes: Vec<u8>) -> Result<Extraction, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Extract {
                image_bytes,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The extractor is moved onto the thread and owned there for the life of
/// the process; requests are served one at a time. The thread exits once
/// every [`EngineHandle`] has been dropped.
pub fn spawn_engine<E>(mut extractor: E) -> Result<EngineHandle, EngineError>
where
    E: EmbeddingExtractor + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("facesearch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Extract { image_bytes, reply } => {
                        let result = run_extract(&mut extractor, &image_bytes);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn run_extract<E: EmbeddingExtractor>(
    extractor: &mut E,
    image_bytes: &[u8],
) -> Result<Extraction, EngineError> {
    let started = Instant::now();
    let image = facesearch_media::decode_rgb(image_bytes)?;
    let extraction = extractor.extract(&image)?;
    tracing::debug!(
        width = image.width(),
        height = image.height(),
        confidence = extraction.face.confidence,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "extracted embedding"
    );
    Ok(extraction)
}

#[cfg(test)]
pub(crate) mod testing {
    use facesearch_core::{BoundingBox, Embedding, EmbeddingExtractor, ExtractError, Extraction};
    use image::RgbImage;

    /// Embeds an image as its mean colour; all-black images have no face.
    pub struct MeanColorExtractor;

    impl EmbeddingExtractor for MeanColorExtractor {
        fn extract(&mut self, image: &RgbImage) -> Result<Extraction, ExtractError> {
            let n = (image.width() * image.height()).max(1) as f32;
            let mut sum = [0.0f32; 3];
            for px in image.pixels() {
                for (acc, &c) in sum.iter_mut().zip(px.0.iter()) {
                    *acc += c as f32;
                }
            }
            if sum.iter().all(|&s| s == 0.0) {
                return Err(ExtractError::NoFaceDetected);
            }
            let mut embedding = Embedding::new(sum.iter().map(|s| s / n).collect());
            embedding.normalize();
            Ok(Extraction {
                embedding,
                face: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: image.width() as f32,
                    height: image.height() as f32,
                    confidence: 0.99,
                    landmarks: None,
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MeanColorExtractor;
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png(color: [u8; 3]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb(color)))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn test_extract_roundtrip() {
        let engine = spawn_engine(MeanColorExtractor).unwrap();
        let out = engine.extract(png([200, 0, 0])).await.unwrap();
        assert_eq!(out.embedding.dim(), 3);
        assert!((out.embedding.values[0] - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_undecodable_bytes() {
        let engine = spawn_engine(MeanColorExtractor).unwrap();
        let err = engine.extract(b"not an image".to_vec()).await.unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
    }

    #[tokio::test]
    async fn test_no_face() {
        let engine = spawn_engine(MeanColorExtractor).unwrap();
        let err = engine.extract(png([0, 0, 0])).await.unwrap_err();
        assert!(matches!(err, EngineError::Extract(ExtractError::NoFaceDetected)));
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_served() {
        let engine = spawn_engine(MeanColorExtractor).unwrap();
        let colors = [[255, 0, 0], [0, 255, 0], [0, 0, 255], [10, 10, 10]];
        let results = futures::future::join_all(colors.iter().map(|&c| engine.extract(png(c)))).await;
        assert!(results.iter().all(Result::is_ok));
    }
}
