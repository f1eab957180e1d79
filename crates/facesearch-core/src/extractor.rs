use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("no face detected in image")]
    NoFaceDetected,
}

/// A face embedding together with the face it was taken from.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub embedding: Embedding,
    pub face: BoundingBox,
}

/// Turns a decoded image into a face embedding.
///
/// Implementations may hold non-`Sync` inference sessions, hence `&mut self`.
pub trait EmbeddingExtractor {
    fn extract(&mut self, image: &RgbImage) -> Result<Extraction, ExtractError>;
}

/// SCRFD detection followed by ArcFace recognition of the most confident face.
pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxExtractor {
    pub fn load(detector_path: &Path, recognizer_path: &Path) -> Result<Self, ExtractError> {
        Ok(Self {
            detector: FaceDetector::load(detector_path)?,
            recognizer: FaceRecognizer::load(recognizer_path)?,
        })
    }

    /// Load both models from their default file names inside `model_dir`.
    pub fn from_dir(model_dir: &Path) -> Result<Self, ExtractError> {
        Self::load(
            &model_dir.join(DETECTOR_MODEL_FILE),
            &model_dir.join(RECOGNIZER_MODEL_FILE),
        )
    }
}

impl EmbeddingExtractor for OnnxExtractor {
    fn extract(&mut self, image: &RgbImage) -> Result<Extraction, ExtractError> {
        let faces = self.detector.detect(image)?;
        tracing::debug!(faces = faces.len(), "detection finished");

        let face = faces.into_iter().next().ok_or(ExtractError::NoFaceDetected)?;
        let embedding = self.recognizer.extract(image, &face)?;
        Ok(Extraction { embedding, face })
    }
}

/// Default model directory: `$XDG_DATA_HOME/facesearch/models`, falling
/// back to `~/.local/share/facesearch/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facesearch/models")
}
