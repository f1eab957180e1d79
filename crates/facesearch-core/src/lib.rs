//! facesearch-core: Face embedding extraction and similarity matching.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition,
//! both running via ONNX Runtime for CPU inference. The [`matcher`]
//! module ranks stored faces against a query embedding.

pub mod alignment;
pub mod detector;
pub mod extractor;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use detector::FaceDetector;
pub use extractor::{default_model_dir, EmbeddingExtractor, ExtractError, Extraction, OnnxExtractor};
pub use matcher::{CosineMatcher, MatchError, Matcher};
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, Embedding, FaceRecord, SimilarityResult};
