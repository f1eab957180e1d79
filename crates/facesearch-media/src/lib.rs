//! facesearch-media: Image handling for uploads.
//!
//! Validates upload file names, decodes images for embedding extraction,
//! and prepares stored copies (watermark overlay, JPEG compression to a
//! byte budget).

pub mod formats;
pub mod processing;

pub use formats::{allowed_extension, content_type_for, extension_of, DEFAULT_ALLOWED_EXTENSIONS};
pub use processing::{decode_rgb, ImageProcessor, MediaError, Processed};
