//! Upload processing: decode, watermark, and compress to a byte budget.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage, RgbaImage};
use thiserror::Error;

/// Default upper bound for processed uploads.
pub const DEFAULT_MAX_BYTES: usize = 500 * 1024;
/// Longest side allowed before compression starts.
const MAX_DIMENSION: u32 = 1920;
const INITIAL_QUALITY: u8 = 90;
/// Above this, quality is lowered; at or below, the image is shrunk instead.
const QUALITY_FLOOR: u8 = 70;
const QUALITY_STEP: u8 = 10;
const QUALITY_AFTER_RESIZE: u8 = 85;
const QUALITY_MIN_SIZE: u8 = 50;
const SHRINK_FACTOR: f32 = 0.75;
/// Width below which shrinking stops and quality is forced down instead.
const MIN_WIDTH: u32 = 600;
const MAX_RETRIES: usize = 15;
/// Watermark width as a fraction of the base width.
const WATERMARK_SCALE: f32 = 0.10;
/// Watermark margin as a fraction of the base width.
const WATERMARK_PADDING: f32 = 0.02;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Decode any supported image format into 8-bit RGB.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, MediaError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(MediaError::Decode)
}

/// Result of [`ImageProcessor::process`].
#[derive(Debug, Clone)]
pub struct Processed {
    pub bytes: Vec<u8>,
    /// `false` when processing failed and `bytes` are the untouched input.
    pub transformed: bool,
}

impl Processed {
    /// Extension to store the bytes under.
    pub fn extension<'a>(&self, original: &'a str) -> &'a str {
        if self.transformed { ".jpg" } else { original }
    }
}

/// Watermarks and compresses uploads to JPEG under a size budget.
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    max_bytes: usize,
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BYTES)
    }
}

impl ImageProcessor {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Process an upload. Never fails: on any error the input is returned as-is.
    pub fn process(&self, bytes: &[u8], watermark: Option<&[u8]>) -> Processed {
        match self.try_process(bytes, watermark) {
            Ok(out) => Processed {
                bytes: out,
                transformed: true,
            },
            Err(e) => {
                tracing::warn!(error = %e, "image processing failed; keeping original bytes");
                Processed {
                    bytes: bytes.to_vec(),
                    transformed: false,
                }
            }
        }
    }

    fn try_process(&self, bytes: &[u8], watermark: Option<&[u8]>) -> Result<Vec<u8>, MediaError> {
        let mut base = image::load_from_memory(bytes)
            .map_err(MediaError::Decode)?
            .to_rgba8();

        if let Some(mark) = watermark {
            match image::load_from_memory(mark) {
                Ok(mark) => {
                    tracing::debug!("applying watermark");
                    apply_watermark(&mut base, &mark);
                }
                Err(e) => tracing::warn!(error = %e, "watermark could not be decoded; skipping"),
            }
        }

        let rgb = DynamicImage::ImageRgba8(base).to_rgb8();
        self.compress(rgb)
    }

    /// Encode as JPEG no larger than `max_bytes`, giving up after a bounded
    /// number of retries and returning the last attempt.
    pub fn compress(&self, mut img: RgbImage) -> Result<Vec<u8>, MediaError> {
        if img.width() > MAX_DIMENSION || img.height() > MAX_DIMENSION {
            let (w, h) = fit_within(img.width(), img.height(), MAX_DIMENSION);
            tracing::info!(from = ?img.dimensions(), to = ?(w, h), "downscaling oversized image");
            img = imageops::resize(&img, w, h, FilterType::Lanczos3);
        }

        let mut quality = INITIAL_QUALITY;
        let mut encoded = encode_jpeg(&img, quality)?;

        for _ in 0..MAX_RETRIES {
            if encoded.len() <= self.max_bytes {
                break;
            }

            if quality > QUALITY_FLOOR {
                quality -= QUALITY_STEP;
            } else {
                let new_w = (img.width() as f32 * SHRINK_FACTOR) as u32;
                let new_h = (img.height() as f32 * SHRINK_FACTOR) as u32;
                if new_w < MIN_WIDTH || new_h == 0 {
                    quality = QUALITY_MIN_SIZE;
                } else {
                    tracing::debug!(width = new_w, height = new_h, "shrinking to meet size budget");
                    img = imageops::resize(&img, new_w, new_h, FilterType::Lanczos3);
                    quality = QUALITY_AFTER_RESIZE;
                }
            }
            encoded = encode_jpeg(&img, quality)?;
        }

        tracing::info!(
            bytes = encoded.len(),
            quality,
            width = img.width(),
            height = img.height(),
            "compressed image"
        );
        Ok(encoded)
    }
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, MediaError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(img)
        .map_err(MediaError::Encode)?;
    Ok(buf)
}

/// Largest size with the same aspect ratio fitting in `max`×`max`.
fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    let scale = (max as f32 / width as f32).min(max as f32 / height as f32);
    (
        ((width as f32 * scale).round() as u32).clamp(1, max),
        ((height as f32 * scale).round() as u32).clamp(1, max),
    )
}

/// Composite `mark` in the bottom-right corner, scaled to a tenth of the width.
fn apply_watermark(base: &mut RgbaImage, mark: &DynamicImage) {
    let target_w = (base.width() as f32 * WATERMARK_SCALE) as u32;
    let aspect = mark.height() as f32 / mark.width().max(1) as f32;
    let target_h = (target_w as f32 * aspect) as u32;
    if target_w == 0 || target_h == 0 {
        tracing::debug!("image too small for a watermark");
        return;
    }

    let resized = imageops::resize(&mark.to_rgba8(), target_w, target_h, FilterType::Lanczos3);
    let padding = (base.width() as f32 * WATERMARK_PADDING) as i64;
    let x = base.width() as i64 - target_w as i64 - padding;
    let y = base.height() as i64 - target_h as i64 - padding;
    imageops::overlay(base, &resized, x, y);
}
