//! Upload validation, downsizing and JPEG/base64 encoding for the vision API.
//!
//! Images are capped at 900px on the long edge and recompressed so the base64
//! payload stays under the endpoint's request size limit.

use base64::{engine::general_purpose, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use crate::error::NutriError;
use crate::models::{EncodedPayload, PreparedImage, UploadedImage};

/// Largest upload accepted before any decoding happens (4 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 4 * 1024 * 1024;

/// Maximum width or height of a prepared image.
pub const MAX_IMAGE_DIMENSION: u32 = 900;

/// Quality of the intermediate compression during preparation.
pub const PREPARE_JPEG_QUALITY: u8 = 75;

/// Quality of the JPEG that is base64-encoded into the request.
pub const PAYLOAD_JPEG_QUALITY: u8 = 80;

pub fn check_upload_size(upload: &UploadedImage) -> Result<(), NutriError> {
    check_declared_size(upload.declared_size)
}

/// Size check for callers that know the size before holding the bytes.
pub fn check_declared_size(size: u64) -> Result<(), NutriError> {
    if size > MAX_UPLOAD_BYTES {
        return Err(NutriError::UploadTooLarge {
            size,
            limit: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}

/// Decode, convert to RGB, shrink to fit 900x900 and recompress at quality 75.
///
/// The returned image is the decoded JPEG, not the resized bitmap, so whatever
/// the upload format was the later quality-80 encode starts from JPEG state.
pub fn prepare_image(upload: &UploadedImage) -> Result<PreparedImage, NutriError> {
    let decoded = image::load_from_memory(&upload.bytes).map_err(NutriError::Decode)?;
    log::debug!(
        "🖼️ Decoded upload: {}x{} ({} bytes)",
        decoded.width(),
        decoded.height(),
        upload.bytes.len()
    );

    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    let resized = resize_to_fit(rgb, MAX_IMAGE_DIMENSION);

    let jpeg = encode_jpeg(&resized, PREPARE_JPEG_QUALITY)?;
    let reloaded =
        image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).map_err(NutriError::Decode)?;

    log::info!(
        "📐 Prepared image: {}x{} ({} bytes as JPEG q{})",
        reloaded.width(),
        reloaded.height(),
        jpeg.len(),
        PREPARE_JPEG_QUALITY
    );

    Ok(PreparedImage::new(reloaded))
}

/// JPEG (quality 80) then standard base64, no line wrapping.
pub fn encode_image_to_base64(image: &PreparedImage) -> Result<String, NutriError> {
    let jpeg = encode_jpeg(image.as_dynamic(), PAYLOAD_JPEG_QUALITY)?;
    let encoded = general_purpose::STANDARD.encode(&jpeg);
    log::debug!(
        "🔄 Encoded payload: {} JPEG bytes -> {} base64 chars",
        jpeg.len(),
        encoded.len()
    );
    Ok(encoded)
}

pub fn encode_payload(image: &PreparedImage) -> Result<EncodedPayload, NutriError> {
    encode_image_to_base64(image).map(EncodedPayload::new)
}

/// Target size that fits `max_dimension` on both edges with the aspect ratio
/// kept. Never grows an image.
fn fit_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width <= max_dimension && height <= max_dimension {
        return (width, height);
    }

    let long = width.max(height) as u64;
    let short = width.min(height) as u64;
    let max = max_dimension as u64;
    let scaled_short = ((short * max + long / 2) / long).max(1) as u32;

    if width >= height {
        (max_dimension, scaled_short)
    } else {
        (scaled_short, max_dimension)
    }
}

fn resize_to_fit(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    let (new_width, new_height) = fit_dimensions(width, height, max_dimension);

    if (new_width, new_height) == (width, height) {
        return img;
    }

    img.resize_exact(new_width, new_height, FilterType::CatmullRom)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, NutriError> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    img.write_with_encoder(encoder).map_err(NutriError::Encode)?;
    Ok(buffer)
}
