use thiserror::Error;

#[derive(Debug, Error)]
pub enum NutriError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Image too large ({size} bytes). Upload < {limit_mb}MB.", limit_mb = .limit / (1024 * 1024))]
    UploadTooLarge { size: u64, limit: u64 },

    #[error("Unsupported image format: {0}. Upload a JPG or PNG.")]
    UnsupportedFormat(String),

    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode image to JPEG: {0}")]
    Encode(#[source] image::ImageError),
}
