use crate::config::CompressionConfig;
use crate::models::{jpeg_filename, AllowedMimeType, UploadedFile};
use axum::body::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode JPEG: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Failed to read upload: {0}")]
    Io(#[from] std::io::Error),

    #[error("Compression task failed: {0}")]
    Task(String),
}

#[derive(Debug)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Only PNG and JPEG uploads strictly larger than the threshold are re-encoded.
pub fn should_compress(
    mime_type: AllowedMimeType,
    size: u64,
    config: &CompressionConfig,
) -> bool {
    config.enabled && mime_type.is_image() && size > config.threshold_bytes
}

/// Decode, shrink to fit within `max_dimension` on both axes (never enlarging)
/// and re-encode as baseline JPEG. CPU bound; call from a blocking thread.
pub fn transcode_to_jpeg(
    data: &[u8],
    max_dimension: u32,
    quality: u8,
) -> Result<CompressedImage, CompressionError> {
    let img = image::load_from_memory(data).map_err(CompressionError::Decode)?;

    let (width, height) = img.dimensions();
    let img = if width > max_dimension || height > max_dimension {
        img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let (width, height) = rgb.dimensions();

    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    rgb.write_with_encoder(encoder).map_err(CompressionError::Encode)?;

    Ok(CompressedImage {
        bytes,
        width,
        height,
    })
}

/// Produce a JPEG replacement for `file`. The caller keeps the original on `Err`.
pub async fn try_compress(
    file: &UploadedFile,
    config: &CompressionConfig,
) -> Result<UploadedFile, CompressionError> {
    let data = file.read_bytes().await?;
    let max_dimension = config.max_dimension;
    let quality = config.jpeg_quality;

    let compressed =
        tokio::task::spawn_blocking(move || transcode_to_jpeg(&data, max_dimension, quality))
            .await
            .map_err(|e| CompressionError::Task(e.to_string()))??;

    tracing::info!(
        filename = %file.filename,
        original_size = file.size,
        compressed_size = compressed.bytes.len(),
        width = compressed.width,
        height = compressed.height,
        "Image compressed"
    );

    Ok(UploadedFile::in_memory(
        jpeg_filename(&file.filename),
        AllowedMimeType::Jpeg,
        Bytes::from(compressed.bytes),
    ))
}
