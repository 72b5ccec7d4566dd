//! Image intake: validate, downscale, and normalize to a JPEG data URL.
//!
//! Runs on the client side of the flow, before any request is sent. A
//! non-image payload is rejected here and never reaches the service.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat};
use thiserror::Error;
use tracing::info;

/// Maximum dimension (width or height) for images sent to the vision API.
pub const MAX_IMAGE_DIMENSION: u32 = 1024;

/// Minimum dimension for a usable diagnosis photo.
pub const MIN_IMAGE_DIMENSION: u32 = 64;

/// Cap on the encoded payload accepted for diagnosis.
pub const MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

/// Intake validation errors. These surface immediately to the user; no
/// request is sent for an invalid input.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Selected file is not a valid image: {0}")]
    NotAnImage(String),

    #[error("Image too small for reliable diagnosis: {width}x{height} (minimum {MIN_IMAGE_DIMENSION}px)")]
    TooSmall { width: u32, height: u32 },

    #[error("Image payload too large: {0} bytes (maximum {MAX_IMAGE_BYTES})")]
    TooLarge(usize),

    #[error("Invalid base64 image encoding: {0}")]
    InvalidEncoding(String),
}

/// Prepare a captured image for diagnosis: decode, validate, downscale to
/// max 1024px on the longest edge, and re-encode as a JPEG data URL.
///
/// Accepts either a `data:` URL or a bare base64 string.
///
/// # Errors
/// - Payload exceeds [`MAX_IMAGE_BYTES`]
/// - Not decodable base64
/// - Bytes are not a decodable image
/// - Image below [`MIN_IMAGE_DIMENSION`] on its shortest side
pub fn prepare_image(input: &str) -> Result<String, IntakeError> {
    if input.len() > MAX_IMAGE_BYTES {
        return Err(IntakeError::TooLarge(input.len()));
    }

    let encoded = strip_data_url(input);
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| IntakeError::InvalidEncoding(e.to_string()))?;

    let img = image::load_from_memory(&bytes).map_err(|e| IntakeError::NotAnImage(e.to_string()))?;

    let (width, height) = (img.width(), img.height());
    if width.min(height) < MIN_IMAGE_DIMENSION {
        return Err(IntakeError::TooSmall { width, height });
    }

    let resized = resize_if_needed(img, MAX_IMAGE_DIMENSION);
    info!(
        "Prepared diagnosis image: {}x{} -> {}x{}",
        width,
        height,
        resized.width(),
        resized.height()
    );

    let jpeg = encode_to_jpeg(&resized)?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg)))
}

/// Drop a `data:<mime>;base64,` prefix if present.
fn strip_data_url(input: &str) -> &str {
    match input.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, b64)| b64).unwrap_or(rest),
        None => input,
    }
}

/// Resize if either dimension exceeds max, maintaining aspect ratio.
fn resize_if_needed(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    if width <= max_dimension && height <= max_dimension {
        return img;
    }
    let scale = max_dimension as f32 / width.max(height) as f32;
    let new_width = (width as f32 * scale) as u32;
    let new_height = (height as f32 * scale) as u32;
    img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3)
}

fn encode_to_jpeg(img: &DynamicImage) -> Result<Vec<u8>, IntakeError> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Jpeg)
        .map_err(|e| IntakeError::NotAnImage(format!("JPEG encoding failed: {e}")))?;
    Ok(buffer.into_inner())
}
