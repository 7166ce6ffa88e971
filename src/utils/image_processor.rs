use image::ImageFormat;
use std::io::Cursor;

use crate::models::settings::VariantConfig;

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("failed to decode image: {0}")]
    Decode(image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(image::ImageError),
    #[error("no encoder for {0:?}")]
    Unsupported(ImageFormat),
}

/// Resizes an image for a variant and re-encodes it in its source format.
pub fn process_image(data: &[u8], config: &VariantConfig) -> Result<Vec<u8>, ThumbnailError> {
    let format = image::guess_format(data).map_err(ThumbnailError::Decode)?;
    // The rendition keeps the source's path and mime, so the bytes must keep its format.
    if !format.writing_enabled() {
        return Err(ThumbnailError::Unsupported(format));
    }
    let mut img = image::load_from_memory_with_format(data, format).map_err(ThumbnailError::Decode)?;

    let filter = image::imageops::FilterType::Lanczos3;
    let fit = config.fit.as_deref().unwrap_or("contain");

    if let (Some(w), Some(h)) = (config.width, config.height) {
        match fit {
            "cover" | "center-crop" => {
                img = img.resize_to_fill(w, h, filter);
            }
            "fill" | "stretch" | "exact" => {
                img = img.resize_exact(w, h, filter);
            }
            _ => {
                img = img.resize(w, h, filter);
            }
        }
    } else if let Some(w) = config.width {
        // Keep the aspect ratio, never upscale.
        if img.width() > w {
            img = img.resize(w, u32::MAX, filter);
        }
    } else if let Some(h) = config.height {
        if img.height() > h {
            img = img.resize(u32::MAX, h, filter);
        }
    } else if let (Some(w), Some(h)) = (config.max_width, config.max_height) {
        if img.width() > w || img.height() > h {
            img = img.resize(w, h, filter);
        }
    }

    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, format)
        .map_err(ThumbnailError::Encode)?;

    Ok(buffer.into_inner())
}
