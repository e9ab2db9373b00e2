//! Raster decoding shared by the format and aspect-ratio validators
//!
//! Images are decoded in full, so a buffer with valid headers but missing
//! or corrupt pixel data is rejected.

use image::{GenericImageView, ImageFormat};
use log::debug;

/// Pixel dimensions of a decoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Decode `data` as `format`, or as whatever format its signature names
/// when `format` is `None`.
pub fn decode(data: &[u8], format: Option<ImageFormat>) -> Option<Dimensions> {
    let decoded = match format {
        Some(format) => image::load_from_memory_with_format(data, format),
        None => image::load_from_memory(data),
    };
    match decoded {
        Ok(image) => {
            let (width, height) = image.dimensions();
            Some(Dimensions { width, height })
        }
        Err(e) => {
            debug!("Image decode failed: {}", e);
            None
        }
    }
}
