//! JPEG format validator

use crate::validation::decode::decode;
use crate::validation::{ValidationError, Validator};
use image::ImageFormat;

/// Accepts buffers that decode as a JPEG image
pub struct JpegValidator;

impl Validator for JpegValidator {
    fn name(&self) -> &'static str {
        "jpeg"
    }

    fn matches(&self, token: &str) -> bool {
        token == "jpeg" || token == "jpg"
    }

    fn validate(&self, data: &[u8], _token: &str) -> Result<(), ValidationError> {
        decode(data, Some(ImageFormat::Jpeg))
            .map(|_| ())
            .ok_or_else(|| ValidationError::new("The image specified is not a jpeg"))
    }
}
