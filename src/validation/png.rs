//! PNG format validator

use crate::validation::decode::decode;
use crate::validation::{ValidationError, Validator};
use image::ImageFormat;

/// Accepts buffers that decode as a PNG image
pub struct PngValidator;

impl Validator for PngValidator {
    fn name(&self) -> &'static str {
        "png"
    }

    fn matches(&self, token: &str) -> bool {
        token == "png"
    }

    fn validate(&self, data: &[u8], _token: &str) -> Result<(), ValidationError> {
        decode(data, Some(ImageFormat::Png))
            .map(|_| ())
            .ok_or_else(|| ValidationError::new("The image specified is not a png"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::fixtures;

    #[test]
    fn test_png_validator() {
        let validator = PngValidator;
        assert!(validator.matches("png"));
        assert!(!validator.matches("jpeg"));

        assert!(validator.validate(&fixtures::png(3, 2), "png").is_ok());
        assert!(validator.validate(&fixtures::jpeg(3, 2), "png").is_err());
        assert!(validator.validate(b"", "png").is_err());
    }

    #[test]
    fn test_png_without_image_data_is_rejected() {
        let validator = PngValidator;
        let full = fixtures::png(3, 2);
        assert!(validator.validate(&full[..33], "png").is_err());

        let mut corrupt = full.clone();
        corrupt[20] ^= 0xFF;
        assert!(validator.validate(&corrupt, "png").is_err());
    }
}
