//! Aspect ratio validator for `W:H` policy tokens

use crate::validation::decode::decode;
use crate::validation::{ValidationError, Validator};

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Reduce `width:height` to lowest terms, e.g. 1920x1080 is `"16:9"`.
/// A zero on either side yields `"0:0"`.
pub fn aspect_ratio(width: u64, height: u64) -> String {
    if width == 0 || height == 0 {
        return "0:0".to_string();
    }
    let divisor = gcd(width, height);
    format!("{}:{}", width / divisor, height / divisor)
}

fn is_ratio_token(token: &str) -> bool {
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    matches!(token.split_once(':'), Some((w, h)) if digits(w) && digits(h))
}

/// Accepts decodable PNG or JPEG images whose reduced ratio equals the token
pub struct AspectRatioValidator;

impl Validator for AspectRatioValidator {
    fn name(&self) -> &'static str {
        "aspect-ratio"
    }

    fn matches(&self, token: &str) -> bool {
        is_ratio_token(token)
    }

    fn validate(&self, data: &[u8], token: &str) -> Result<(), ValidationError> {
        let dimensions = decode(data, None)
            .ok_or_else(|| ValidationError::new("The image specified is not a valid image"))?;
        if aspect_ratio(u64::from(dimensions.width), u64::from(dimensions.height)) != token {
            return Err(ValidationError::new(
                "The image specified does not match the aspect ratio",
            ));
        }
        Ok(())
    }
}
