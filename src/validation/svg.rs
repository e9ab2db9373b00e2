//! SVG validator
//!
//! The buffer must be a well-formed XML document whose root element is
//! `svg`, optionally namespace-prefixed. Doctype declarations are allowed.

use crate::validation::{ValidationError, Validator};
use log::debug;
use roxmltree::{Document, ParsingOptions};

fn has_svg_root(data: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(data) else {
        return false;
    };
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);

    let mut options = ParsingOptions::default();
    options.allow_dtd = true;
    match Document::parse_with_options(text, options) {
        Ok(doc) => doc.root_element().tag_name().name() == "svg",
        Err(e) => {
            debug!("SVG parse failed: {}", e);
            false
        }
    }
}

/// Accepts well-formed documents whose root element is `svg`
pub struct SvgValidator;

impl Validator for SvgValidator {
    fn name(&self) -> &'static str {
        "svg"
    }

    fn matches(&self, token: &str) -> bool {
        token == "svg"
    }

    fn validate(&self, data: &[u8], _token: &str) -> Result<(), ValidationError> {
        if has_svg_root(data) {
            Ok(())
        } else {
            Err(ValidationError::new("The image specified is not a svg"))
        }
    }
}
