//! Content validation pipeline
//!
//! A validation policy is a `+`-delimited list of tokens such as `jpeg+16:9`.
//! Each token is checked by every registered validator whose `matches`
//! accepts it; the first failure aborts the pipeline with that validator's
//! reason. New formats register a `Validator` without touching the pipeline.

pub mod aspect_ratio;
pub mod decode;
pub mod jpeg;
pub mod png;
pub mod svg;

use bytes::Bytes;
use log::debug;
use thiserror::Error;

/// A validator rejection; the reason is shown to the client verbatim
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Capability shared by all content validators
pub trait Validator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether this validator handles a policy token
    fn matches(&self, token: &str) -> bool;

    /// Check the whole buffer against a token this validator matched
    fn validate(&self, data: &[u8], token: &str) -> Result<(), ValidationError>;
}

/// Registry of validators, built once at startup and shared by reference
pub struct ValidationPipeline {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidationPipeline {
    /// An empty pipeline; no policy is satisfiable until validators register
    pub fn new() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    /// Pipeline with the built-in format and aspect-ratio validators
    pub fn with_builtin() -> Self {
        let mut pipeline = Self::new();
        pipeline.register(Box::new(jpeg::JpegValidator));
        pipeline.register(Box::new(png::PngValidator));
        pipeline.register(Box::new(svg::SvgValidator));
        pipeline.register(Box::new(aspect_ratio::AspectRatioValidator));
        pipeline
    }

    pub fn register(&mut self, validator: Box<dyn Validator>) {
        debug!("Registered validator {}", validator.name());
        self.validators.push(validator);
    }

    fn tokens(policy: &str) -> impl Iterator<Item = &str> {
        policy.split('+')
    }

    /// True when every token of the policy is handled by some validator.
    /// An empty policy has no satisfiable token and is rejected.
    pub fn is_satisfiable(&self, policy: &str) -> bool {
        Self::tokens(policy).all(|token| self.validators.iter().any(|v| v.matches(token)))
    }

    /// Run every matching validator for every token against the full buffer.
    /// Returns the buffer unchanged when all validators accept it.
    pub fn execute(&self, data: Bytes, policy: &str) -> Result<Bytes, ValidationError> {
        for token in Self::tokens(policy) {
            for validator in self.validators.iter().filter(|v| v.matches(token)) {
                validator.validate(&data, token).map_err(|e| {
                    debug!("Validator {} rejected token {}: {}", validator.name(), token, e);
                    e
                })?;
            }
        }
        Ok(data)
    }
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::with_builtin()
    }
}
