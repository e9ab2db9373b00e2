//! Superuser authentication for administrative operations

use crate::error::GatewayError;
use log::warn;

/// Constant-time byte comparison; only the length is allowed to leak
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// The configured superuser secret
#[derive(Clone)]
pub struct SudoKey {
    secret: Vec<u8>,
}

impl SudoKey {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// `Unauthorized` unless `candidate` equals the secret. An empty secret
    /// never authenticates anyone.
    pub fn verify(&self, candidate: &str) -> Result<(), GatewayError> {
        if !self.secret.is_empty() && constant_time_eq(&self.secret, candidate.as_bytes()) {
            return Ok(());
        }
        warn!("Rejected administrative request with an invalid sudo key");
        Err(GatewayError::Unauthorized)
    }
}

impl std::fmt::Debug for SudoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SudoKey(<redacted>)")
    }
}
