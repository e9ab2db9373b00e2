//! Gateway error taxonomy
//!
//! Every store-level failure is classified where it happens (ledger, registry,
//! blob adapter) and re-surfaced as one of these kinds. Internal errors carry
//! the backend detail for the server log only; clients always see an opaque
//! "Internal Server Error".

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::error;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the orchestration boundary
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid key")]
    UnknownKey,

    #[error("{0}")]
    InvalidPartition(String),

    #[error("{0}")]
    InvalidPath(String),

    #[error("File is too large for partition")]
    QuotaExceeded,

    #[error("Upload exceeds the maximum size of {limit} bytes")]
    UploadTooLarge { limit: u64 },

    #[error("{0}")]
    ValidationFailed(String),

    #[error("{0}")]
    InvalidHeaders(String),

    #[error("Partition already exists")]
    PartitionExists,

    #[error("Partition does not exist")]
    PartitionNotExists,

    #[error("Invalid rule set: {0}")]
    InvalidRuleSet(String),

    #[error("No partitions specified")]
    PartitionsEmpty,

    #[error("{0}")]
    InvalidType(String),

    #[error("Invalid JSON")]
    InvalidJson,

    #[error("Invalid key")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Log a backend failure in full and return the opaque internal error
    pub fn internal(context: &str, detail: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, detail);
        GatewayError::Internal(format!("{}: {}", context, detail))
    }

    /// Stable machine-readable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::UnknownKey | GatewayError::Unauthorized => "invalid_key",
            GatewayError::InvalidPartition(_) | GatewayError::PartitionNotExists => "invalid_partition",
            GatewayError::InvalidPath(_) => "invalid_path",
            GatewayError::QuotaExceeded | GatewayError::UploadTooLarge { .. } => "too_large",
            GatewayError::ValidationFailed(_) => "validation_failed",
            GatewayError::InvalidHeaders(_) => "invalid_headers",
            GatewayError::PartitionExists => "partition_exists",
            GatewayError::InvalidRuleSet(_) => "invalid_rule_set",
            GatewayError::PartitionsEmpty => "partitions_empty",
            GatewayError::InvalidType(_) => "invalid_type",
            GatewayError::InvalidJson => "invalid_json",
            GatewayError::Internal(_) => "internal_server_error",
        }
    }

    /// Message sent to clients; internal detail never leaves the server
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::Internal(_) => "Internal Server Error".to_string(),
            GatewayError::InvalidRuleSet(_) => "Invalid rule set".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::UnknownKey
            | GatewayError::InvalidPartition(_)
            | GatewayError::InvalidPath(_) => StatusCode::NOT_FOUND,
            GatewayError::QuotaExceeded | GatewayError::UploadTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(("Cache-Control", "no-cache"))
            .insert_header(("Access-Control-Allow-Origin", "*"))
            .json(ErrorBody {
                code: self.code(),
                message: self.client_message(),
            })
    }
}
