//! HTTP API
//!
//! Everything goes through `POST /_api`. The `X-Type` header names the
//! operation; its JSON parameters come from the `X-Json-Body` header or, for
//! every operation except `Upload`, from the request body. An upload's body
//! is the file itself, described by `Content-Length` and `Content-Type`.

pub mod requests;

use crate::app_state::AppState;
use crate::error::GatewayError;
use crate::service::{DeleteRequest, UploadRequest};
use actix_web::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, HttpResponseBuilder};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use log::{debug, info};
use requests::{
    CreateKeyParams, CreateKeyResult, CreatePartitionParams, DeleteKeyParams, DeleteParams,
    DeletePartitionParams, SweepOrphansParams, UploadParams, UploadResult,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Largest JSON parameter document accepted
pub const MAX_JSON_SIZE: usize = 100 * 1024;

const TYPE_HEADER: &str = "X-Type";
const JSON_BODY_HEADER: &str = "X-Json-Body";

/// The closed set of operations the API dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOperation {
    Upload,
    Delete,
    CreateKey,
    DeleteKey,
    CreatePartition,
    DeletePartition,
    SweepOrphans,
}

impl ApiOperation {
    pub const ALL: [ApiOperation; 7] = [
        ApiOperation::Upload,
        ApiOperation::Delete,
        ApiOperation::CreateKey,
        ApiOperation::DeleteKey,
        ApiOperation::CreatePartition,
        ApiOperation::DeletePartition,
        ApiOperation::SweepOrphans,
    ];

    /// Name as sent in `X-Type`
    pub fn as_str(self) -> &'static str {
        match self {
            ApiOperation::Upload => "Upload",
            ApiOperation::Delete => "Delete",
            ApiOperation::CreateKey => "CreateKey",
            ApiOperation::DeleteKey => "DeleteKey",
            ApiOperation::CreatePartition => "CreatePartition",
            ApiOperation::DeletePartition => "DeletePartition",
            ApiOperation::SweepOrphans => "SweepOrphans",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }
}

/// Register the API route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/_api", web::post().to(api_handler));
}

fn header_str<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Declared body length, `None` when the header is absent
fn content_length(req: &HttpRequest) -> Result<Option<u64>, GatewayError> {
    match req.headers().get(CONTENT_LENGTH) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Some)
            .ok_or_else(|| GatewayError::InvalidHeaders("Invalid Content-Length header".to_string())),
    }
}

fn respond(status: StatusCode) -> HttpResponseBuilder {
    let mut builder = HttpResponse::build(status);
    builder
        .insert_header((CACHE_CONTROL, "no-cache"))
        .insert_header((ACCESS_CONTROL_ALLOW_ORIGIN, "*"));
    builder
}

fn json_response<T: Serialize>(body: &T) -> HttpResponse {
    respond(StatusCode::OK).json(body)
}

fn no_content() -> HttpResponse {
    respond(StatusCode::NO_CONTENT)
        .insert_header((CONTENT_TYPE, "application/json"))
        .finish()
}

/// Raw JSON parameters from `X-Json-Body`, or from the body when allowed
async fn json_source(req: &HttpRequest, body: Option<&mut web::Payload>) -> Result<Bytes, GatewayError> {
    if let Some(header) = req.headers().get(JSON_BODY_HEADER) {
        return Ok(Bytes::copy_from_slice(header.as_bytes()));
    }
    let payload = body.ok_or(GatewayError::InvalidJson)?;

    let mut buffer = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| {
            debug!("Error reading JSON body: {}", e);
            GatewayError::InvalidJson
        })?;
        if buffer.len() + chunk.len() > MAX_JSON_SIZE {
            debug!("JSON body exceeds {} bytes", MAX_JSON_SIZE);
            return Err(GatewayError::InvalidJson);
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

async fn read_params<T: DeserializeOwned>(
    req: &HttpRequest,
    body: Option<&mut web::Payload>,
) -> Result<T, GatewayError> {
    let raw = json_source(req, body).await?;
    serde_json::from_slice(&raw).map_err(|e| {
        debug!("Invalid JSON parameters: {}", e);
        GatewayError::InvalidJson
    })
}

/// `POST /_api`
pub async fn api_handler(
    req: HttpRequest,
    mut payload: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    log_mdc::clear();
    let name = header_str(&req, TYPE_HEADER)
        .ok_or_else(|| GatewayError::InvalidType("X-Type header is required".to_string()))?;
    let operation = ApiOperation::from_name(name).ok_or_else(|| {
        debug!("Unknown operation {:?}", name);
        GatewayError::InvalidType("Invalid type".to_string())
    })?;
    log_mdc::insert("operation", operation.as_str());
    debug!("Handling {} request", operation.as_str());

    match operation {
        ApiOperation::Upload => {
            let params: UploadParams = read_params(&req, None).await?;
            log_mdc::insert("partition", &params.partition);
            let request = UploadRequest {
                key: params.key,
                partition: params.partition,
                relative_path: params.relative_path,
                content_length: content_length(&req)?,
                content_type: header_str(&req, CONTENT_TYPE.as_str()).map(str::to_string),
            };
            let size = state.uploads.upload(request, payload).await?;
            Ok(json_response(&UploadResult { size }))
        }
        ApiOperation::Delete => {
            let params: DeleteParams = read_params(&req, Some(&mut payload)).await?;
            log_mdc::insert("partition", &params.partition);
            state
                .uploads
                .delete(DeleteRequest {
                    key: params.key,
                    partition: params.partition,
                    relative_path: params.relative_path,
                })
                .await?;
            Ok(no_content())
        }
        ApiOperation::CreateKey => {
            let params: CreateKeyParams = read_params(&req, Some(&mut payload)).await?;
            state.sudo_key.verify(&params.sudo_key)?;
            let key = state.partitions.create_key(&params.partitions)?;
            Ok(json_response(&CreateKeyResult { key }))
        }
        ApiOperation::DeleteKey => {
            let params: DeleteKeyParams = read_params(&req, Some(&mut payload)).await?;
            state.sudo_key.verify(&params.sudo_key)?;
            state.partitions.delete_key(&params.key)?;
            Ok(no_content())
        }
        ApiOperation::CreatePartition => {
            let params: CreatePartitionParams = read_params(&req, Some(&mut payload)).await?;
            state.sudo_key.verify(&params.sudo_key)?;
            log_mdc::insert("partition", &params.name);
            state.partitions.create_partition(&params.name, &params.rule_set)?;
            Ok(no_content())
        }
        ApiOperation::DeletePartition => {
            let params: DeletePartitionParams = read_params(&req, Some(&mut payload)).await?;
            state.sudo_key.verify(&params.sudo_key)?;
            log_mdc::insert("partition", &params.name);
            let report = state.partitions.delete_partition(&params.name).await?;
            info!(
                "Partition {} deleted, {} of {} files removed",
                params.name, report.removed, report.dispatched
            );
            Ok(no_content())
        }
        ApiOperation::SweepOrphans => {
            let params: SweepOrphansParams = read_params(&req, Some(&mut payload)).await?;
            state.sudo_key.verify(&params.sudo_key)?;
            let report = state.sweeper.sweep_orphans().await?;
            Ok(json_response(&report))
        }
    }
}
