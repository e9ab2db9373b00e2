//! JSON parameters and results of the API operations

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub key: String,
    pub partition: String,
    #[serde(default)]
    pub relative_path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResult {
    pub size: u64,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub key: String,
    pub partition: String,
    #[serde(default)]
    pub relative_path: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyParams {
    pub sudo_key: String,
    #[serde(default)]
    pub partitions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateKeyResult {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteKeyParams {
    pub sudo_key: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePartitionParams {
    pub sudo_key: String,
    pub name: String,
    #[serde(default)]
    pub rule_set: String,
}

#[derive(Debug, Deserialize)]
pub struct DeletePartitionParams {
    pub sudo_key: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SweepOrphansParams {
    pub sudo_key: String,
}
