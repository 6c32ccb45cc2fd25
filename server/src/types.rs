//! Request/response bodies for the HTTP surface — mirrors `rdm_server::types`,
//! generalized from one `DownloadRequest` shape to the manager's operation
//! set.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct NewDownloadRequest {
    pub owner_private_key_hex: Option<String>,
    pub file_id: String,
    pub destination_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct NewShareDownloadRequest {
    pub file_id: String,
    pub key_share_hex: String,
    pub owner_pubkey_hash_hex: String,
    pub destination_dir: String,
}

#[derive(Debug, Serialize)]
pub struct TaskIdResponse {
    pub task_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct QueryParams {
    #[serde(default)]
    pub start: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    pub status: Option<String>,
}

fn default_page_size() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub records: Vec<swarmdl_core::model::FileRecord>,
    pub total: usize,
    pub start: usize,
    pub page_size: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
