use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use crate::blockchain::{BlockRecord, Blockchain};
use crate::miner::{JobStatus, MiningService};

/// Shared application state: the chain (read by handlers, written only by
/// the mining worker) and the handle used to queue new payloads.
pub struct AppState {
    pub blockchain: Arc<RwLock<Blockchain>>,
    pub miner: MiningService,
}

impl AppState {
    pub fn new(blockchain: Arc<RwLock<Blockchain>>, miner: MiningService) -> Self {
        Self { blockchain, miner }
    }
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize)]
pub struct ChainResponse {
    pub length: usize,
    pub difficulty: u32,
    pub chain: Vec<BlockRecord>,
}

#[derive(Deserialize, Default)]
pub struct ValidateQuery {
    #[serde(default)]
    pub strict: bool,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub strict: bool,
    pub length: usize,
    pub difficulty: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/* ---------- Block submission Models ---------- */

#[derive(Deserialize)]
pub struct NewBlockRequest {
    #[serde(alias = "payload")]
    pub data: String,
}

#[derive(Deserialize, Default)]
pub struct SubmitQuery {
    /// Hold the request open until the block is sealed.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Serialize)]
pub struct JobResponse {
    pub job_id: String,
    #[serde(flatten)]
    pub status: JobStatus,
}
