use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Subject, SubjectId, VoteDirection};

/// Query string for `GET /subjects` on the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSubjectsQuery {
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSubjectsResponse {
    pub subjects: Vec<Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub subject_id: SubjectId,
    pub direction: VoteDirection,
}

/// A vote call that passed simulation and can be sent as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedVoteCall {
    pub subject_id: SubjectId,
    pub direction: VoteDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calldata_hex: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResponse {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<PreparedVoteCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub handle: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptQuery {
    pub confirmations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptResponse {
    pub handle: String,
    pub block_number: u64,
    pub confirmations: u32,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentResponse {
    pub subject_id: SubjectId,
    pub content: String,
}
