use std::fmt;

use async_trait::async_trait;
pub use shared::protocol::PreparedVoteCall;
use shared::domain::{SubjectId, VoteDirection};

/// Opaque identifier the ledger assigns to a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionHandle(pub String);

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a dry run. `Rejected` means the call would revert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationResult {
    Accepted(PreparedVoteCall),
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub handle: TransactionHandle,
    pub block_number: u64,
    pub confirmations: u32,
    pub success: bool,
}

#[async_trait]
pub trait LedgerWriter: Send + Sync {
    async fn simulate_vote(
        &self,
        subject_id: SubjectId,
        direction: VoteDirection,
    ) -> anyhow::Result<SimulationResult>;
    async fn submit_vote(&self, call: PreparedVoteCall) -> anyhow::Result<TransactionHandle>;
    async fn await_confirmation(
        &self,
        handle: &TransactionHandle,
        confirmations: u32,
    ) -> anyhow::Result<Receipt>;
}

#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn get_content(&self, subject_id: SubjectId) -> anyhow::Result<String>;
}

#[async_trait]
pub trait WalletConnector: Send + Sync {
    async fn is_connected(&self) -> bool;
    /// Hands off to whatever flow owns wallet connection. Does not wait for it.
    async fn request_connect(&self);
}
