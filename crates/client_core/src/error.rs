use std::time::Duration;

use ledger_integration::TransactionHandle;
use shared::domain::SubjectId;
use thiserror::Error;

/// Why a vote request ended without being confirmed. Every variant leaves the
/// engine idle with the optimistic state unwound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("a vote on subject {in_flight} is already in flight")]
    TransactionInFlight { in_flight: SubjectId },
    #[error("subject {0} is not in the catalog")]
    UnknownSubject(SubjectId),
    #[error("wallet is not connected")]
    WalletNotConnected,
    #[error("vote simulation rejected: {0}")]
    SimulationRejected(String),
    #[error("vote submission failed: {0}")]
    SubmissionFailed(String),
    #[error("confirmation for {handle} timed out after {after:?}")]
    ConfirmationTimedOut {
        handle: TransactionHandle,
        after: Duration,
    },
    #[error("confirmation for {handle} failed: {reason}")]
    ConfirmationFailed {
        handle: TransactionHandle,
        reason: String,
    },
}

impl VoteError {
    /// Whether optimistic state was applied (and then rolled back) before
    /// this error surfaced.
    pub fn rolled_back(&self) -> bool {
        matches!(
            self,
            Self::SimulationRejected(_)
                | Self::SubmissionFailed(_)
                | Self::ConfirmationTimedOut { .. }
                | Self::ConfirmationFailed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("content fetch for subject {subject_id} failed: {reason}")]
    FetchFailed {
        subject_id: SubjectId,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse settings file '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid url for {key}: {value}")]
    InvalidUrl { key: &'static str, value: String },
}
