//! Optimistic vote reconciliation engine.
//!
//! Votes show up in the UI immediately through a local overlay, are driven
//! through simulate/submit/confirm against the ledger one at a time, and are
//! folded away once the indexer reports them.

use anyhow::Result;
use async_trait::async_trait;
use ledger_integration::{TransactionHandle, WalletConnector};
use shared::{
    domain::{SubjectId, VoteDirection},
    protocol::ListSubjectsResponse,
};
use tracing::info;

pub mod catalog;
pub mod config;
pub mod content_loader;
pub mod error;
pub mod overlay;
pub mod scheduler;
pub mod transaction;
pub mod transport;

pub use catalog::SubjectCatalog;
pub use config::EngineSettings;
pub use content_loader::{ActiveSubjectContentLoader, FetchToken, LoadedContent};
pub use error::{CatalogError, ConfigError, ContentError, VoteError};
pub use overlay::{OverlayEntry, VoteOverlayStore};
pub use scheduler::{ReconciliationScheduler, SubjectView, VoteReport};
pub use transaction::{ConfirmedVote, VoteStatus, VoteTransaction, VoteTransactionManager};
pub use transport::{HttpIndexerClient, HttpLedgerGateway};

/// Read side of the external indexer.
#[async_trait]
pub trait IndexerClient: Send + Sync {
    /// Up to `limit` subjects, ordered by subject id, plus the time the
    /// indexer took the snapshot when it reports one.
    async fn query_catalog(&self, limit: u32) -> Result<ListSubjectsResponse>;
}

/// Wallet whose connection state is fixed at startup.
pub struct StaticWallet {
    account: Option<String>,
}

impl StaticWallet {
    pub fn new(account: Option<String>) -> Self {
        Self { account }
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }
}

#[async_trait]
impl WalletConnector for StaticWallet {
    async fn is_connected(&self) -> bool {
        self.account.is_some()
    }

    async fn request_connect(&self) {
        info!("wallet: connection requested; set APP__WALLET_ACCOUNT to connect");
    }
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    CatalogRefreshed {
        subjects: usize,
    },
    CatalogUnavailable(String),
    ConnectRequired,
    VoteStatusChanged {
        subject_id: SubjectId,
        direction: VoteDirection,
        status: VoteStatus,
    },
    VoteConfirmed {
        subject_id: SubjectId,
        handle: TransactionHandle,
    },
    VoteFailed {
        subject_id: SubjectId,
        error: VoteError,
    },
    OverlayCleared {
        subject_id: SubjectId,
    },
    ContentLoaded {
        subject_id: SubjectId,
        fallback: bool,
    },
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
