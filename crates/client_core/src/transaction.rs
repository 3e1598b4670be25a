use std::{fmt, sync::Arc, time::Duration};

use ledger_integration::{
    LedgerWriter, Receipt, SimulationResult, TransactionHandle, WalletConnector,
};
use shared::domain::{Subject, SubjectId, VoteDirection, VoteMark};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

use crate::{
    catalog::SubjectCatalog,
    error::VoteError,
    overlay::{OverlayEntry, VoteOverlayStore},
    EngineEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteStatus {
    Idle,
    WalletCheck,
    Simulating,
    Submitted,
    AwaitingConfirmation,
    Confirmed,
    Failed,
}

impl fmt::Display for VoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::WalletCheck => "wallet_check",
            Self::Simulating => "simulating",
            Self::Submitted => "submitted",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// The single vote allowed past `Idle` at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteTransaction {
    pub subject_id: SubjectId,
    pub direction: VoteDirection,
    pub status: VoteStatus,
    pub tx_handle: Option<TransactionHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedVote {
    pub subject_id: SubjectId,
    pub direction: VoteDirection,
    pub receipt: Receipt,
}

/// Optimistic state applied when a vote entered `Simulating`, kept so a
/// failure can undo exactly that.
struct Applied {
    subject_id: SubjectId,
    direction: VoteDirection,
    previous_mark: VoteMark,
}

/// Drives one vote at a time from request to confirmation or rollback, and
/// is the only writer of the vote overlay.
///
/// `request_vote` is not cancellation safe: dropping it mid-flight leaves the
/// slot occupied. Callers should run it on its own task, as the scheduler does.
pub struct VoteTransactionManager {
    ledger: Arc<dyn LedgerWriter>,
    wallet: Arc<dyn WalletConnector>,
    catalog: Arc<SubjectCatalog>,
    overlay: RwLock<VoteOverlayStore>,
    slot: Mutex<Option<VoteTransaction>>,
    confirmations: u32,
    confirmation_timeout: Duration,
    events: broadcast::Sender<EngineEvent>,
}

impl VoteTransactionManager {
    pub fn new(
        ledger: Arc<dyn LedgerWriter>,
        wallet: Arc<dyn WalletConnector>,
        catalog: Arc<SubjectCatalog>,
        confirmations: u32,
        confirmation_timeout: Duration,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            ledger,
            wallet,
            catalog,
            overlay: RwLock::new(VoteOverlayStore::new()),
            slot: Mutex::new(None),
            confirmations: confirmations.max(1),
            confirmation_timeout,
            events,
        }
    }

    pub async fn request_vote(
        &self,
        subject_id: SubjectId,
        direction: VoteDirection,
    ) -> Result<ConfirmedVote, VoteError> {
        {
            let mut slot = self.slot.lock().await;
            if let Some(in_flight) = slot.as_ref() {
                warn!(
                    subject_id = subject_id.0,
                    in_flight = in_flight.subject_id.0,
                    status = %in_flight.status,
                    "vote: rejected, another vote is in flight"
                );
                return Err(VoteError::TransactionInFlight {
                    in_flight: in_flight.subject_id,
                });
            }
            *slot = Some(VoteTransaction {
                subject_id,
                direction,
                status: VoteStatus::WalletCheck,
                tx_handle: None,
            });
        }
        self.emit_status(subject_id, direction, VoteStatus::WalletCheck);

        let result = self.run_pipeline(subject_id, direction).await;

        *self.slot.lock().await = None;
        self.emit_status(subject_id, direction, VoteStatus::Idle);
        result
    }

    async fn run_pipeline(
        &self,
        subject_id: SubjectId,
        direction: VoteDirection,
    ) -> Result<ConfirmedVote, VoteError> {
        if self.catalog.get(subject_id).await.is_none() {
            warn!(subject_id = subject_id.0, "vote: subject not in catalog");
            return Err(VoteError::UnknownSubject(subject_id));
        }

        if !self.wallet.is_connected().await {
            info!(subject_id = subject_id.0, "vote: wallet not connected, requesting connect");
            let _ = self.events.send(EngineEvent::ConnectRequired);
            self.wallet.request_connect().await;
            return Err(VoteError::WalletNotConnected);
        }

        let Some(applied) = self.apply_optimistic(subject_id, direction).await else {
            warn!(subject_id = subject_id.0, "vote: subject left the catalog before apply");
            return Err(VoteError::UnknownSubject(subject_id));
        };
        self.set_status(VoteStatus::Simulating).await;
        info!(subject_id = subject_id.0, %direction, "vote: simulating");

        let call = match self.ledger.simulate_vote(subject_id, direction).await {
            Ok(SimulationResult::Accepted(call)) => call,
            Ok(SimulationResult::Rejected { reason }) => {
                return Err(self.fail(applied, VoteError::SimulationRejected(reason)).await)
            }
            Err(err) => {
                return Err(self
                    .fail(applied, VoteError::SimulationRejected(format!("{err:#}")))
                    .await)
            }
        };

        let handle = match self.ledger.submit_vote(call).await {
            Ok(handle) => handle,
            Err(err) => {
                return Err(self
                    .fail(applied, VoteError::SubmissionFailed(format!("{err:#}")))
                    .await)
            }
        };
        {
            let mut slot = self.slot.lock().await;
            if let Some(tx) = slot.as_mut() {
                tx.status = VoteStatus::Submitted;
                tx.tx_handle = Some(handle.clone());
            }
        }
        self.emit_status(subject_id, direction, VoteStatus::Submitted);
        info!(subject_id = subject_id.0, handle = %handle, "vote: submitted");

        self.set_status(VoteStatus::AwaitingConfirmation).await;
        let waited = tokio::time::timeout(
            self.confirmation_timeout,
            self.ledger.await_confirmation(&handle, self.confirmations),
        )
        .await;
        let receipt = match waited {
            Err(_) => {
                let err = VoteError::ConfirmationTimedOut {
                    handle,
                    after: self.confirmation_timeout,
                };
                return Err(self.fail(applied, err).await);
            }
            Ok(Err(err)) => {
                let err = VoteError::ConfirmationFailed {
                    handle,
                    reason: format!("{err:#}"),
                };
                return Err(self.fail(applied, err).await);
            }
            Ok(Ok(receipt)) if !receipt.success => {
                let err = VoteError::ConfirmationFailed {
                    reason: format!("transaction reverted in block {}", receipt.block_number),
                    handle,
                };
                return Err(self.fail(applied, err).await);
            }
            Ok(Ok(receipt)) => receipt,
        };

        self.overlay.write().await.settle(subject_id);
        self.set_status(VoteStatus::Confirmed).await;
        info!(
            subject_id = subject_id.0,
            %direction,
            handle = %receipt.handle,
            block = receipt.block_number,
            "vote: confirmed"
        );
        let _ = self.events.send(EngineEvent::VoteConfirmed {
            subject_id,
            handle: receipt.handle.clone(),
        });

        Ok(ConfirmedVote {
            subject_id,
            direction,
            receipt,
        })
    }

    /// Reads the subject under the overlay lock so the baseline matches
    /// the snapshot the next reconcile compares against.
    async fn apply_optimistic(
        &self,
        subject_id: SubjectId,
        direction: VoteDirection,
    ) -> Option<Applied> {
        let mut overlay = self.overlay.write().await;
        let subject = self.catalog.get(subject_id).await?;
        overlay.apply(&subject, direction);
        let previous_mark = overlay.set_mark(subject_id, Some(direction));
        Some(Applied {
            subject_id,
            direction,
            previous_mark,
        })
    }

    /// Unwinds the optimistic write and passes `err` through.
    async fn fail(&self, applied: Applied, err: VoteError) -> VoteError {
        {
            let mut overlay = self.overlay.write().await;
            overlay.revert(applied.subject_id, applied.direction);
            overlay.set_mark(applied.subject_id, applied.previous_mark);
        }
        self.set_status(VoteStatus::Failed).await;
        warn!(
            subject_id = applied.subject_id.0,
            direction = %applied.direction,
            "vote: rolled back: {err}"
        );
        let _ = self.events.send(EngineEvent::VoteFailed {
            subject_id: applied.subject_id,
            error: err.clone(),
        });
        err
    }

    async fn set_status(&self, status: VoteStatus) {
        let current = {
            let mut slot = self.slot.lock().await;
            slot.as_mut().map(|tx| {
                tx.status = status;
                (tx.subject_id, tx.direction)
            })
        };
        if let Some((subject_id, direction)) = current {
            self.emit_status(subject_id, direction, status);
        }
    }

    fn emit_status(&self, subject_id: SubjectId, direction: VoteDirection, status: VoteStatus) {
        let _ = self.events.send(EngineEvent::VoteStatusChanged {
            subject_id,
            direction,
            status,
        });
    }

    /// Folds the catalog's current snapshot into the overlay. Returns
    /// cleared ids.
    ///
    /// The snapshot is read under the overlay lock, so reconciles that race
    /// each other all compare against the newest counts.
    pub async fn reconcile(&self) -> Vec<SubjectId> {
        let cleared = {
            let mut overlay = self.overlay.write().await;
            let subjects = self.catalog.list().await;
            overlay.reconcile(&subjects)
        };
        for subject_id in &cleared {
            info!(subject_id = subject_id.0, "reconcile: indexer caught up, overlay cleared");
            let _ = self.events.send(EngineEvent::OverlayCleared {
                subject_id: *subject_id,
            });
        }
        cleared
    }

    /// Snapshot of the in-flight vote, `None` when idle.
    pub async fn current(&self) -> Option<VoteTransaction> {
        self.slot.lock().await.clone()
    }

    pub async fn status(&self) -> VoteStatus {
        self.slot
            .lock()
            .await
            .as_ref()
            .map_or(VoteStatus::Idle, |tx| tx.status)
    }

    pub async fn effective_counts(&self, subject: &Subject) -> (u64, u64) {
        self.overlay.read().await.effective_counts(subject)
    }

    pub async fn mark(&self, subject_id: SubjectId) -> VoteMark {
        self.overlay.read().await.mark(subject_id)
    }

    pub async fn overlay_entry(&self, subject_id: SubjectId) -> Option<OverlayEntry> {
        self.overlay.read().await.entry(subject_id)
    }

    /// Subjects with local votes the indexer has not reported yet.
    pub async fn pending_subjects(&self) -> Vec<SubjectId> {
        self.overlay.read().await.pending_subjects()
    }

    /// Runs `f` against the overlay under one read lock.
    pub async fn with_overlay<R>(&self, f: impl FnOnce(&VoteOverlayStore) -> R) -> R {
        let overlay = self.overlay.read().await;
        f(&*overlay)
    }
}

#[cfg(test)]
#[path = "tests/transaction_tests.rs"]
mod tests;
