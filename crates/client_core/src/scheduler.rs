use std::{sync::Arc, time::Duration};

use ledger_integration::{LedgerReader, LedgerWriter, WalletConnector};
use shared::domain::{Subject, SubjectId, VoteDirection, VoteMark};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    catalog::SubjectCatalog,
    config::EngineSettings,
    content_loader::ActiveSubjectContentLoader,
    error::{CatalogError, VoteError},
    transaction::{ConfirmedVote, VoteTransactionManager},
    EngineEvent, IndexerClient,
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A subject as the UI should render it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectView {
    pub subject: Subject,
    pub likes: u64,
    pub dislikes: u64,
    pub mark: VoteMark,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReport {
    pub vote: ConfirmedVote,
    /// Whether the indexer had caught up before the follow-up refreshes ran out.
    pub reconciled: bool,
}

/// Turns vote intents into transactions and keeps the catalog and overlay
/// converging after each confirmation.
pub struct ReconciliationScheduler {
    catalog: Arc<SubjectCatalog>,
    manager: Arc<VoteTransactionManager>,
    content: Arc<ActiveSubjectContentLoader>,
    confirmed_sync_attempts: usize,
    confirmed_sync_delay: Duration,
    refresh_interval: Duration,
    events: broadcast::Sender<EngineEvent>,
}

impl ReconciliationScheduler {
    pub fn new_with_dependencies(
        settings: &EngineSettings,
        indexer: Arc<dyn IndexerClient>,
        ledger: Arc<dyn LedgerWriter>,
        reader: Arc<dyn LedgerReader>,
        wallet: Arc<dyn WalletConnector>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let catalog = Arc::new(SubjectCatalog::new(indexer, settings.catalog_limit));
        let manager = Arc::new(VoteTransactionManager::new(
            ledger,
            wallet,
            Arc::clone(&catalog),
            settings.confirmations,
            settings.confirmation_timeout(),
            events.clone(),
        ));
        let content = Arc::new(ActiveSubjectContentLoader::new(
            reader,
            settings.content_fallback.clone(),
            events.clone(),
        ));
        Arc::new(Self {
            catalog,
            manager,
            content,
            confirmed_sync_attempts: settings.confirmed_sync_attempts.max(1),
            confirmed_sync_delay: settings.confirmed_sync_delay(),
            refresh_interval: settings.refresh_interval(),
            events,
        })
    }

    pub fn catalog(&self) -> &Arc<SubjectCatalog> {
        &self.catalog
    }

    pub fn manager(&self) -> &Arc<VoteTransactionManager> {
        &self.manager
    }

    pub fn content(&self) -> &Arc<ActiveSubjectContentLoader> {
        &self.content
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Pulls authoritative counts and reconciles the overlay against them.
    /// On failure the stale snapshot stays in place.
    pub async fn refresh(&self) -> Result<Vec<Subject>, CatalogError> {
        match self.catalog.refresh().await {
            Ok(subjects) => {
                self.manager.reconcile().await;
                let _ = self.events.send(EngineEvent::CatalogRefreshed {
                    subjects: subjects.len(),
                });
                Ok(subjects)
            }
            Err(err) => {
                let _ = self
                    .events
                    .send(EngineEvent::CatalogUnavailable(err.to_string()));
                Err(err)
            }
        }
    }

    pub async fn request_vote(
        &self,
        subject_id: SubjectId,
        direction: VoteDirection,
    ) -> Result<VoteReport, VoteError> {
        let vote = self.manager.request_vote(subject_id, direction).await?;
        let reconciled = self.sync_after_confirmation(subject_id).await;
        Ok(VoteReport { vote, reconciled })
    }

    /// Refreshes until the indexer reports the confirmed vote on `subject_id`
    /// or the attempts run out. Leftovers are picked up by later refreshes.
    async fn sync_after_confirmation(&self, subject_id: SubjectId) -> bool {
        for attempt in 0..self.confirmed_sync_attempts {
            info!(
                subject_id = subject_id.0,
                attempt = attempt + 1,
                max_attempts = self.confirmed_sync_attempts,
                "reconcile: post-confirmation refresh"
            );
            match self.refresh().await {
                Ok(_) => {
                    if self.manager.overlay_entry(subject_id).await.is_none() {
                        return true;
                    }
                }
                Err(err) => {
                    warn!(subject_id = subject_id.0, "reconcile: {err}");
                }
            }

            if attempt + 1 < self.confirmed_sync_attempts {
                tokio::time::sleep(self.confirmed_sync_delay).await;
            }
        }
        info!(
            subject_id = subject_id.0,
            "reconcile: indexer still behind, keeping overlay for the next refresh"
        );
        false
    }

    /// Refreshes on a fixed interval until the returned task is aborted.
    pub fn spawn_periodic_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.refresh_interval);
            loop {
                ticker.tick().await;
                let _ = scheduler.refresh().await;
            }
        })
    }

    /// Score-ordered subjects with effective counts and the user's marks.
    pub async fn subjects(&self) -> Vec<SubjectView> {
        let subjects = self.catalog.list().await;
        self.manager
            .with_overlay(|overlay| {
                subjects
                    .into_iter()
                    .map(|subject| {
                        let (likes, dislikes) = overlay.effective_counts(&subject);
                        let mark = overlay.mark(subject.subject_id);
                        SubjectView {
                            subject,
                            likes,
                            dislikes,
                            mark,
                        }
                    })
                    .collect()
            })
            .await
    }

    pub async fn subject(&self, subject_id: SubjectId) -> Option<SubjectView> {
        let subject = self.catalog.get(subject_id).await?;
        let view = self
            .manager
            .with_overlay(|overlay| {
                let (likes, dislikes) = overlay.effective_counts(&subject);
                SubjectView {
                    likes,
                    dislikes,
                    mark: overlay.mark(subject_id),
                    subject,
                }
            })
            .await;
        Some(view)
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
