use std::{
    cmp::Ordering,
    sync::{
        atomic::{AtomicU64, Ordering as AtomicOrdering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use shared::{
    domain::{Subject, SubjectId},
    protocol::ListSubjectsResponse,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{error::CatalogError, IndexerClient};

#[derive(Debug, Clone, Default)]
struct CatalogSnapshot {
    subjects: Vec<Subject>,
    refreshed_at: Option<DateTime<Utc>>,
    ticket: u64,
}

/// Last-known authoritative subjects, ordered by score.
///
/// Only `refresh` writes the snapshot. A failed refresh keeps the previous
/// snapshot, and a refresh that was started before a newer one finished is
/// dropped instead of overwriting fresher data.
pub struct SubjectCatalog {
    indexer: Arc<dyn IndexerClient>,
    limit: u32,
    next_ticket: AtomicU64,
    snapshot: RwLock<CatalogSnapshot>,
}

impl SubjectCatalog {
    pub fn new(indexer: Arc<dyn IndexerClient>, limit: u32) -> Self {
        Self {
            indexer,
            limit,
            next_ticket: AtomicU64::new(1),
            snapshot: RwLock::new(CatalogSnapshot::default()),
        }
    }

    /// Re-queries the indexer. Always a fresh query, never a resumed one.
    pub async fn refresh(&self) -> Result<Vec<Subject>, CatalogError> {
        let ticket = self.next_ticket.fetch_add(1, AtomicOrdering::SeqCst);
        let ListSubjectsResponse {
            mut subjects,
            indexed_at,
        } = match self.indexer.query_catalog(self.limit).await {
            Ok(page) => page,
            Err(err) => {
                warn!(limit = self.limit, "catalog: refresh failed, keeping stale snapshot: {err:#}");
                return Err(CatalogError::Unavailable(format!("{err:#}")));
            }
        };
        subjects.truncate(self.limit as usize);
        sort_by_score(&mut subjects);

        let mut guard = self.snapshot.write().await;
        if ticket < guard.ticket {
            debug!(
                ticket,
                applied = guard.ticket,
                "catalog: discarding refresh overtaken by a newer one"
            );
            return Ok(guard.subjects.clone());
        }
        guard.subjects = subjects.clone();
        guard.refreshed_at = Some(indexed_at.unwrap_or_else(Utc::now));
        guard.ticket = ticket;
        info!(count = subjects.len(), "catalog: refreshed");
        Ok(subjects)
    }

    pub async fn list(&self) -> Vec<Subject> {
        self.snapshot.read().await.subjects.clone()
    }

    pub async fn get(&self, subject_id: SubjectId) -> Option<Subject> {
        self.snapshot
            .read()
            .await
            .subjects
            .iter()
            .find(|subject| subject.subject_id == subject_id)
            .cloned()
    }

    /// When the current snapshot was taken: the indexer's own timestamp if
    /// it sent one, otherwise the local time of the refresh.
    pub async fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().await.refreshed_at
    }

    /// The subject after `subject_id` in score order, wrapping to the first.
    pub async fn next_after(&self, subject_id: SubjectId) -> Option<SubjectId> {
        let guard = self.snapshot.read().await;
        let subjects = &guard.subjects;
        let index = position(subjects, subject_id)?;
        Some(subjects[(index + 1) % subjects.len()].subject_id)
    }

    /// The subject before `subject_id` in score order, wrapping to the last.
    pub async fn prev_before(&self, subject_id: SubjectId) -> Option<SubjectId> {
        let guard = self.snapshot.read().await;
        let subjects = &guard.subjects;
        let index = position(subjects, subject_id)?;
        let prev = if index == 0 {
            subjects.len() - 1
        } else {
            index - 1
        };
        Some(subjects[prev].subject_id)
    }
}

fn position(subjects: &[Subject], subject_id: SubjectId) -> Option<usize> {
    subjects
        .iter()
        .position(|subject| subject.subject_id == subject_id)
}

/// Score (likes minus dislikes) descending, then subject id ascending.
pub fn compare_by_score(a: &Subject, b: &Subject) -> Ordering {
    b.score()
        .cmp(&a.score())
        .then_with(|| a.subject_id.cmp(&b.subject_id))
}

pub fn sort_by_score(subjects: &mut [Subject]) {
    subjects.sort_by(compare_by_score);
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
