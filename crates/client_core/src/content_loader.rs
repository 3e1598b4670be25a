use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use ledger_integration::LedgerReader;
use shared::domain::SubjectId;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{error::ContentError, EngineEvent};

/// Handed to a content fetch; goes stale as soon as another subject becomes
/// active.
#[derive(Debug, Clone)]
pub struct FetchToken {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl FetchToken {
    pub fn is_cancelled(&self) -> bool {
        self.current.load(Ordering::SeqCst) != self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedContent {
    pub body: String,
    pub fallback: bool,
}

#[derive(Default)]
struct LoaderState {
    active: Option<SubjectId>,
    contents: HashMap<SubjectId, LoadedContent>,
    fetch_task: Option<JoinHandle<()>>,
}

pub struct ActiveSubjectContentLoader {
    reader: Arc<dyn LedgerReader>,
    fallback: String,
    generation: Arc<AtomicU64>,
    state: Mutex<LoaderState>,
    events: broadcast::Sender<EngineEvent>,
}

impl ActiveSubjectContentLoader {
    pub fn new(
        reader: Arc<dyn LedgerReader>,
        fallback: impl Into<String>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            reader,
            fallback: fallback.into(),
            generation: Arc::new(AtomicU64::new(0)),
            state: Mutex::new(LoaderState::default()),
            events,
        }
    }

    /// Makes `subject_id` the active subject, cancelling any fetch for the
    /// previous one, and starts fetching its content in the background.
    pub async fn set_active(self: &Arc<Self>, subject_id: SubjectId) -> FetchToken {
        let mut state = self.state.lock().await;
        let token = self.next_token();
        state.active = Some(subject_id);
        if let Some(previous) = state.fetch_task.take() {
            previous.abort();
        }

        let loader = Arc::clone(self);
        let task_token = token.clone();
        state.fetch_task = Some(tokio::spawn(async move {
            let _ = loader.load(task_token, subject_id).await;
        }));
        debug!(subject_id = subject_id.0, "content: fetch started");
        token
    }

    /// Drops the active subject and cancels its fetch.
    pub async fn clear_active(&self) {
        let mut state = self.state.lock().await;
        let _ = self.next_token();
        state.active = None;
        if let Some(previous) = state.fetch_task.take() {
            previous.abort();
        }
    }

    /// Fetches content for `subject_id` and stores it unless `token` went
    /// stale in the meantime. A failed fetch stores the fallback text.
    pub async fn load(&self, token: FetchToken, subject_id: SubjectId) -> Option<LoadedContent> {
        let fetched = self.reader.get_content(subject_id).await;
        if token.is_cancelled() {
            debug!(subject_id = subject_id.0, "content: discarding stale fetch");
            return None;
        }

        let content = match fetched {
            Ok(body) => LoadedContent {
                body,
                fallback: false,
            },
            Err(err) => {
                let err = ContentError::FetchFailed {
                    subject_id,
                    reason: format!("{err:#}"),
                };
                warn!("content: {err}; showing fallback");
                LoadedContent {
                    body: self.fallback.clone(),
                    fallback: true,
                }
            }
        };

        let mut state = self.state.lock().await;
        if token.is_cancelled() || state.active != Some(subject_id) {
            debug!(subject_id = subject_id.0, "content: discarding stale fetch");
            return None;
        }
        state.contents.insert(subject_id, content.clone());
        drop(state);

        info!(
            subject_id = subject_id.0,
            fallback = content.fallback,
            "content: loaded"
        );
        let _ = self.events.send(EngineEvent::ContentLoaded {
            subject_id,
            fallback: content.fallback,
        });
        Some(content)
    }

    /// Waits for the current background fetch, if any, to finish.
    pub async fn settle(&self) {
        let task = self.state.lock().await.fetch_task.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub async fn active(&self) -> Option<SubjectId> {
        self.state.lock().await.active
    }

    pub async fn content(&self, subject_id: SubjectId) -> Option<LoadedContent> {
        self.state.lock().await.contents.get(&subject_id).cloned()
    }

    /// Content for the active subject, if it has loaded.
    pub async fn displayed(&self) -> Option<(SubjectId, LoadedContent)> {
        let state = self.state.lock().await;
        let active = state.active?;
        state
            .contents
            .get(&active)
            .cloned()
            .map(|content| (active, content))
    }

    fn next_token(&self) -> FetchToken {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        FetchToken {
            generation,
            current: Arc::clone(&self.generation),
        }
    }
}

#[cfg(test)]
#[path = "tests/content_loader_tests.rs"]
mod tests;
