use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use async_trait::async_trait;
use ledger_integration::{
    LedgerReader, LedgerWriter, PreparedVoteCall, Receipt, SimulationResult, TransactionHandle,
    WalletConnector,
};
use shared::{
    domain::{OwnershipKind, Subject, SubjectId, VoteDirection},
    protocol::ListSubjectsResponse,
};
use tokio::sync::{oneshot, Notify};

use crate::{config::EngineSettings, IndexerClient};

pub fn subject(id: i64, likes: u64, dislikes: u64) -> Subject {
    Subject {
        subject_id: SubjectId(id),
        creator: format!("0xcreator{id}"),
        ownership: OwnershipKind::Single {
            owner: format!("0xowner{id}"),
        },
        update_fee: 1_000,
        immutable: false,
        like_count: likes,
        dislike_count: dislikes,
    }
}

pub fn test_settings() -> EngineSettings {
    EngineSettings {
        confirmation_timeout_secs: 5,
        confirmed_sync_attempts: 3,
        confirmed_sync_delay_ms: 10,
        ..EngineSettings::default()
    }
}

#[derive(Default)]
pub struct FakeIndexer {
    subjects: Mutex<Vec<Subject>>,
    indexed_at: Mutex<Option<DateTime<Utc>>>,
    failing: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeIndexer {
    pub fn with_subjects(subjects: Vec<Subject>) -> Arc<Self> {
        let indexer = Self::default();
        *indexer.subjects.lock().expect("subjects") = subjects;
        Arc::new(indexer)
    }

    pub fn set_subjects(&self, subjects: Vec<Subject>) {
        *self.subjects.lock().expect("subjects") = subjects;
    }

    pub fn set_indexed_at(&self, indexed_at: DateTime<Utc>) {
        *self.indexed_at.lock().expect("indexed_at") = Some(indexed_at);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl IndexerClient for FakeIndexer {
    async fn query_catalog(&self, limit: u32) -> Result<ListSubjectsResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("indexer unreachable"));
        }
        let mut subjects = self.subjects.lock().expect("subjects").clone();
        subjects.sort_by_key(|subject| subject.subject_id);
        subjects.truncate(limit as usize);
        Ok(ListSubjectsResponse {
            subjects,
            indexed_at: *self.indexed_at.lock().expect("indexed_at"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    /// Simulation only: the call would revert.
    Reject,
    /// Confirmation only: mined but reverted.
    Revert,
    Fail,
    /// Confirmation only: never resolves.
    Hang,
}

pub struct FakeLedger {
    simulation: Mutex<Behavior>,
    submission: Mutex<Behavior>,
    confirmation: Mutex<Behavior>,
    simulate_gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub simulate_started: Notify,
    pub submitted: Mutex<Vec<PreparedVoteCall>>,
    contents: Mutex<HashMap<SubjectId, String>>,
    content_gates: Mutex<HashMap<SubjectId, oneshot::Receiver<()>>>,
}

impl FakeLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            simulation: Mutex::new(Behavior::Succeed),
            submission: Mutex::new(Behavior::Succeed),
            confirmation: Mutex::new(Behavior::Succeed),
            simulate_gate: Mutex::new(None),
            simulate_started: Notify::new(),
            submitted: Mutex::new(Vec::new()),
            contents: Mutex::new(HashMap::new()),
            content_gates: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_simulation(&self, behavior: Behavior) {
        *self.simulation.lock().expect("simulation") = behavior;
    }

    pub fn set_submission(&self, behavior: Behavior) {
        *self.submission.lock().expect("submission") = behavior;
    }

    pub fn set_confirmation(&self, behavior: Behavior) {
        *self.confirmation.lock().expect("confirmation") = behavior;
    }

    /// Holds the next simulation open until the returned sender fires.
    pub fn gate_simulation(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.simulate_gate.lock().expect("gate") = Some(rx);
        tx
    }

    pub fn set_content(&self, subject_id: SubjectId, content: &str) {
        self.contents
            .lock()
            .expect("contents")
            .insert(subject_id, content.to_string());
    }

    /// Holds the next content fetch for `subject_id` until the sender fires.
    pub fn gate_content(&self, subject_id: SubjectId) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.content_gates
            .lock()
            .expect("content gates")
            .insert(subject_id, rx);
        tx
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().expect("submitted").len()
    }
}

#[async_trait]
impl LedgerWriter for FakeLedger {
    async fn simulate_vote(
        &self,
        subject_id: SubjectId,
        direction: VoteDirection,
    ) -> Result<SimulationResult> {
        self.simulate_started.notify_one();
        let gate = self.simulate_gate.lock().expect("gate").take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let behavior = *self.simulation.lock().expect("simulation");
        match behavior {
            Behavior::Reject => Ok(SimulationResult::Rejected {
                reason: "already voted".to_string(),
            }),
            Behavior::Fail => Err(anyhow!("rpc node unavailable")),
            _ => Ok(SimulationResult::Accepted(PreparedVoteCall {
                subject_id,
                direction,
                gas_limit: Some(60_000),
                calldata_hex: None,
            })),
        }
    }

    async fn submit_vote(&self, call: PreparedVoteCall) -> Result<TransactionHandle> {
        if *self.submission.lock().expect("submission") == Behavior::Fail {
            return Err(anyhow!("user rejected the request"));
        }
        let mut submitted = self.submitted.lock().expect("submitted");
        submitted.push(call);
        Ok(TransactionHandle(format!("0xtx{}", submitted.len())))
    }

    async fn await_confirmation(
        &self,
        handle: &TransactionHandle,
        confirmations: u32,
    ) -> Result<Receipt> {
        let behavior = *self.confirmation.lock().expect("confirmation");
        match behavior {
            Behavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!("pending never resolves")
            }
            Behavior::Fail => Err(anyhow!("receipt lookup failed")),
            Behavior::Revert => Ok(Receipt {
                handle: handle.clone(),
                block_number: 42,
                confirmations,
                success: false,
            }),
            _ => {
                tokio::time::sleep(Duration::from_millis(1)).await;
                Ok(Receipt {
                    handle: handle.clone(),
                    block_number: 42,
                    confirmations,
                    success: true,
                })
            }
        }
    }
}

#[async_trait]
impl LedgerReader for FakeLedger {
    async fn get_content(&self, subject_id: SubjectId) -> Result<String> {
        let gate = self
            .content_gates
            .lock()
            .expect("content gates")
            .remove(&subject_id);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.contents
            .lock()
            .expect("contents")
            .get(&subject_id)
            .cloned()
            .ok_or_else(|| anyhow!("no content stored for subject {subject_id}"))
    }
}

pub struct FakeWallet {
    connected: AtomicBool,
    check_gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub check_started: Notify,
    pub connect_requests: AtomicUsize,
}

impl FakeWallet {
    fn with_connection(connected: bool) -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(connected),
            check_gate: Mutex::new(None),
            check_started: Notify::new(),
            connect_requests: AtomicUsize::new(0),
        })
    }

    pub fn connected() -> Arc<Self> {
        Self::with_connection(true)
    }

    pub fn disconnected() -> Arc<Self> {
        Self::with_connection(false)
    }

    /// Holds the next connection check open until the sender fires.
    pub fn gate_connection_check(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.check_gate.lock().expect("check gate") = Some(rx);
        tx
    }
}

#[async_trait]
impl WalletConnector for FakeWallet {
    async fn is_connected(&self) -> bool {
        self.check_started.notify_one();
        let gate = self.check_gate.lock().expect("check gate").take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.connected.load(Ordering::SeqCst)
    }

    async fn request_connect(&self) {
        self.connect_requests.fetch_add(1, Ordering::SeqCst);
    }
}
