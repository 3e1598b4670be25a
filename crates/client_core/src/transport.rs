use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ledger_integration::{
    LedgerReader, LedgerWriter, PreparedVoteCall, Receipt, SimulationResult, TransactionHandle,
};
use reqwest::{Client, Response, StatusCode};
use shared::{
    domain::{SubjectId, VoteDirection},
    error::{ApiError, ApiException},
    protocol::{
        ContentResponse, ListSubjectsQuery, ListSubjectsResponse, ReceiptQuery, ReceiptResponse,
        SimulationResponse, SubmitResponse, VoteRequest,
    },
};
use tracing::debug;

use crate::IndexerClient;

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

fn trim_base(url: impl Into<String>) -> String {
    url.into().trim_end_matches('/').to_string()
}

/// Passes 2xx responses through; otherwise surfaces the `ApiError` body when
/// the service sent one.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    match response.json::<ApiError>().await {
        Ok(body) => Err(anyhow::Error::new(ApiException::from(body))
            .context(format!("{status} from {url}"))),
        Err(_) => Err(anyhow!("{status} from {url}")),
    }
}

pub struct HttpIndexerClient {
    http: Client,
    base_url: String,
}

impl HttpIndexerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: trim_base(base_url),
        }
    }
}

#[async_trait]
impl IndexerClient for HttpIndexerClient {
    async fn query_catalog(&self, limit: u32) -> Result<ListSubjectsResponse> {
        let response = self
            .http
            .get(format!("{}/subjects", self.base_url))
            .query(&ListSubjectsQuery { limit })
            .send()
            .await
            .context("failed to reach indexer")?;
        Ok(check_status(response).await?.json().await?)
    }
}

/// Ledger access through an HTTP gateway that simulates, relays and tracks
/// vote transactions on the client's behalf.
pub struct HttpLedgerGateway {
    http: Client,
    base_url: String,
    poll_interval: Duration,
}

impl HttpLedgerGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: trim_base(base_url),
            poll_interval: RECEIPT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl LedgerWriter for HttpLedgerGateway {
    async fn simulate_vote(
        &self,
        subject_id: SubjectId,
        direction: VoteDirection,
    ) -> Result<SimulationResult> {
        let response = self
            .http
            .post(format!("{}/votes/simulate", self.base_url))
            .json(&VoteRequest {
                subject_id,
                direction,
            })
            .send()
            .await
            .context("failed to reach ledger gateway")?;
        let body: SimulationResponse = check_status(response).await?.json().await?;

        if !body.accepted {
            return Ok(SimulationResult::Rejected {
                reason: body
                    .revert_reason
                    .unwrap_or_else(|| "vote call would revert".to_string()),
            });
        }
        let call = body.call.unwrap_or(PreparedVoteCall {
            subject_id,
            direction,
            gas_limit: None,
            calldata_hex: None,
        });
        if call.subject_id != subject_id || call.direction != direction {
            return Err(anyhow!("ledger gateway returned a call for a different vote"));
        }
        Ok(SimulationResult::Accepted(call))
    }

    async fn submit_vote(&self, call: PreparedVoteCall) -> Result<TransactionHandle> {
        let response = self
            .http
            .post(format!("{}/votes", self.base_url))
            .json(&call)
            .send()
            .await
            .context("failed to reach ledger gateway")?;
        let body: SubmitResponse = check_status(response).await?.json().await?;
        if body.handle.is_empty() {
            return Err(anyhow!("ledger gateway returned an empty transaction handle"));
        }
        Ok(TransactionHandle(body.handle))
    }

    /// Polls until the receipt has `confirmations` confirmations. Never gives
    /// up on its own; callers bound it with a timeout.
    async fn await_confirmation(
        &self,
        handle: &TransactionHandle,
        confirmations: u32,
    ) -> Result<Receipt> {
        loop {
            let response = self
                .http
                .get(format!("{}/votes/{}/receipt", self.base_url, handle.0))
                .query(&ReceiptQuery { confirmations })
                .send()
                .await
                .context("failed to reach ledger gateway")?;

            if response.status() != StatusCode::NOT_FOUND {
                let body: ReceiptResponse = check_status(response).await?.json().await?;
                if body.handle != handle.0 {
                    return Err(anyhow!(
                        "ledger gateway returned receipt for {} while waiting on {handle}",
                        body.handle
                    ));
                }
                if body.confirmations >= confirmations {
                    return Ok(Receipt {
                        handle: handle.clone(),
                        block_number: body.block_number,
                        confirmations: body.confirmations,
                        success: body.success,
                    });
                }
            }

            debug!(handle = %handle, "vote: receipt not final yet");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl LedgerReader for HttpLedgerGateway {
    async fn get_content(&self, subject_id: SubjectId) -> Result<String> {
        let response = self
            .http
            .get(format!("{}/subjects/{}/content", self.base_url, subject_id.0))
            .send()
            .await
            .context("failed to reach ledger gateway")?;
        let body: ContentResponse = check_status(response).await?.json().await?;
        if body.subject_id != subject_id {
            return Err(anyhow!(
                "ledger gateway returned content for subject {} instead of {subject_id}",
                body.subject_id
            ));
        }
        Ok(body.content)
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
