//! External settlement chain backend.
//!
//! Forwards each transition to a settlement gateway over HTTP and records the
//! entry only once the gateway has confirmed it. The gateway's transaction
//! hash becomes the entry's `tx_ref`.
//!
//! A confirmation can be lost after the gateway applied the transition. The
//! retry then meets a conflict; when the gateway's escrow already holds the
//! status the transition leads to, its last transaction hash is recorded
//! instead of failing.
//!
//! Gateway routes:
//! - `POST /escrows`
//! - `GET /escrows/{id}`
//! - `POST /escrows/{id}/complete`, `/release`, `/dispute`, `/resolve`
//! - `GET /transactions/{tx_hash}`
//! - `GET /health`

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::{LedgerBackend, LedgerOp};
use crate::error::LedgerError;
use crate::journal::Journal;
use crate::types::{Contract, ContractStatus, EntryType, LedgerEntry, TxRef};

/// Gateway confirmation of a submitted transition.
#[derive(Debug, Deserialize)]
struct SettlementResponse {
    tx_hash: String,
}

/// Gateway view of an escrow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowState {
    pub status: ContractStatus,
    /// Hash of the last transaction applied to the escrow
    #[serde(default)]
    pub last_tx_hash: Option<String>,
}

/// Receipt for a settled transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub contract_id: Option<String>,
}

/// Settlement-chain ledger backend.
pub struct ChainLedger {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    journal: Journal,
}

impl ChainLedger {
    /// Create a backend for the gateway at `endpoint`.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::External(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            journal: Journal::new(),
        })
    }

    /// Persist recorded entries to a JSON-lines file.
    pub async fn with_log(mut self, path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        self.journal = Journal::persistent(path).await?;
        Ok(self)
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Look up a settled transaction on the gateway.
    pub async fn lookup_transaction(&self, tx_ref: &TxRef) -> Result<TransactionReceipt, LedgerError> {
        let url = self.url(&format!("/transactions/{}", tx_ref));
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| LedgerError::External(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json()
                .await
                .map_err(|e| LedgerError::External(format!("invalid receipt: {}", e))),
            StatusCode::NOT_FOUND => Err(LedgerError::NotFound(tx_ref.to_string())),
            status => Err(LedgerError::External(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            ))),
        }
    }

    /// Fetch the gateway's view of an escrow.
    pub async fn escrow_state(&self, contract_id: &str) -> Result<EscrowState, LedgerError> {
        let url = self.url(&format!("/escrows/{}", contract_id));
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| LedgerError::External(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json()
                .await
                .map_err(|e| LedgerError::External(format!("invalid escrow state: {}", e))),
            StatusCode::NOT_FOUND => Err(LedgerError::NotFound(contract_id.to_string())),
            status => Err(LedgerError::External(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            ))),
        }
    }

    /// Transaction hash of `entry` if the gateway already applied it.
    async fn reconcile(&self, entry: &LedgerEntry) -> Option<String> {
        let expected = entry.entry_type.resulting_status();
        match self.escrow_state(&entry.contract_id).await {
            Ok(EscrowState {
                status,
                last_tx_hash: Some(tx_hash),
            }) if status == expected => {
                info!(
                    contract_id = %entry.contract_id,
                    operation = entry.entry_type.operation(),
                    tx_hash = %tx_hash,
                    "Gateway already applied transition, recording it"
                );
                Some(tx_hash)
            }
            Ok(state) => {
                warn!(
                    contract_id = %entry.contract_id,
                    operation = entry.entry_type.operation(),
                    gateway_status = %state.status,
                    "Gateway rejected transition"
                );
                None
            }
            Err(e) => {
                warn!(
                    contract_id = %entry.contract_id,
                    error = %e,
                    "Could not read escrow state from gateway"
                );
                None
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(header::AUTHORIZATION, format!("Bearer {}", key)),
            None => request,
        }
    }

    /// Gateway route and body for a drafted entry.
    fn route(&self, op: &LedgerOp, entry: &LedgerEntry) -> (String, serde_json::Value) {
        let id = &entry.contract_id;
        match op {
            LedgerOp::CreateEscrow(request) => (self.url("/escrows"), json!(request)),
            LedgerOp::CompleteJob => (self.url(&format!("/escrows/{}/complete", id)), json!({})),
            LedgerOp::ReleasePayment => (
                self.url(&format!("/escrows/{}/release", id)),
                json!({ "amount": entry.amount }),
            ),
            LedgerOp::CreateDispute => (self.url(&format!("/escrows/{}/dispute", id)), json!({})),
            LedgerOp::ResolveDispute {
                requester_share_bps,
            } => {
                let (requester_amount, provider_amount) = entry
                    .payout
                    .map(|p| (p.requester, p.provider))
                    .unwrap_or((0, entry.amount));
                (
                    self.url(&format!("/escrows/{}/resolve", id)),
                    json!({
                        "requester_share_bps": requester_share_bps,
                        "requester_amount": requester_amount,
                        "provider_amount": provider_amount,
                    }),
                )
            }
        }
    }

    async fn settle(
        &self,
        op: LedgerOp,
        entry: LedgerEntry,
        current: Option<Contract>,
    ) -> Result<String, LedgerError> {
        let (url, body) = self.route(&op, &entry);
        debug!(url = %url, operation = entry.entry_type.operation(), "Submitting to settlement gateway");

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Settlement gateway unreachable");
                LedgerError::External(e.to_string())
            })?;

        let response = match check_status(response, &entry, current.as_ref()).await {
            Ok(response) => response,
            Err(conflict @ LedgerError::StateConflict { .. }) => {
                return self.reconcile(&entry).await.ok_or(conflict);
            }
            Err(e) => return Err(e),
        };
        let settled: SettlementResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::External(format!("invalid gateway response: {}", e)))?;
        Ok(settled.tx_hash)
    }
}

/// Map gateway HTTP failures onto the ledger error taxonomy.
async fn check_status(
    response: Response,
    entry: &LedgerEntry,
    current: Option<&Contract>,
) -> Result<Response, LedgerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => Err(LedgerError::NotFound(entry.contract_id.clone())),
        StatusCode::CONFLICT => Err(LedgerError::StateConflict {
            contract_id: entry.contract_id.clone(),
            status: current.map(|c| c.status).unwrap_or(ContractStatus::Created),
            operation: entry.entry_type.operation(),
        }),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            Err(LedgerError::Validation(format!("HTTP {}: {}", status, body)))
        }
        _ => Err(LedgerError::External(format!("HTTP {}: {}", status, body))),
    }
}

#[async_trait]
impl LedgerBackend for ChainLedger {
    fn id(&self) -> &str {
        "chain"
    }

    async fn is_available(&self) -> bool {
        self.authorize(self.client.get(self.url("/health")))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn submit(&self, contract_id: &str, op: LedgerOp) -> Result<LedgerEntry, LedgerError> {
        let forwarded = op.clone();
        self.journal
            .transact(contract_id, op, |entry, current| {
                self.settle(forwarded, entry, current)
            })
            .await
    }

    async fn get_contract(&self, contract_id: &str) -> Result<Contract, LedgerError> {
        self.journal
            .view(contract_id)?
            .ok_or_else(|| LedgerError::NotFound(contract_id.to_string()))
    }

    async fn entries(&self, contract_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let entries = self.journal.entries(contract_id);
        if entries.is_empty() {
            return Err(LedgerError::NotFound(contract_id.to_string()));
        }
        Ok(entries)
    }
}

impl ChainLedger {
    /// Entry types recorded so far for a contract.
    pub fn history(&self, contract_id: &str) -> Vec<EntryType> {
        self.journal
            .entries(contract_id)
            .iter()
            .map(|e| e.entry_type)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EscrowRequest;
    use wiremock::matchers::{body_json, header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tx(hash: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "tx_hash": hash }))
    }

    async fn ledger(server: &MockServer) -> ChainLedger {
        ChainLedger::new(server.uri(), Some("secret".into()), Duration::from_secs(2)).unwrap()
    }

    fn escrow() -> EscrowRequest {
        EscrowRequest::new("c-1", "job-1", "req-1", "prov-1", 500)
    }

    #[tokio::test]
    async fn test_records_gateway_tx_hashes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/escrows"))
            .and(header_matcher("authorization", "Bearer secret"))
            .respond_with(tx("0xaaa"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/escrows/c-1/complete"))
            .respond_with(tx("0xbbb"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/escrows/c-1/release"))
            .and(body_json(json!({ "amount": 500 })))
            .respond_with(tx("0xccc"))
            .mount(&server)
            .await;

        let ledger = ledger(&server).await;
        assert_eq!(ledger.create_escrow(escrow()).await.unwrap().as_str(), "0xaaa");
        assert_eq!(ledger.complete_job("c-1").await.unwrap().as_str(), "0xbbb");
        assert_eq!(ledger.release_payment("c-1").await.unwrap().as_str(), "0xccc");

        let contract = ledger.get_contract("c-1").await.unwrap();
        assert_eq!(contract.status, ContractStatus::Paid);
        assert_eq!(contract.last_tx_ref, "0xccc");
        assert_eq!(
            ledger.history("c-1"),
            vec![EntryType::Create, EntryType::Complete, EntryType::Release]
        );
    }

    #[tokio::test]
    async fn test_gateway_failure_is_external_and_records_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/escrows"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let ledger = ledger(&server).await;
        let err = ledger.create_escrow(escrow()).await.unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(
            ledger.get_contract("c-1").await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_gateway_conflict_maps_to_state_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/escrows"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let ledger = ledger(&server).await;
        let err = ledger.create_escrow(escrow()).await.unwrap_err();
        assert!(err.is_state_conflict());
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_conflict_with_unrelated_gateway_state_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/escrows"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/escrows/c-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "paid",
                "last_tx_hash": "0x9",
            })))
            .mount(&server)
            .await;

        let ledger = ledger(&server).await;
        assert!(ledger
            .create_escrow(escrow())
            .await
            .unwrap_err()
            .is_state_conflict());
        assert!(ledger.history("c-1").is_empty());
    }

    #[tokio::test]
    async fn test_lost_confirmation_is_recorded_on_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/escrows"))
            .respond_with(tx("0x1"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/escrows/c-1/complete"))
            .respond_with(tx("0x2"))
            .mount(&server)
            .await;
        // The gateway applies the release but the reply arrives too late
        Mock::given(method("POST"))
            .and(path("/escrows/c-1/release"))
            .respond_with(tx("0x3").set_delay(Duration::from_millis(800)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/escrows/c-1/release"))
            .respond_with(ResponseTemplate::new(409))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/escrows/c-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "paid",
                "last_tx_hash": "0x3",
            })))
            .mount(&server)
            .await;

        let ledger =
            ChainLedger::new(server.uri(), None, Duration::from_millis(200)).unwrap();
        ledger.create_escrow(escrow()).await.unwrap();
        ledger.complete_job("c-1").await.unwrap();

        assert!(ledger.release_payment("c-1").await.unwrap_err().is_transient());
        assert_eq!(
            ledger.get_contract("c-1").await.unwrap().status,
            ContractStatus::Completed
        );

        assert_eq!(ledger.release_payment("c-1").await.unwrap().as_str(), "0x3");
        let contract = ledger.get_contract("c-1").await.unwrap();
        assert_eq!(contract.status, ContractStatus::Paid);
        assert_eq!(contract.released, 500);
        assert_eq!(
            ledger.history("c-1"),
            vec![EntryType::Create, EntryType::Complete, EntryType::Release]
        );

        assert!(ledger
            .release_payment("c-1")
            .await
            .unwrap_err()
            .is_state_conflict());
    }

    #[tokio::test]
    async fn test_escrow_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/escrows/c-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "disputed" })))
            .mount(&server)
            .await;

        let ledger = ledger(&server).await;
        let state = ledger.escrow_state("c-1").await.unwrap();
        assert_eq!(state.status, ContractStatus::Disputed);
        assert_eq!(state.last_tx_hash, None);
        assert!(matches!(
            ledger.escrow_state("c-2").await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_guard_prevents_second_release_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/escrows"))
            .respond_with(tx("0x1"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/escrows/c-1/complete"))
            .respond_with(tx("0x2"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/escrows/c-1/release"))
            .respond_with(tx("0x3"))
            .expect(1)
            .mount(&server)
            .await;

        let ledger = ledger(&server).await;
        ledger.create_escrow(escrow()).await.unwrap();
        ledger.complete_job("c-1").await.unwrap();
        ledger.release_payment("c-1").await.unwrap();
        assert!(ledger
            .release_payment("c-1")
            .await
            .unwrap_err()
            .is_state_conflict());
    }

    #[tokio::test]
    async fn test_resolve_sends_split() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/escrows"))
            .respond_with(tx("0x1"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/escrows/c-1/dispute"))
            .respond_with(tx("0x2"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/escrows/c-1/resolve"))
            .and(body_json(json!({
                "requester_share_bps": 3000,
                "requester_amount": 150,
                "provider_amount": 350,
            })))
            .respond_with(tx("0x3"))
            .expect(1)
            .mount(&server)
            .await;

        let ledger = ledger(&server).await;
        ledger.create_escrow(escrow()).await.unwrap();
        ledger.create_dispute("c-1").await.unwrap();
        ledger.resolve_dispute("c-1", 3000).await.unwrap();

        let payout = ledger.get_contract("c-1").await.unwrap().payout.unwrap();
        assert_eq!((payout.requester, payout.provider), (150, 350));
    }

    #[tokio::test]
    async fn test_lookup_transaction() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transactions/0xabc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tx_hash": "0xabc",
                "status": "confirmed",
                "block_number": 42,
            })))
            .mount(&server)
            .await;

        let ledger = ledger(&server).await;
        let receipt = ledger
            .lookup_transaction(&TxRef("0xabc".into()))
            .await
            .unwrap();
        assert_eq!(receipt.status, "confirmed");
        assert_eq!(receipt.block_number, Some(42));

        assert!(matches!(
            ledger.lookup_transaction(&TxRef("0xmissing".into())).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_health_check_reports_availability() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(ledger(&server).await.is_available().await);
    }
}
