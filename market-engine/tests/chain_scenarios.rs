//! Job lifecycle scenarios settled through a mocked settlement gateway.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ledger::{ChainLedger, ContractStatus, EntryType};
use market_agent::{CandidateProfile, Deliverable, JobSpec, RetryConfig};
use market_engine::{EngineConfig, JobState, Orchestrator};
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.tuning.enabled = false;
    config.payment.retry = RetryConfig {
        max_attempts: 2,
        initial_delay_ms: 1,
        multiplier: 1.0,
        max_delay_ms: 1,
    };
    config
}

fn job(id: &str, budget_max: u64) -> JobSpec {
    JobSpec {
        id: id.to_string(),
        requester_id: "req-1".to_string(),
        title: "Build an API".to_string(),
        skills: vec!["rust".to_string()],
        budget_min: 400,
        budget_max,
        deadline: DateTime::<Utc>::from_timestamp(1_900_000_000, 0).unwrap(),
        requirement_embedding: Some(vec![1.0, 0.0]),
    }
}

fn candidate(rate: u64) -> CandidateProfile {
    CandidateProfile {
        id: "prov-1".to_string(),
        skills: vec!["rust".to_string()],
        rate,
        portfolio_embedding: vec![1.0, 0.0],
    }
}

fn tx(hash: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "tx_hash": hash }))
}

fn at_similarity(cos: f32) -> Vec<f32> {
    vec![cos, (1.0 - cos * cos).sqrt()]
}

async fn mount_transition(server: &MockServer, route: &str, hash: &str, calls: u64) {
    Mock::given(method("POST"))
        .and(path_regex(format!(r"^/escrows/[^/]+/{}$", route)))
        .respond_with(tx(hash))
        .expect(calls)
        .mount(server)
        .await;
}

async fn gateway() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/escrows"))
        .respond_with(tx("0xcreate"))
        .mount(&server)
        .await;
    server
}

async fn orchestrator(server: &MockServer, timeout: Duration) -> Orchestrator {
    let ledger = ChainLedger::new(server.uri(), None, timeout).unwrap();
    Orchestrator::with_ledger(config(), Arc::new(ledger))
        .await
        .unwrap()
}

async fn contracted(orchestrator: &Orchestrator, job_id: &str, rate: u64, budget_max: u64) {
    orchestrator.register_candidate(candidate(rate)).unwrap();
    orchestrator.post_job(job(job_id, budget_max)).await.unwrap();
    assert_eq!(orchestrator.drive(job_id).await.unwrap(), JobState::Contracted);
}

#[tokio::test]
async fn contract_is_created_on_the_gateway() {
    let server = gateway().await;
    let orchestrator = orchestrator(&server, Duration::from_secs(2)).await;
    contracted(&orchestrator, "job-a", 550, 600).await;

    let contract = orchestrator.contract("job-a").await.unwrap();
    assert_eq!(contract.status, ContractStatus::Created);
    assert_eq!(contract.last_tx_ref, "0xcreate");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body["contract_id"], "contract-job-a");
    assert_eq!(body["amount"], contract.agreed_price);
}

#[tokio::test]
async fn rejected_negotiation_never_reaches_the_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(tx("0xnever"))
        .expect(0)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&server, Duration::from_secs(2)).await;
    orchestrator.register_candidate(candidate(1000)).unwrap();
    orchestrator.post_job(job("job-b", 600)).await.unwrap();

    assert_eq!(orchestrator.drive("job-b").await.unwrap(), JobState::Posted);
    assert!(orchestrator.job("job-b").await.unwrap().contract_id.is_none());
}

#[tokio::test]
async fn quality_failure_opens_dispute_on_the_gateway() {
    let server = gateway().await;
    mount_transition(&server, "dispute", "0xdispute", 1).await;
    mount_transition(&server, "release", "0xrelease", 0).await;

    let orchestrator = orchestrator(&server, Duration::from_secs(2)).await;
    contracted(&orchestrator, "job-c", 550, 600).await;

    let deliverable = Deliverable::new("job-c", "prov-1", at_similarity(0.72));
    let state = orchestrator.submit_deliverable("job-c", deliverable).await.unwrap();
    assert_eq!(state, JobState::Disputed);

    let contract = orchestrator.contract("job-c").await.unwrap();
    assert_eq!(contract.status, ContractStatus::Disputed);
    assert_eq!(contract.last_tx_ref, "0xdispute");
    assert_eq!(contract.released, 0);
}

#[tokio::test]
async fn dispute_resolution_sends_split_to_the_gateway() {
    let server = gateway().await;
    mount_transition(&server, "dispute", "0xdispute", 1).await;
    Mock::given(method("POST"))
        .and(path("/escrows/contract-job-d/resolve"))
        .and(body_partial_json(json!({
            "requester_share_bps": 3000,
            "requester_amount": 150,
            "provider_amount": 350,
        })))
        .respond_with(tx("0xresolve"))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&server, Duration::from_secs(2)).await;
    contracted(&orchestrator, "job-d", 500, 500).await;

    let deliverable = Deliverable::new("job-d", "prov-1", at_similarity(0.5));
    orchestrator.submit_deliverable("job-d", deliverable).await.unwrap();
    let state = orchestrator.resolve_dispute("job-d", Some(3000)).await.unwrap();
    assert_eq!(state, JobState::Resolved);

    let contract = orchestrator.contract("job-d").await.unwrap();
    assert_eq!(contract.status, ContractStatus::Paid);
    let payout = contract.payout.unwrap();
    assert_eq!((payout.requester, payout.provider), (150, 350));

    // Replaying the resolution does not call the gateway again
    assert_eq!(
        orchestrator.resolve_dispute("job-d", Some(3000)).await.unwrap(),
        JobState::Resolved
    );
}

#[tokio::test]
async fn quality_pass_releases_once_on_the_gateway() {
    let server = gateway().await;
    mount_transition(&server, "complete", "0xcomplete", 1).await;
    mount_transition(&server, "release", "0xrelease", 1).await;

    let orchestrator = orchestrator(&server, Duration::from_secs(2)).await;
    contracted(&orchestrator, "job-1", 550, 600).await;

    let deliverable = Deliverable::new("job-1", "prov-1", at_similarity(0.9));
    for _ in 0..2 {
        let state = orchestrator
            .submit_deliverable("job-1", deliverable.clone())
            .await
            .unwrap();
        assert_eq!(state, JobState::CompletedPaid);
    }

    let contract = orchestrator.contract("job-1").await.unwrap();
    assert_eq!(contract.status, ContractStatus::Paid);
    assert_eq!(contract.released, contract.agreed_price);
    assert_eq!(contract.last_tx_ref, "0xrelease");

    assert!(orchestrator
        .payments()
        .release("contract-job-1")
        .await
        .unwrap_err()
        .is_state_conflict());
}

#[tokio::test]
async fn late_release_confirmation_is_reconciled() {
    let server = gateway().await;
    mount_transition(&server, "complete", "0xcomplete", 1).await;
    // Applied by the gateway, but the reply outlives the client timeout
    Mock::given(method("POST"))
        .and(path("/escrows/contract-job-1/release"))
        .respond_with(tx("0xrelease").set_delay(Duration::from_millis(800)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/escrows/contract-job-1/release"))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/escrows/contract-job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "paid",
            "last_tx_hash": "0xrelease",
        })))
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&server, Duration::from_millis(200)).await;
    contracted(&orchestrator, "job-1", 550, 600).await;

    let deliverable = Deliverable::new("job-1", "prov-1", at_similarity(0.9));
    let state = orchestrator.submit_deliverable("job-1", deliverable).await.unwrap();
    assert_eq!(state, JobState::CompletedPaid);
    assert!(orchestrator.job("job-1").await.unwrap().stall.is_none());

    let contract = orchestrator.contract("job-1").await.unwrap();
    assert_eq!(contract.status, ContractStatus::Paid);
    assert_eq!(contract.released, contract.agreed_price);
    assert_eq!(contract.last_tx_ref, "0xrelease");

    let releases = orchestrator
        .payments()
        .entries("contract-job-1")
        .await
        .unwrap()
        .iter()
        .filter(|e| e.entry_type == EntryType::Release)
        .count();
    assert_eq!(releases, 1);
}
