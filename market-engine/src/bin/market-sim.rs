//! market-sim: drive a simulated marketplace workload through the engine.
//!
//! Registers a pool of providers, posts a batch of jobs, runs one worker per
//! job, submits work for every contracted job and settles it. Half of the
//! deliverables are off-spec so the dispute path is exercised too.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use market_agent::{Capabilities, CandidateProfile, Deliverable, JobSpec};
use market_engine::{EngineConfig, JobState, Orchestrator};

/// Job categories: title and required skills.
const CATEGORIES: &[(&str, &[&str])] = &[
    ("Build a REST API", &["rust", "sql"]),
    ("Data pipeline", &["python", "sql"]),
    ("Marketing site", &["typescript", "css"]),
];

#[derive(Parser)]
#[command(name = "market-sim")]
#[command(about = "Drive a simulated workload through the marketplace engine")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "MARKET_CONFIG")]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    /// Jobs to post
    #[arg(long, default_value_t = 12)]
    jobs: usize,

    /// Providers to register
    #[arg(long, default_value_t = 9)]
    candidates: usize,
}

fn category_spec(index: usize, id: String) -> JobSpec {
    let (title, skills) = CATEGORIES[index % CATEGORIES.len()];
    JobSpec {
        id,
        requester_id: format!("requester-{}", index % 4),
        title: title.to_string(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        budget_min: 400,
        budget_max: 600,
        deadline: Utc::now() + Duration::days(14),
        requirement_embedding: None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.general.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    info!(jobs = cli.jobs, candidates = cli.candidates, "Starting market-sim");

    let capabilities = Capabilities::from_config(&config.capability)?;
    let orchestrator = Arc::new(Orchestrator::new(config).await?);
    let tuner = orchestrator.spawn_tuner();

    // Providers embed the same text as the category they specialise in
    for i in 0..cli.candidates {
        let template = category_spec(i, String::new());
        let portfolio = capabilities.embedder.embed(&template.requirement_text()).await?;
        let profile = CandidateProfile {
            id: format!("provider-{}", i),
            skills: template.skills.clone(),
            rate: 450 + ((i as u64 * 97) % 600),
            portfolio_embedding: portfolio,
        };
        orchestrator.register_candidate(profile)?;
    }

    let mut job_ids = Vec::with_capacity(cli.jobs);
    for i in 0..cli.jobs {
        let id = format!("job-{}", i);
        orchestrator.post_job(category_spec(i, id.clone())).await?;
        job_ids.push(id);
    }

    let workers: Vec<_> = job_ids
        .iter()
        .map(|id| orchestrator.spawn_worker(id.clone()))
        .collect();
    for (id, result) in job_ids.iter().zip(futures::future::join_all(workers).await) {
        match result {
            Ok(Ok(state)) => info!(job_id = %id, state = %state, "Worker finished"),
            Ok(Err(e)) => warn!(job_id = %id, error = %e, "Worker failed"),
            Err(e) => warn!(job_id = %id, error = %e, "Worker panicked"),
        }
    }

    for (i, id) in job_ids.iter().enumerate() {
        let job = orchestrator.job(id).await?;
        let (Some(provider_id), JobState::Contracted) = (job.provider_id.clone(), job.state) else {
            continue;
        };

        let text = if i % 2 == 0 {
            job.spec.requirement_text()
        } else {
            format!("unrelated deliverable {}", i)
        };
        let embedding = capabilities.embedder.embed(&text).await?;
        let deliverable = Deliverable::new(id.clone(), provider_id, embedding).with_content(text.as_bytes());

        match orchestrator.submit_deliverable(id, deliverable).await {
            Ok(JobState::Disputed) => {
                orchestrator.resolve_dispute(id, None).await?;
            }
            Ok(_) => {}
            Err(e) => warn!(job_id = %id, error = %e, "Settlement failed"),
        }
    }

    if let Some(tuner) = tuner {
        tuner.abort();
    }
    if let Some(report) = orchestrator.tuner().tick().await? {
        info!(
            matching = report.current.matching,
            tolerance = report.current.negotiation_tolerance,
            "Thresholds after run"
        );
    }

    let metrics = orchestrator.performance_metrics().await;
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}
