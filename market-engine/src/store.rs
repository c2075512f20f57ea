//! Job store with per-job exclusive sections.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{EngineError, Result};
use crate::job::Job;

/// All jobs known to one orchestrator.
///
/// Each job sits behind its own mutex; holding it is the job's exclusive
/// section, so two transitions for one job never run concurrently while
/// different jobs proceed independently.
#[derive(Default)]
pub struct JobStore {
    jobs: DashMap<String, Arc<Mutex<Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new job. Fails if the id is taken.
    pub fn insert(&self, job: Job) -> Result<Arc<Mutex<Job>>> {
        let id = job.id().to_string();
        match self.jobs.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Err(EngineError::Validation(format!(
                "job {} already exists",
                entry.key()
            ))),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let handle = Arc::new(Mutex::new(job));
                entry.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    /// Handle to a job's exclusive section.
    pub fn handle(&self, job_id: &str) -> Result<Arc<Mutex<Job>>> {
        self.jobs
            .get(job_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::NotFound(format!("job {}", job_id)))
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    /// Copy of a job's current record.
    pub async fn snapshot(&self, job_id: &str) -> Result<Job> {
        let handle = self.handle(job_id)?;
        let job = handle.lock().await;
        Ok(job.clone())
    }

    /// Copies of every job, waiting for in-flight transitions.
    pub async fn all(&self) -> Vec<Job> {
        let handles: Vec<Arc<Mutex<Job>>> = self
            .jobs
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut jobs = Vec::with_capacity(handles.len());
        for handle in handles {
            jobs.push(handle.lock().await.clone());
        }
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;
    use chrono::Utc;
    use market_agent::JobSpec;

    fn job(id: &str) -> Job {
        Job::new(JobSpec {
            id: id.to_string(),
            requester_id: "req-1".to_string(),
            title: "Build an API".to_string(),
            skills: vec!["rust".to_string()],
            budget_min: 400,
            budget_max: 600,
            deadline: Utc::now(),
            requirement_embedding: None,
        })
    }

    #[tokio::test]
    async fn test_insert_and_snapshot() {
        let store = JobStore::new();
        store.insert(job("job-1")).unwrap();

        assert!(matches!(store.insert(job("job-1")), Err(EngineError::Validation(_))));
        assert_eq!(store.snapshot("job-1").await.unwrap().state, JobState::Posted);
        assert!(matches!(store.snapshot("job-2").await, Err(EngineError::NotFound(_))));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_exclusive_section_serializes_writers() {
        let store = Arc::new(JobStore::new());
        store.insert(job("job-1")).unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let handle = store.handle("job-1").unwrap();
                let mut job = handle.lock().await;
                let seen = job.tried.len();
                tokio::task::yield_now().await;
                job.tried.push(format!("c{}", seen));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let tried = store.snapshot("job-1").await.unwrap().tried;
        let expected: Vec<String> = (0..8).map(|i| format!("c{}", i)).collect();
        assert_eq!(tried, expected);
    }
}
