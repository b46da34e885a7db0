use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::job::{Job, NewJob, ProcessingStatus, TerminalUpdate};

/// Durable record of prediction jobs.
///
/// `update_terminal` is all-or-nothing per job: readers see either the
/// pre-update record or the fully applied terminal one.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Move a non-terminal job to COMPLETED or FAILED.
    ///
    /// Fails with `AlreadyTerminal` if the job already left PENDING/PROCESSING.
    async fn update_terminal(&self, id: Uuid, update: TerminalUpdate) -> Result<Job, StoreError>;

    /// Non-terminal jobs created before `cutoff`, oldest first.
    async fn list_stale(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Job>, StoreError>;

    /// Connectivity check for health endpoints.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {id} already in terminal state {status}")]
    AlreadyTerminal { id: Uuid, status: ProcessingStatus },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt job record: {0}")]
    Corrupt(String),
}

/// Process-local job store. Each record is guarded by its map shard, so
/// updates to one id never block on unrelated jobs for longer than a
/// shard lookup.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<Uuid, Job>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.jobs.iter().map(|entry| *entry.key()).collect()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let job = Job::pending(new_job);
        self.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.get(&id).map(|entry| entry.value().clone()))
    }

    async fn update_terminal(&self, id: Uuid, update: TerminalUpdate) -> Result<Job, StoreError> {
        let mut entry = self.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let job = entry.value_mut();
        if job.processing_status.is_terminal() {
            return Err(StoreError::AlreadyTerminal {
                id,
                status: job.processing_status,
            });
        }
        job.apply_terminal(update);
        Ok(job.clone())
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Job>, StoreError> {
        let mut stale: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| {
                !entry.processing_status.is_terminal() && entry.created_at < cutoff
            })
            .map(|entry| entry.value().clone())
            .collect();
        stale.sort_by_key(|job| job.created_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
