use chrono::{DateTime, Utc};

use crate::models::job::{Job, TerminalUpdate};
use crate::services::artifacts::{artifact_key, ArtifactStore};
use crate::services::job_store::{JobStore, StoreError};

/// Failure reason recorded on jobs closed by the sweep.
pub const ABANDONED_REASON: &str = "abandoned: no terminal state before reconciliation";

const BATCH_SIZE: i64 = 100;

/// Mark every job still open since before `cutoff` as FAILED.
///
/// Returns how many jobs this pass closed. Jobs that reach a terminal state
/// concurrently are skipped. An artifact written before the job was
/// abandoned is removed best-effort.
pub async fn reconcile_stale_jobs(
    store: &dyn JobStore,
    artifacts: &dyn ArtifactStore,
    cutoff: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let mut closed = 0;

    loop {
        let stale = store.list_stale(cutoff, BATCH_SIZE).await?;
        let batch_len = stale.len();
        let mut progressed = false;

        for job in stale {
            let update = TerminalUpdate::Failed {
                error: ABANDONED_REASON.to_string(),
            };
            match store.update_terminal(job.id, update).await {
                Ok(_) => {
                    closed += 1;
                    progressed = true;
                    tracing::warn!(
                        job_id = %job.id,
                        media_kind = %job.media_kind,
                        created_at = %job.created_at,
                        "Reconciled abandoned job to FAILED"
                    );
                    remove_orphaned_artifact(artifacts, &job).await;
                }
                Err(StoreError::AlreadyTerminal { .. }) | Err(StoreError::NotFound(_)) => {
                    progressed = true;
                }
                Err(e) => return Err(e),
            }
        }

        if batch_len < BATCH_SIZE as usize || !progressed {
            break;
        }
    }

    if closed > 0 {
        metrics::counter!("prediction_jobs_reconciled_total").increment(closed as u64);
    }

    Ok(closed)
}

async fn remove_orphaned_artifact(artifacts: &dyn ArtifactStore, job: &Job) {
    let key = artifact_key(job.media_kind, job.id, &job.original_name);
    if let Err(e) = artifacts.delete(&key).await {
        tracing::warn!(job_id = %job.id, error = %e, "Failed to remove orphaned artifact");
    }
}
