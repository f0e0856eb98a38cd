//! Job execution with history logging and retry.
//!
//! One run of a job writes:
//! - a `start` event when it begins
//! - a `retry` event for every failed attempt that will be retried
//! - a closing `success` (with `row_count`) or `failure` event
//!
//! Store calls are blocking and go through `spawn_blocking`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use histo_sources::{SourceParams, SourceRegistry};
use histo_store::clock::now_iso;
use histo_store::{EventType, NewHistoryEvent, VersionedStore};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::{JobDefinition, JobRegistry};

/// Retries after the first failed attempt, with exponential backoff
/// starting at `backoff`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::from_millis(1_000),
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub run_id: Uuid,
    pub job: String,
    pub fetched: usize,
    pub inserted: usize,
    pub attempts: u32,
    pub duration_ms: u64,
}

pub struct JobExecutor {
    store: Arc<VersionedStore>,
    sources: Arc<SourceRegistry>,
    jobs: Arc<JobRegistry>,
}

impl JobExecutor {
    pub fn new(store: Arc<VersionedStore>, sources: Arc<SourceRegistry>, jobs: Arc<JobRegistry>) -> Self {
        Self { store, sources, jobs }
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn store(&self) -> &Arc<VersionedStore> {
        &self.store
    }

    /// Run `job_name` once, retrying per `retry`.
    ///
    /// Unknown job names fail before anything is logged.
    pub async fn run(
        &self,
        job_name: &str,
        params: &SourceParams,
        retry: &RetryPolicy,
    ) -> Result<JobOutcome, JobError> {
        let job = self.jobs.get(job_name)?.clone();
        let params = job.merged_params(params);
        let run_id = Uuid::new_v4();
        let started_at = now_iso();
        let start = Instant::now();

        info!(job = %job.name, run_id = %run_id, source = %job.source, "job started");
        self.log(
            NewHistoryEvent::new(job.name.as_str(), EventType::Start, "running")
                .started_at(started_at.clone())
                .details(json!({ "run_id": run_id.to_string(), "params": params })),
        )
        .await?;

        let mut attempt = 1u32;
        loop {
            match self.attempt(&job, &params).await {
                Ok((fetched, inserted)) => {
                    let duration_ms = elapsed_ms(start);
                    info!(
                        job = %job.name,
                        run_id = %run_id,
                        fetched,
                        inserted,
                        attempts = attempt,
                        duration_ms,
                        "job succeeded"
                    );
                    self.log(
                        NewHistoryEvent::new(job.name.as_str(), EventType::Success, "success")
                            .started_at(started_at.clone())
                            .ended_at(now_iso())
                            .duration_ms(duration_ms as i64)
                            .row_count(inserted as i64)
                            .details(json!({
                                "run_id": run_id.to_string(),
                                "fetched": fetched,
                                "attempts": attempt,
                            })),
                    )
                    .await?;
                    return Ok(JobOutcome {
                        run_id,
                        job: job.name.clone(),
                        fetched,
                        inserted,
                        attempts: attempt,
                        duration_ms,
                    });
                }
                Err(e) if attempt <= retry.max_retries => {
                    let delay = retry.delay_for(attempt);
                    warn!(
                        job = %job.name,
                        run_id = %run_id,
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %e,
                        "job attempt failed, retrying"
                    );
                    self.log(
                        NewHistoryEvent::new(job.name.as_str(), EventType::Retry, "retrying")
                            .started_at(started_at.clone())
                            .ended_at(now_iso())
                            .duration_ms(elapsed_ms(start) as i64)
                            .details(json!({
                                "run_id": run_id.to_string(),
                                "error": e.to_string(),
                                "attempt": attempt,
                                "backoff_ms": delay.as_millis() as u64,
                            })),
                    )
                    .await?;
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    let duration_ms = elapsed_ms(start);
                    error!(
                        job = %job.name,
                        run_id = %run_id,
                        attempts = attempt,
                        duration_ms,
                        error = %e,
                        "job failed"
                    );
                    let failure = NewHistoryEvent::new(job.name.as_str(), EventType::Failure, "failure")
                        .started_at(started_at.clone())
                        .ended_at(now_iso())
                        .duration_ms(duration_ms as i64)
                        .details(json!({
                            "run_id": run_id.to_string(),
                            "error": e.to_string(),
                            "attempts": attempt,
                        }));
                    if let Err(log_err) = self.log(failure).await {
                        error!(job = %job.name, error = %log_err, "failed to record job failure");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Fetch then upsert. Returns `(fetched, inserted)`.
    async fn attempt(&self, job: &JobDefinition, params: &SourceParams) -> Result<(usize, usize), JobError> {
        let source = self.sources.get(&job.source)?;
        let records = source.fetch(params).await?;
        let fetched = records.len();

        let store = self.store.clone();
        let job = job.clone();
        let inserted = tokio::task::spawn_blocking(move || {
            store.upsert(
                &job.table,
                records,
                job.key_fields.as_slice(),
                job.attribute_fields.as_deref(),
            )
        })
        .await??;

        Ok((fetched, inserted))
    }

    async fn log(&self, event: NewHistoryEvent) -> Result<i64, JobError> {
        let store = self.store.clone();
        let id = tokio::task::spawn_blocking(move || store.log_event(&event)).await??;
        Ok(id)
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
        assert_eq!(RetryPolicy::none().delay_for(3), Duration::ZERO);
    }

    #[test]
    fn backoff_saturates() {
        let policy = RetryPolicy {
            max_retries: 100,
            backoff: Duration::from_secs(1),
        };
        assert!(policy.delay_for(64) >= policy.delay_for(31));
    }
}
