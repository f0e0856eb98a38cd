//! Scheduler loop for the jobs in a schedule file.
//!
//! Each enabled entry gets its own task that sleeps until the trigger's next
//! fire time and then runs the job through the [`JobExecutor`]. Runs of the
//! same entry never overlap; the next fire time is computed after a run ends.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::JobError;
use crate::executor::{JobExecutor, JobOutcome};
use crate::schedule::{ScheduleEntry, ScheduleFile};

/// Run every enabled entry until `shutdown` completes.
///
/// An in-flight run finishes before its task exits.
pub async fn run_scheduler<F>(executor: Arc<JobExecutor>, schedule: &ScheduleFile, shutdown: F)
where
    F: Future<Output = ()>,
{
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut handles = Vec::new();

    for entry in schedule.enabled() {
        info!(
            entry = %entry.name,
            job = %entry.job,
            trigger = %entry.trigger.describe(),
            "scheduling job"
        );
        handles.push(tokio::spawn(run_entry(
            executor.clone(),
            entry.clone(),
            stop_rx.clone(),
        )));
    }

    if handles.is_empty() {
        warn!("no enabled schedule entries");
    }
    info!(entries = handles.len(), "scheduler started");

    shutdown.await;
    info!("scheduler stopping");
    let _ = stop_tx.send(true);

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "scheduler task ended abnormally");
        }
    }
    info!("scheduler stopped");
}

async fn run_entry(executor: Arc<JobExecutor>, entry: ScheduleEntry, mut stop: watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            break;
        }
        let now = Utc::now();
        let Some(next) = entry.trigger.next_after(now) else {
            warn!(entry = %entry.name, "trigger has no upcoming fire time, stopping");
            break;
        };
        let wait = (next - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
        }

        info!(entry = %entry.name, job = %entry.job, trigger = "scheduled", "scheduler: triggering job");
        // Failures are already in the history log.
        let _ = executor.run(&entry.job, &entry.params, &entry.retry).await;
    }
}

/// Run every enabled entry once, in file order.
pub async fn run_all_once(
    executor: &JobExecutor,
    schedule: &ScheduleFile,
) -> Vec<(String, Result<JobOutcome, JobError>)> {
    let mut results = Vec::new();
    for entry in schedule.enabled() {
        let result = executor.run(&entry.job, &entry.params, &entry.retry).await;
        results.push((entry.name.clone(), result));
    }
    results
}
