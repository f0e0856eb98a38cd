//! Schedule file loading.
//!
//! ```json
//! { "jobs": [
//!     { "name": "tx-every-minute", "job": "fetch_transactions",
//!       "interval_seconds": 60, "params": { "limit": 10 } },
//!     { "name": "city-hall", "job": "search_address", "cron": "0 6 * * *",
//!       "params": { "address": "세종대로 110" }, "max_retries": 2 }
//! ] }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use histo_sources::SourceParams;
use serde::Deserialize;

use crate::error::ScheduleError;
use crate::executor::RetryPolicy;
use crate::jobs::JobRegistry;

const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;

#[derive(Debug, Deserialize)]
struct RawScheduleFile {
    #[serde(default)]
    jobs: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    name: String,
    job: String,
    interval_seconds: Option<u64>,
    cron: Option<String>,
    #[serde(default)]
    params: SourceParams,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    retry_backoff_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_backoff_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_MS
}

/// When a schedule entry fires.
#[derive(Debug, Clone)]
pub enum Trigger {
    Interval(Duration),
    Cron { expr: String, schedule: Schedule },
}

impl Trigger {
    /// Next fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Interval(every) => chrono::Duration::from_std(*every)
                .ok()
                .and_then(|d| after.checked_add_signed(d)),
            Self::Cron { schedule, .. } => schedule.after(&after).next(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Interval(every) => format!("every {}s", every.as_secs()),
            Self::Cron { expr, .. } => format!("cron '{expr}'"),
        }
    }
}

/// A validated schedule entry.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub name: String,
    pub job: String,
    pub trigger: Trigger,
    pub params: SourceParams,
    pub enabled: bool,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleFile {
    pub entries: Vec<ScheduleEntry>,
}

impl ScheduleFile {
    pub fn load(path: impl AsRef<Path>, jobs: &JobRegistry) -> Result<Self, ScheduleError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScheduleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, jobs)
    }

    /// Parse and validate against the job registry.
    pub fn parse(text: &str, jobs: &JobRegistry) -> Result<Self, ScheduleError> {
        let raw: RawScheduleFile = serde_json::from_str(text)?;
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(raw.jobs.len());

        for entry in raw.jobs {
            let name = entry.name.trim().to_string();
            if name.is_empty() {
                return Err(ScheduleError::EmptyName);
            }
            if !seen.insert(name.clone()) {
                return Err(ScheduleError::DuplicateEntry(name));
            }
            if !jobs.contains(&entry.job) {
                return Err(ScheduleError::UnknownJob { name, job: entry.job });
            }

            let trigger = match (entry.interval_seconds, entry.cron) {
                (Some(_), Some(_)) | (None, None) => {
                    return Err(ScheduleError::InvalidTrigger {
                        name,
                        reason: "exactly one of 'interval_seconds' or 'cron' is required".into(),
                    })
                }
                (Some(0), None) => {
                    return Err(ScheduleError::InvalidTrigger {
                        name,
                        reason: "'interval_seconds' must be positive".into(),
                    })
                }
                (Some(secs), None) => Trigger::Interval(Duration::from_secs(secs)),
                (None, Some(expr)) => match parse_cron(&expr) {
                    Ok(schedule) => Trigger::Cron { expr, schedule },
                    Err(source) => return Err(ScheduleError::InvalidCron { name, expr, source }),
                },
            };

            entries.push(ScheduleEntry {
                name,
                job: entry.job,
                trigger,
                params: entry.params,
                enabled: entry.enabled,
                retry: RetryPolicy {
                    max_retries: entry.max_retries,
                    backoff: Duration::from_millis(entry.retry_backoff_ms),
                },
            });
        }

        Ok(Self { entries })
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ScheduleEntry> {
        self.entries.iter().filter(|e| e.enabled)
    }
}

/// Parse a cron expression, prepending a seconds field to 5-field input.
pub fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() == 5 {
        Schedule::from_str(&format!("0 {expr}"))
    } else {
        Schedule::from_str(expr)
    }
}
