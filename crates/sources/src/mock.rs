use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use histo_core::Record;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SourceError;
use crate::source::{param_u64, RecordSource, SourceParams};

/// Number of transactions generated when `limit` is not given.
pub const DEFAULT_LIMIT: u64 = 5;

/// Offline source generating mock transactions.
///
/// Keys are stable (`mock-0`, `mock-1`, ...) while amounts are random, so
/// repeated runs exercise both the no-op and the new-version path.
pub struct MockSource {
    rng: Mutex<StdRng>,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible amounts for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Generate `limit` transactions stamped with the same `updated_at`.
    pub fn fetch_transactions(&self, limit: u64) -> Vec<Record> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);
        let mut rng = self.rng.lock();
        (0..limit)
            .map(|i| {
                let amount = (rng.gen::<f64>() * 1000.0 * 100.0).round() / 100.0;
                Record::new()
                    .with("tx_id", format!("mock-{i}"))
                    .with("amount", amount)
                    .with("currency", "KRW")
                    .with("updated_at", now.clone())
            })
            .collect()
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, params: &SourceParams) -> Result<Vec<Record>, SourceError> {
        let limit = param_u64(params, "limit")?.unwrap_or(DEFAULT_LIMIT);
        Ok(self.fetch_transactions(limit))
    }
}
