use histo_sources::SourceParams;
use indexmap::IndexMap;

use crate::error::JobError;

/// What a job fetches and where its records land.
#[derive(Debug, Clone)]
pub struct JobDefinition {
    pub name: String,
    /// Registry name of the record source.
    pub source: String,
    /// Entity table receiving the SCD2 rows.
    pub table: String,
    pub key_fields: Vec<String>,
    /// `None` infers attributes from the first fetched record.
    pub attribute_fields: Option<Vec<String>>,
    /// Merged under per-run params.
    pub default_params: SourceParams,
}

impl JobDefinition {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        table: impl Into<String>,
        key_fields: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            table: table.into(),
            key_fields: key_fields.iter().map(|k| k.to_string()).collect(),
            attribute_fields: None,
            default_params: SourceParams::new(),
        }
    }

    pub fn with_attributes(mut self, fields: &[&str]) -> Self {
        self.attribute_fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn with_default_param(mut self, key: &str, value: serde_json::Value) -> Self {
        self.default_params.insert(key.to_string(), value);
        self
    }

    /// Defaults overlaid with `overrides`.
    pub fn merged_params(&self, overrides: &SourceParams) -> SourceParams {
        let mut params = self.default_params.clone();
        for (k, v) in overrides {
            params.insert(k.clone(), v.clone());
        }
        params
    }
}

/// Known jobs, in registration order.
pub struct JobRegistry {
    jobs: IndexMap<String, JobDefinition>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: IndexMap::new(),
        }
    }

    /// `fetch_transactions` and `search_address`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        let builtin = [
            JobDefinition::new("fetch_transactions", "mock", "transactions", &["tx_id"])
                .with_attributes(&["amount", "currency", "updated_at"]),
            JobDefinition::new("search_address", "vworld", "addresses", &["item_id"]),
        ];
        for job in builtin {
            registry.jobs.insert(job.name.clone(), job);
        }
        registry
    }

    pub fn register(&mut self, job: JobDefinition) -> Result<(), JobError> {
        if self.jobs.contains_key(&job.name) {
            return Err(JobError::DuplicateJob(job.name));
        }
        self.jobs.insert(job.name.clone(), job);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&JobDefinition, JobError> {
        self.jobs
            .get(name)
            .ok_or_else(|| JobError::UnknownJob(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobDefinition> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
