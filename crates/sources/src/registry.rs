use std::collections::HashMap;
use std::sync::Arc;

use histo_core::Config;
use tracing::info;

use crate::error::SourceError;
use crate::mock::MockSource;
use crate::source::RecordSource;
use crate::vworld::{VWorldClient, VWorldSource};

/// Name-keyed set of record sources shared by every job.
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn RecordSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Standard sources: `mock` always, `vworld` when an API key is set.
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let mut registry = Self::new();
        registry.register(MockSource::new())?;
        if config.vworld.is_configured() {
            let client = VWorldClient::from_config(&config.vworld)?;
            registry.register(VWorldSource::new(client))?;
        } else {
            info!("VWORLD_API_KEY not set, vworld source disabled");
        }
        Ok(registry)
    }

    /// Register a source. Returns error if the name is taken.
    pub fn register(&mut self, source: impl RecordSource + 'static) -> Result<(), SourceError> {
        self.register_arc(Arc::new(source))
    }

    pub fn register_arc(&mut self, source: Arc<dyn RecordSource>) -> Result<(), SourceError> {
        let name = source.name().to_string();
        if self.sources.contains_key(&name) {
            return Err(SourceError::DuplicateSource(name));
        }
        self.sources.insert(name, source);
        Ok(())
    }

    /// Look up a source. `<name>_client` resolves to `<name>`.
    pub fn get(&self, name: &str) -> Result<Arc<dyn RecordSource>, SourceError> {
        self.sources
            .get(name)
            .or_else(|| name.strip_suffix("_client").and_then(|n| self.sources.get(n)))
            .cloned()
            .ok_or_else(|| SourceError::UnknownSource(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let mut registry = SourceRegistry::new();
        registry.register(MockSource::seeded(1)).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("mock").unwrap().name(), "mock");
        assert_eq!(registry.get("mock_client").unwrap().name(), "mock");
        assert!(matches!(
            registry.get("nonexistent"),
            Err(SourceError::UnknownSource(n)) if n == "nonexistent"
        ));
    }

    #[test]
    fn duplicate_registration() {
        let mut registry = SourceRegistry::new();
        registry.register(MockSource::seeded(1)).unwrap();
        assert!(matches!(
            registry.register(MockSource::seeded(2)),
            Err(SourceError::DuplicateSource(_))
        ));
    }

    #[test]
    fn from_config_without_key_has_only_mock() {
        let mut config = Config::for_profile("test");
        config.vworld.api_key = None;
        let registry = SourceRegistry::from_config(&config).unwrap();
        assert_eq!(registry.names(), vec!["mock"]);
    }

    #[test]
    fn from_config_with_key_adds_vworld() {
        let mut config = Config::for_profile("test");
        config.vworld.api_key = Some("k".into());
        config.vworld.timeout_secs = 3;
        let registry = SourceRegistry::from_config(&config).unwrap();
        assert_eq!(registry.names(), vec!["mock", "vworld"]);
    }
}
