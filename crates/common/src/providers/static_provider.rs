//! Canned-data provider for plugins, offline runs and tests

use super::Provider;
use crate::errors::ProviderError;
use crate::models::{normalize_name, Record, RecordSource};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Provider serving a fixed record list.
///
/// `fetch` returns records whose text mentions the query; an injected error
/// or delay applies to every call.
pub struct StaticProvider {
    name: String,
    kind: RecordSource,
    capabilities: Option<Vec<String>>,
    records: Vec<Record>,
    error: Option<ProviderError>,
    delay: Duration,
    healthy: bool,
    calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new(name: impl Into<String>, kind: RecordSource) -> Self {
        Self {
            name: name.into(),
            kind,
            capabilities: None,
            records: Vec::new(),
            error: None,
            delay: Duration::ZERO,
            healthy: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Serve these records, re-attributed to this provider
    pub fn with_records(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        let name = self.name.clone();
        self.records.extend(records.into_iter().map(|mut r| {
            r.provider = name.clone();
            r
        }));
        self
    }

    pub fn with_capabilities(mut self, tags: &[&str]) -> Self {
        self.capabilities = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Fail every fetch with this error
    pub fn with_error(mut self, error: ProviderError) -> Self {
        self.error = Some(error);
        self
    }

    /// Delay every fetch and health check
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Number of fetches issued so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RecordSource {
        self.kind
    }

    fn capabilities(&self) -> Vec<String> {
        match &self.capabilities {
            Some(tags) => tags.clone(),
            None => vec![super::source_capability(self.kind).to_string()],
        }
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<Record>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        let needle = normalize_name(query);
        Ok(self
            .records
            .iter()
            .filter(|r| needle.is_empty() || normalize_name(&r.searchable_text()).contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.healthy {
            Ok(())
        } else {
            Err(ProviderError::transient(self.name.clone(), "health check failed"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> StaticProvider {
        StaticProvider::new("papers", RecordSource::Paper).with_records(vec![
            Record::new(RecordSource::Paper, "x", "1", "Pembrolizumab in NSCLC", ""),
            Record::new(RecordSource::Paper, "x", "2", "Aspirin and stroke", ""),
        ])
    }

    #[tokio::test]
    async fn test_fetch_filters_by_query() {
        let p = provider();
        let hits = p.fetch("pembrolizumab", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].provider, "papers");
        assert_eq!(p.calls(), 1);
        assert!(p.fetch("metformin", 10).await.unwrap().is_empty());
    }

    #[test]
    fn test_injected_error() {
        let p = provider().with_error(ProviderError::permanent("papers", "403"));
        tokio_test::assert_err!(tokio_test::block_on(p.fetch("aspirin", 10)));
        tokio_test::assert_ok!(tokio_test::block_on(p.health_check()));
        tokio_test::assert_err!(tokio_test::block_on(provider().unhealthy().health_check()));
    }
}
