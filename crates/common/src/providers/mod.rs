//! Provider gateway
//!
//! A provider turns a query into normalized [`Record`]s from one external
//! source. Built-in providers:
//! - openFDA drug labels
//! - PubMed (NCBI Entrez) papers
//! - ClinicalTrials.gov v2 studies
//!
//! Any other source can be plugged in at runtime through [`ProviderRegistry`].

mod clinicaltrials;
mod http;
mod openfda;
mod pubmed;
mod static_provider;

pub use clinicaltrials::ClinicalTrialsProvider;
pub use openfda::OpenFdaProvider;
pub use pubmed::PubMedProvider;
pub use static_provider::StaticProvider;

use crate::config::ProvidersConfig;
use crate::errors::{AppError, ProviderError, Result};
use crate::models::{Record, RecordSource};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Registered names of the built-in providers
pub const OPENFDA: &str = "openfda";
pub const PUBMED: &str = "pubmed";
pub const CLINICALTRIALS: &str = "clinicaltrials";

/// Capability tag for a record source
pub fn source_capability(source: RecordSource) -> &'static str {
    match source {
        RecordSource::DrugLabel => "drugs",
        RecordSource::Paper => "papers",
        RecordSource::Trial => "trials",
    }
}

/// Trait for clinical data sources
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registered name, unique within a registry
    fn name(&self) -> &str;

    /// Kind of record this provider yields
    fn kind(&self) -> RecordSource;

    /// Capability tags used for routing
    fn capabilities(&self) -> Vec<String> {
        vec![source_capability(self.kind()).to_string()]
    }

    /// Fetch up to `limit` records for a query.
    ///
    /// "Nothing found" is `Ok(vec![])`, never an error.
    async fn fetch(&self, query: &str, limit: usize) -> std::result::Result<Vec<Record>, ProviderError>;

    /// Lightweight reachability check
    async fn health_check(&self) -> std::result::Result<(), ProviderError> {
        Ok(())
    }
}

/// Open registration table of providers, iterated in name order
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing and returning any previous one of the same name
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Result<Option<Arc<dyn Provider>>> {
        let name = provider.name().trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("provider", "Provider name must not be empty"));
        }

        let previous = self.providers.insert(name.clone(), provider);
        if previous.is_some() {
            tracing::info!(provider = %name, "Replaced provider registration");
        } else {
            tracing::debug!(provider = %name, "Registered provider");
        }
        Ok(previous)
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Provider>)> {
        self.providers.iter().map(|(name, p)| (name.as_str(), p))
    }

    /// Providers yielding a given record kind
    pub fn of_kind(&self, kind: RecordSource) -> Vec<Arc<dyn Provider>> {
        self.providers
            .values()
            .filter(|p| p.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Build a registry of the enabled built-in HTTP providers
    pub fn from_config(config: &ProvidersConfig, request_timeout: Duration) -> Result<Self> {
        let mut registry = Self::new();

        if config.openfda.enabled {
            registry.register(Arc::new(OpenFdaProvider::new(&config.openfda, request_timeout)?))?;
        }
        if config.pubmed.enabled {
            registry.register(Arc::new(PubMedProvider::new(&config.pubmed, request_timeout)?))?;
        }
        if config.clinicaltrials.enabled {
            registry.register(Arc::new(ClinicalTrialsProvider::new(
                &config.clinicaltrials,
                request_timeout,
            )?))?;
        }

        tracing::info!(providers = ?registry.names(), "Provider registry built");
        Ok(registry)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
