//! Clinical intelligence facade
//!
//! Wires the router, orchestrator and engines around one provider registry
//! and one cache. The cache is injected and has an explicit lifecycle:
//! build it once per process and call [`ClinicalIntelligence::shutdown`] on
//! exit.

use crate::graph::{Graph, GraphBuilder};
use crate::interactions::{InteractionDetector, InteractionFinding};
use crate::lexicon::{Lexicon, VocabEntry};
use crate::orchestrator::{FetchOutcome, Orchestrator};
use crate::router::{CapabilityRouter, RouteOutcome};
use crate::synthesis::{ScoringWeights, SynthesisResult, SynthesisScorer};
use clinsight_common::cache::{keys, CacheConfig};
use clinsight_common::config::OrchestratorSettings;
use clinsight_common::metrics;
use clinsight_common::models::{ProviderHealth, RecordSet, RecordSource, StatusMap};
use clinsight_common::{AppConfig, AppError, Cache, Provider, ProviderRegistry, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Tunables of the facade
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub orchestrator: OrchestratorSettings,
    /// TTL of cached provider responses
    pub fetch_ttl: Duration,
    /// TTL of cached syntheses, graphs and interaction reports
    pub result_ttl: Duration,
    pub scoring: ScoringWeights,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorSettings::default(),
            fetch_ttl: Duration::from_secs(600),
            result_ttl: Duration::from_secs(300),
            scoring: ScoringWeights::default(),
        }
    }
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            orchestrator: config.orchestrator.clone(),
            fetch_ttl: config.cache.fetch_ttl(),
            result_ttl: config.cache.result_ttl(),
            scoring: ScoringWeights::from(&config.scoring),
        }
    }
}

/// Interaction findings with the providers behind them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionReport {
    /// Display names of the distinct drugs checked
    pub drugs: Vec<String>,
    pub findings: Vec<InteractionFinding>,
    pub sources: Vec<String>,
    #[serde(default)]
    pub degraded: Vec<String>,
}

pub struct ClinicalIntelligence {
    registry: RwLock<ProviderRegistry>,
    cache: Arc<Cache>,
    lexicon: Arc<Lexicon>,
    orchestrator: Orchestrator,
    router: CapabilityRouter,
    scorer: SynthesisScorer,
    detector: InteractionDetector,
    settings: EngineSettings,
}

impl ClinicalIntelligence {
    pub fn new(
        registry: ProviderRegistry,
        cache: Arc<Cache>,
        lexicon: Arc<Lexicon>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry: RwLock::new(registry),
            orchestrator: Orchestrator::new(cache.clone(), settings.orchestrator.clone(), settings.fetch_ttl),
            router: CapabilityRouter::new(lexicon.clone()),
            scorer: SynthesisScorer::new(lexicon.clone(), settings.scoring.clone()),
            detector: InteractionDetector::new(lexicon.clone()),
            cache,
            lexicon,
            settings,
        }
    }

    /// Build the cache, lexicon and built-in providers from configuration
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let lexicon = Arc::new(Lexicon::load(config.lexicon.path.as_deref())?);
        let cache = Arc::new(Cache::new(CacheConfig::from(&config.cache)).await);
        let registry = ProviderRegistry::from_config(&config.providers, config.request_timeout())?;

        info!(
            providers = ?registry.names(),
            disk_cache = cache.has_disk_tier(),
            "Clinical intelligence initialized"
        );
        Ok(Self::new(registry, cache, lexicon, EngineSettings::from(config)))
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Register a provider at runtime, replacing any of the same name
    pub async fn register_provider(&self, provider: Arc<dyn Provider>) -> Result<()> {
        let name = provider.name().to_string();
        let replaced = self.registry.write().await.register(provider)?;
        info!(provider = %name, replaced = replaced.is_some(), "Provider registered");
        Ok(())
    }

    pub async fn unregister_provider(&self, name: &str) -> bool {
        self.registry.write().await.unregister(name).is_some()
    }

    pub async fn provider_names(&self) -> Vec<String> {
        self.registry.read().await.names()
    }

    /// Registry snapshot so no lock is held across provider I/O
    async fn registry(&self) -> ProviderRegistry {
        self.registry.read().await.clone()
    }

    /// Routing decision for a query, without fetching anything
    pub async fn route(&self, text: &str) -> RouteOutcome {
        self.router.route(text, &self.registry().await)
    }

    /// Answer a free-text question with a ranked, scored synthesis
    pub async fn ask(&self, text: &str) -> Result<SynthesisResult> {
        if text.trim().is_empty() {
            return Err(AppError::validation("query", "Query must not be empty"));
        }

        let registry = self.registry().await;
        let plan = match self.router.route(text, &registry) {
            RouteOutcome::Routed(plan) => plan,
            RouteOutcome::NoEntityFound => {
                return Err(AppError::NoEntityFound {
                    query: text.trim().to_string(),
                })
            }
        };
        debug!(
            entity = %plan.entity.display,
            intent = ?plan.intent,
            providers = ?plan.providers,
            engines = ?plan.engines,
            "Query routed"
        );

        let key = keys::engine_result(
            &format!("synthesis:{}", plan.providers.join(",")),
            &plan.entity.canonical,
        );
        if let Some(cached) = self.cache.get::<SynthesisResult>(&key).await {
            metrics::record_engine("synthesis", true);
            return Ok(cached);
        }

        let outcome = self
            .orchestrator
            .combined_fetch(&registry, &plan.entity.display, &plan.providers)
            .await;
        ensure_not_starved(&outcome)?;

        let mut result = self.scorer.synthesize(&plan.entity.display, &outcome.records);
        result.degraded = outcome.degraded();
        if result.degraded.is_empty() {
            self.cache.set_with_ttl(&key, &result, self.settings.result_ttl).await;
        }
        metrics::record_engine("synthesis", false);
        Ok(result)
    }

    /// Relationship graph around one entity, built from every registered provider
    pub async fn graph(&self, entity: &str) -> Result<Graph> {
        let anchor = self
            .router
            .resolve_entity(entity)
            .ok_or_else(|| AppError::validation("entity", "Entity must not be empty"))?;

        let registry = self.registry().await;
        let providers = registry.names();
        let key = keys::engine_result(&format!("graph:{}", providers.join(",")), &anchor.canonical);
        if let Some(cached) = self.cache.get::<Graph>(&key).await {
            metrics::record_engine("graph", true);
            return Ok(cached);
        }

        let outcome = self
            .orchestrator
            .combined_fetch(&registry, &anchor.display, &providers)
            .await;
        ensure_not_starved(&outcome)?;

        let aliases = self.lexicon.aliases_of(&anchor.canonical);
        let graph = GraphBuilder::new()
            .with_vocabulary(&self.lexicon)
            .with_anchor(anchor, aliases)
            .build(&outcome.records);

        if outcome.degraded().is_empty() {
            self.cache.set_with_ttl(&key, &graph, self.settings.result_ttl).await;
        }
        metrics::record_engine("graph", false);
        Ok(graph)
    }

    /// Pairwise interaction scan over the drug labels of each named drug
    pub async fn interactions(&self, drugs: &[String]) -> Result<InteractionReport> {
        let mut entries: BTreeMap<String, VocabEntry> = BTreeMap::new();
        for name in drugs {
            if let Some(entry) = self.router.resolve_entity(name) {
                entries.entry(entry.canonical.clone()).or_insert(entry);
            }
        }
        if entries.len() < 2 {
            return Err(AppError::validation(
                "drugs",
                "At least two distinct drug names are required",
            ));
        }
        let entries: Vec<VocabEntry> = entries.into_values().collect();

        let registry = self.registry().await;
        let providers: Vec<String> = registry
            .of_kind(RecordSource::DrugLabel)
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        if providers.is_empty() {
            return Err(AppError::ProvidersUnavailable { providers });
        }

        let canonicals: Vec<&str> = entries.iter().map(|e| e.canonical.as_str()).collect();
        let key = keys::engine_result(
            &format!("interactions:{}", providers.join(",")),
            &canonicals.join(" + "),
        );
        if let Some(cached) = self.cache.get::<InteractionReport>(&key).await {
            metrics::record_engine("interactions", true);
            return Ok(cached);
        }

        // Labels are fetched for each drug independently
        let outcomes = futures::future::join_all(
            entries
                .iter()
                .map(|e| self.orchestrator.combined_fetch(&registry, &e.display, &providers)),
        )
        .await;
        if outcomes.iter().all(FetchOutcome::all_degraded) {
            let mut degraded: Vec<String> = outcomes.iter().flat_map(FetchOutcome::degraded).collect();
            degraded.sort();
            degraded.dedup();
            return Err(AppError::ProvidersUnavailable { providers: degraded });
        }

        let mut labels = RecordSet::new();
        let mut degraded: Vec<String> = Vec::new();
        for outcome in outcomes {
            degraded.extend(outcome.degraded());
            labels.extend(outcome.records);
        }
        degraded.sort();
        degraded.dedup();

        let report = InteractionReport {
            drugs: entries.iter().map(|e| e.display.clone()).collect(),
            findings: self.detector.detect(&entries, &labels),
            sources: labels.providers().map(str::to_string).collect(),
            degraded,
        };
        if report.degraded.is_empty() {
            self.cache.set_with_ttl(&key, &report, self.settings.result_ttl).await;
        }
        metrics::record_engine("interactions", false);
        Ok(report)
    }

    /// Check every registered provider now
    pub async fn provider_status(&self) -> BTreeMap<String, ProviderHealth> {
        let registry = self.registry().await;
        self.orchestrator.check_health(&registry).await
    }

    /// Outcome of each provider's most recent fetch
    pub async fn recent_status(&self) -> StatusMap {
        self.orchestrator.recent_status().await
    }

    /// Flush the cache; call once before process exit
    pub async fn shutdown(&self) {
        let flushed = self.cache.shutdown().await;
        info!(flushed, "Clinical intelligence shut down");
    }
}

/// Total starvation: nothing was asked, or nobody answered
fn ensure_not_starved(outcome: &FetchOutcome) -> Result<()> {
    if outcome.status.is_empty() || outcome.all_degraded() {
        return Err(AppError::ProvidersUnavailable {
            providers: outcome.degraded(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Relation;
    use crate::interactions::Severity;
    use clinsight_common::models::{fields, ProviderStatus, Record};
    use clinsight_common::providers::StaticProvider;
    use clinsight_common::ProviderError;

    struct Fixture {
        engine: ClinicalIntelligence,
        labels: Arc<StaticProvider>,
        papers: Arc<StaticProvider>,
        trials: Arc<StaticProvider>,
    }

    fn label(id: &str, generic: &str, brand: &str, interactions: &str) -> Record {
        Record::new(RecordSource::DrugLabel, "openfda", id, brand, format!("{} is indicated for NSCLC", generic))
            .with_field(fields::GENERIC_NAME, [generic])
            .with_field(fields::BRAND_NAME, [brand])
            .with_field(fields::INDICATIONS, [format!("{} is indicated for NSCLC", generic)])
            .with_field(fields::DRUG_INTERACTIONS, [interactions])
    }

    fn trial(nct: &str, intervention: &str, phase: &str) -> Record {
        Record::new(RecordSource::Trial, "clinicaltrials", nct, format!("{} in NSCLC", intervention), "")
            .with_field(fields::NCT_ID, [nct])
            .with_field(fields::INTERVENTIONS, [intervention])
            .with_field(fields::CONDITIONS, ["Non-Small Cell Lung Cancer"])
            .with_field(fields::PHASES, [phase])
            .with_field(fields::STATUS, ["RECRUITING"])
    }

    fn fixture(papers: StaticProvider) -> Fixture {
        let labels = Arc::new(StaticProvider::new("openfda", RecordSource::DrugLabel).with_records([
            label("set-p", "pembrolizumab", "KEYTRUDA", "None known."),
            label(
                "set-w",
                "warfarin",
                "Coumadin",
                "Increased bleeding risk when combined with aspirin, monitor INR closely.",
            ),
            label("set-a", "aspirin", "Bayer Aspirin", "No clinically relevant interactions reported."),
        ]));
        let trials = Arc::new(StaticProvider::new("clinicaltrials", RecordSource::Trial).with_records([
            trial("NCT001", "Pembrolizumab", "PHASE3"),
            trial("NCT002", "Pembrolizumab", "PHASE3"),
        ]));
        let papers = Arc::new(papers);

        let mut registry = ProviderRegistry::new();
        registry.register(labels.clone()).unwrap();
        registry.register(papers.clone()).unwrap();
        registry.register(trials.clone()).unwrap();

        let settings = EngineSettings {
            orchestrator: OrchestratorSettings {
                provider_timeout_ms: 1_000,
                overall_deadline_ms: 5_000,
                fetch_limit: 10,
            },
            ..EngineSettings::default()
        };
        let engine = ClinicalIntelligence::new(
            registry,
            Arc::new(Cache::in_memory(256)),
            Arc::new(Lexicon::bundled().unwrap()),
            settings,
        );
        Fixture {
            engine,
            labels,
            papers,
            trials,
        }
    }

    fn healthy_papers() -> StaticProvider {
        StaticProvider::new("pubmed", RecordSource::Paper)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ask_end_to_end() {
        let fx = fixture(healthy_papers());

        let result = fx
            .engine
            .ask("what is the clinial status of pembrolizumab for NSCLC")
            .await
            .unwrap();

        assert_eq!(result.entity, "Pembrolizumab");
        assert!(result.confidence_score >= 0.6);
        assert_eq!(result.top_interventions[0], "Pembrolizumab");
        assert!(result.degraded.is_empty());
        assert_eq!(result.sources, vec!["clinicaltrials".to_string(), "openfda".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ask_result_is_cached() {
        let fx = fixture(healthy_papers());

        fx.engine.ask("pembrolizumab").await.unwrap();
        fx.engine.ask("Keytruda").await.unwrap();

        assert_eq!(fx.labels.calls(), 1);
        assert_eq!(fx.trials.calls(), 1);
        assert_eq!(fx.papers.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ask_reports_degraded_provider_and_skips_result_cache() {
        let fx = fixture(healthy_papers().with_error(ProviderError::transient("pubmed", "HTTP 503")));

        let first = fx.engine.ask("pembrolizumab").await.unwrap();
        fx.engine.ask("pembrolizumab").await.unwrap();

        assert_eq!(first.degraded, vec!["pubmed".to_string()]);
        assert_eq!(fx.papers.calls(), 2);
        // Successful provider responses stay cached
        assert_eq!(fx.labels.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ask_input_errors() {
        let fx = fixture(healthy_papers());

        assert!(matches!(fx.engine.ask("   ").await, Err(AppError::Validation { .. })));
        assert!(matches!(
            fx.engine.ask("what is the status of").await,
            Err(AppError::NoEntityFound { .. })
        ));
        assert_eq!(fx.labels.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_starvation_is_an_error() {
        let engine = ClinicalIntelligence::new(
            ProviderRegistry::new(),
            Arc::new(Cache::in_memory(16)),
            Arc::new(Lexicon::bundled().unwrap()),
            EngineSettings::default(),
        );
        engine
            .register_provider(Arc::new(
                StaticProvider::new("pubmed", RecordSource::Paper).with_delay(Duration::from_secs(60)),
            ))
            .await
            .unwrap();

        let err = engine.ask("aspirin").await.unwrap_err();
        assert!(matches!(err, AppError::ProvidersUnavailable { ref providers } if providers == &["pubmed".to_string()]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_graph_for_condition() {
        let fx = fixture(healthy_papers());

        let graph = fx.engine.graph("non-small cell lung cancer").await.unwrap();

        let treats = graph
            .edge("drug:pembrolizumab", "condition:nsclc", Relation::Treats)
            .unwrap();
        assert_eq!(treats.weight, 3);
        assert!(graph
            .edge("drug:keytruda", "trial:nct001", Relation::IntervenesIn)
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interactions_report() {
        let fx = fixture(healthy_papers());

        let report = fx
            .engine
            .interactions(&["warfarin".to_string(), "Aspirin".to_string()])
            .await
            .unwrap();

        assert_eq!(report.drugs, vec!["Aspirin".to_string(), "Warfarin".to_string()]);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].severity, Severity::Moderate);
        assert_eq!(report.findings[0].evidence_record_id, "openfda:set-w");
        assert_eq!(fx.papers.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interactions_need_two_distinct_drugs() {
        let fx = fixture(healthy_papers());

        let err = fx
            .engine
            .interactions(&["warfarin".to_string(), "Coumadin".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_status_and_recent() {
        let fx = fixture(healthy_papers().unhealthy());

        let status = fx.engine.provider_status().await;
        assert_eq!(status.len(), 3);
        assert_eq!(status["pubmed"].status, ProviderStatus::Degraded);
        assert_eq!(status["openfda"].status, ProviderStatus::Online);

        fx.engine.ask("pembrolizumab").await.unwrap();
        let recent = fx.engine.recent_status().await;
        assert!(recent.values().all(|r| r.is_online()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_registration() {
        let fx = fixture(healthy_papers());
        assert!(fx.engine.unregister_provider("pubmed").await);

        fx.engine
            .register_provider(Arc::new(
                StaticProvider::new("europepmc", RecordSource::Paper).with_records([Record::new(
                    RecordSource::Paper,
                    "europepmc",
                    "PMC1",
                    "Pembrolizumab survival",
                    "",
                )]),
            ))
            .await
            .unwrap();

        let result = fx.engine.ask("pembrolizumab").await.unwrap();
        assert_eq!(result.evidence_count.papers, 1);
        assert!(result.sources.contains(&"europepmc".to_string()));
        assert_eq!(fx.papers.calls(), 0);
    }
}
