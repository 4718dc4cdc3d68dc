//! Concurrent multi-provider fetch
//!
//! Provides:
//! - Fan-out to every selected provider at once
//! - Per-provider timeout plus an overall deadline
//! - Provider response caching
//! - Per-provider status reporting and a rolling health table

use clinsight_common::cache::keys;
use clinsight_common::config::OrchestratorSettings;
use clinsight_common::metrics;
use clinsight_common::models::{
    DegradedReason, ProviderHealth, ProviderReport, ProviderStatus, Record, RecordSet, StatusMap,
};
use clinsight_common::{Cache, Provider, ProviderRegistry};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Result of one combined fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub fetch_id: Uuid,
    pub records: RecordSet,
    pub status: StatusMap,
}

impl FetchOutcome {
    /// Providers that did not contribute
    pub fn degraded(&self) -> Vec<String> {
        self.status
            .iter()
            .filter(|(_, report)| !report.is_online())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// True when at least one provider was asked and none answered
    pub fn all_degraded(&self) -> bool {
        !self.status.is_empty() && self.status.values().all(|r| !r.is_online())
    }
}

/// Fans a query out to providers and merges what comes back in time
pub struct Orchestrator {
    cache: Arc<Cache>,
    settings: OrchestratorSettings,
    fetch_ttl: Duration,
    /// Last observed outcome per provider
    recent: RwLock<BTreeMap<String, ProviderReport>>,
}

impl Orchestrator {
    pub fn new(cache: Arc<Cache>, settings: OrchestratorSettings, fetch_ttl: Duration) -> Self {
        Self {
            cache,
            settings,
            fetch_ttl,
            recent: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Fetch from the named providers within the configured overall deadline
    pub async fn combined_fetch(
        &self,
        registry: &ProviderRegistry,
        query: &str,
        providers: &[String],
    ) -> FetchOutcome {
        self.combined_fetch_within(registry, query, providers, self.settings.overall_deadline())
            .await
    }

    /// Fetch from the named providers, keeping whatever completed by `budget`.
    ///
    /// Never fails: every requested provider gets a status entry, and a
    /// provider that errors, times out or is unknown is reported degraded
    /// while the others still contribute.
    pub async fn combined_fetch_within(
        &self,
        registry: &ProviderRegistry,
        query: &str,
        providers: &[String],
        budget: Duration,
    ) -> FetchOutcome {
        let fetch_id = Uuid::new_v4();
        let span = tracing::info_span!("combined_fetch", %fetch_id, query = %query);

        async move {
            let deadline = Instant::now() + budget;
            let limit = self.settings.fetch_limit;
            let mut status = StatusMap::new();
            let mut records = RecordSet::new();
            let mut requested: BTreeSet<&str> = BTreeSet::new();
            let mut pending = FuturesUnordered::new();

            for name in providers {
                if !requested.insert(name.as_str()) {
                    continue;
                }
                match registry.get(name) {
                    Some(provider) => pending.push(self.fetch_one(provider, query, limit)),
                    None => {
                        warn!(provider = %name, "Requested provider is not registered");
                        status.insert(
                            name.clone(),
                            ProviderReport::degraded(
                                0,
                                DegradedReason::NotRegistered,
                                format!("provider '{}' is not registered", name),
                            ),
                        );
                    }
                }
            }

            loop {
                match tokio::time::timeout_at(deadline, pending.next()).await {
                    Ok(Some((name, report, fetched))) => {
                        if report.is_online() {
                            records.insert_group(&name, fetched);
                        }
                        status.insert(name, report);
                    }
                    Ok(None) => break,
                    Err(_) => {
                        warn!(
                            unfinished = pending.len(),
                            budget_ms = budget.as_millis() as u64,
                            "Overall deadline reached, keeping completed providers"
                        );
                        break;
                    }
                }
            }
            drop(pending);

            let budget_ms = budget.as_millis() as u64;
            for name in requested {
                if !status.contains_key(name) {
                    metrics::record_provider_fetch(name, "deadline_exceeded", budget.as_secs_f64());
                    status.insert(
                        name.to_string(),
                        ProviderReport::degraded(
                            budget_ms,
                            DegradedReason::DeadlineExceeded,
                            "overall deadline exceeded",
                        ),
                    );
                }
            }

            {
                let mut recent = self.recent.write().await;
                for (name, report) in &status {
                    if report.reason != Some(DegradedReason::NotRegistered) {
                        metrics::record_provider_health(name, report.is_online());
                        recent.insert(name.clone(), report.clone());
                    }
                }
            }

            let outcome = FetchOutcome {
                fetch_id,
                records,
                status,
            };
            info!(
                records = outcome.records.len(),
                degraded = outcome.degraded().len(),
                "Combined fetch complete"
            );
            outcome
        }
        .instrument(span)
        .await
    }

    async fn fetch_one(
        &self,
        provider: Arc<dyn Provider>,
        query: &str,
        limit: usize,
    ) -> (String, ProviderReport, Vec<Record>) {
        let name = provider.name().to_string();
        let key = keys::provider_fetch(&name, query, limit);
        let started = Instant::now();

        if let Some(cached) = self.cache.get::<Vec<Record>>(&key).await {
            debug!(provider = %name, records = cached.len(), "Provider response served from cache");
            metrics::record_provider_fetch(&name, "cached", started.elapsed().as_secs_f64());
            let report = ProviderReport::online(elapsed_ms(started), cached.len(), true);
            return (name, report, cached);
        }

        let result = tokio::time::timeout(self.settings.provider_timeout(), provider.fetch(query, limit)).await;
        let latency_ms = elapsed_ms(started);
        let duration_secs = started.elapsed().as_secs_f64();

        match result {
            Ok(Ok(mut fetched)) => {
                for record in &mut fetched {
                    record.provider = name.clone();
                }
                self.cache.set_with_ttl(&key, &fetched, self.fetch_ttl).await;
                metrics::record_provider_fetch(&name, "ok", duration_secs);
                debug!(provider = %name, records = fetched.len(), latency_ms, "Provider fetch ok");
                (name, ProviderReport::online(latency_ms, fetched.len(), false), fetched)
            }
            Ok(Err(e)) => {
                let reason = if e.is_transient() {
                    DegradedReason::Transient
                } else {
                    DegradedReason::Permanent
                };
                metrics::record_provider_fetch(&name, reason_label(reason), duration_secs);
                warn!(provider = %name, error = %e, latency_ms, "Provider fetch failed");
                (name, ProviderReport::degraded(latency_ms, reason, e.to_string()), Vec::new())
            }
            Err(_) => {
                metrics::record_provider_fetch(&name, reason_label(DegradedReason::Timeout), duration_secs);
                warn!(provider = %name, latency_ms, "Provider fetch timed out");
                let report = ProviderReport::degraded(
                    latency_ms,
                    DegradedReason::Timeout,
                    format!("no response within {} ms", self.settings.provider_timeout_ms),
                );
                (name, report, Vec::new())
            }
        }
    }

    /// Last observed fetch outcome per provider
    pub async fn recent_status(&self) -> StatusMap {
        self.recent.read().await.clone()
    }

    /// Actively check every registered provider, each under the provider timeout
    pub async fn check_health(&self, registry: &ProviderRegistry) -> BTreeMap<String, ProviderHealth> {
        let timeout = self.settings.provider_timeout();
        let checks = registry.iter().map(|(name, provider)| {
            let name = name.to_string();
            let provider = Arc::clone(provider);
            async move {
                let started = Instant::now();
                let online = matches!(
                    tokio::time::timeout(timeout, provider.health_check()).await,
                    Ok(Ok(()))
                );
                metrics::record_provider_health(&name, online);
                let health = ProviderHealth {
                    status: if online {
                        ProviderStatus::Online
                    } else {
                        ProviderStatus::Degraded
                    },
                    latency_ms: elapsed_ms(started),
                };
                (name, health)
            }
        });

        futures::future::join_all(checks).await.into_iter().collect()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn reason_label(reason: DegradedReason) -> &'static str {
    match reason {
        DegradedReason::Timeout => "timeout",
        DegradedReason::DeadlineExceeded => "deadline_exceeded",
        DegradedReason::Transient => "transient",
        DegradedReason::Permanent => "permanent",
        DegradedReason::NotRegistered => "not_registered",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinsight_common::models::RecordSource;
    use clinsight_common::providers::StaticProvider;
    use clinsight_common::ProviderError;

    fn settings(provider_timeout_ms: u64, overall_deadline_ms: u64) -> OrchestratorSettings {
        OrchestratorSettings {
            provider_timeout_ms,
            overall_deadline_ms,
            fetch_limit: 10,
        }
    }

    fn orchestrator(provider_timeout_ms: u64, overall_deadline_ms: u64) -> Orchestrator {
        Orchestrator::new(
            Arc::new(Cache::in_memory(64)),
            settings(provider_timeout_ms, overall_deadline_ms),
            Duration::from_secs(600),
        )
    }

    fn record(source: RecordSource, id: &str, title: &str) -> Record {
        Record::new(source, "x", id, title, "")
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn three_providers(failing: Option<ProviderError>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        let labels = StaticProvider::new("openfda", RecordSource::DrugLabel)
            .with_records([record(RecordSource::DrugLabel, "set-1", "aspirin label")]);
        let labels = match failing {
            Some(e) => labels.with_error(e),
            None => labels,
        };
        registry.register(Arc::new(labels)).unwrap();
        registry
            .register(Arc::new(
                StaticProvider::new("pubmed", RecordSource::Paper)
                    .with_records([record(RecordSource::Paper, "1", "aspirin outcomes")]),
            ))
            .unwrap();
        registry
            .register(Arc::new(
                StaticProvider::new("clinicaltrials", RecordSource::Trial)
                    .with_records([record(RecordSource::Trial, "NCT1", "aspirin trial")]),
            ))
            .unwrap();
        registry
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_provider_does_not_block_others() {
        let registry = three_providers(Some(ProviderError::permanent("openfda", "HTTP 400")));
        let orch = orchestrator(1_000, 5_000);

        let outcome = orch
            .combined_fetch(&registry, "aspirin", &names(&["openfda", "pubmed", "clinicaltrials"]))
            .await;

        assert_eq!(outcome.status.len(), 3);
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.records.group("openfda").is_empty());
        let report = &outcome.status["openfda"];
        assert_eq!(report.status, ProviderStatus::Degraded);
        assert_eq!(report.reason, Some(DegradedReason::Permanent));
        assert_eq!(outcome.degraded(), vec!["openfda".to_string()]);
        assert!(!outcome.all_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_providers_time_out() {
        let mut registry = ProviderRegistry::new();
        for name in ["a", "b", "c"] {
            registry
                .register(Arc::new(
                    StaticProvider::new(name, RecordSource::Paper).with_delay(Duration::from_secs(60)),
                ))
                .unwrap();
        }
        let orch = orchestrator(1_000, 5_000);

        let outcome = orch.combined_fetch(&registry, "x", &names(&["a", "b", "c"])).await;

        assert!(outcome.records.is_empty());
        assert!(outcome.all_degraded());
        assert!(outcome
            .status
            .values()
            .all(|r| r.reason == Some(DegradedReason::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_keeps_completed_results() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(Arc::new(
                StaticProvider::new("fast", RecordSource::Paper)
                    .with_records([record(RecordSource::Paper, "1", "aspirin")]),
            ))
            .unwrap();
        registry
            .register(Arc::new(
                StaticProvider::new("slow", RecordSource::Trial)
                    .with_records([record(RecordSource::Trial, "NCT1", "aspirin")])
                    .with_delay(Duration::from_secs(3)),
            ))
            .unwrap();
        let orch = orchestrator(10_000, 2_000);

        let outcome = orch.combined_fetch(&registry, "aspirin", &names(&["fast", "slow"])).await;

        assert_eq!(outcome.records.group("fast").len(), 1);
        assert!(outcome.status["fast"].is_online());
        assert_eq!(outcome.status["slow"].reason, Some(DegradedReason::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_response_skips_provider() {
        let provider = Arc::new(
            StaticProvider::new("pubmed", RecordSource::Paper)
                .with_records([record(RecordSource::Paper, "1", "aspirin outcomes")]),
        );
        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone()).unwrap();
        let orch = orchestrator(1_000, 5_000);

        let first = orch.combined_fetch(&registry, "Aspirin", &names(&["pubmed"])).await;
        let second = orch.combined_fetch(&registry, "aspirin ", &names(&["pubmed"])).await;

        assert_eq!(provider.calls(), 1);
        assert!(!first.status["pubmed"].cached);
        assert!(second.status["pubmed"].cached);
        assert_eq!(second.records.len(), 1);
        assert_ne!(first.fetch_id, second.fetch_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_is_online_and_cached() {
        let provider = Arc::new(StaticProvider::new("pubmed", RecordSource::Paper));
        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone()).unwrap();
        let orch = orchestrator(1_000, 5_000);

        let outcome = orch.combined_fetch(&registry, "nothing", &names(&["pubmed"])).await;
        orch.combined_fetch(&registry, "nothing", &names(&["pubmed"])).await;

        assert!(outcome.status["pubmed"].is_online());
        assert_eq!(outcome.status["pubmed"].records, 0);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_and_unknown_names() {
        let provider = Arc::new(StaticProvider::new("pubmed", RecordSource::Paper));
        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone()).unwrap();
        let orch = orchestrator(1_000, 5_000);

        let outcome = orch
            .combined_fetch(&registry, "x", &names(&["pubmed", "pubmed", "ghost"]))
            .await;

        assert_eq!(provider.calls(), 1);
        assert_eq!(outcome.status.len(), 2);
        assert_eq!(outcome.status["ghost"].reason, Some(DegradedReason::NotRegistered));
        assert!(!orch.recent_status().await.contains_key("ghost"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_provider_list() {
        let orch = orchestrator(1_000, 5_000);
        let outcome = orch.combined_fetch(&ProviderRegistry::new(), "x", &[]).await;

        assert!(outcome.records.is_empty());
        assert!(outcome.status.is_empty());
        assert!(!outcome.all_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_status_tracks_last_outcome() {
        let registry = three_providers(Some(ProviderError::transient("openfda", "HTTP 503")));
        let orch = orchestrator(1_000, 5_000);

        orch.combined_fetch(&registry, "aspirin", &names(&["openfda", "pubmed"])).await;
        let recent = orch.recent_status().await;

        assert_eq!(recent.len(), 2);
        assert_eq!(recent["openfda"].reason, Some(DegradedReason::Transient));
        assert!(recent["pubmed"].is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_health() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(Arc::new(StaticProvider::new("ok", RecordSource::Paper)))
            .unwrap();
        registry
            .register(Arc::new(StaticProvider::new("down", RecordSource::Trial).unhealthy()))
            .unwrap();
        registry
            .register(Arc::new(
                StaticProvider::new("hung", RecordSource::DrugLabel).with_delay(Duration::from_secs(30)),
            ))
            .unwrap();
        let orch = orchestrator(1_000, 5_000);

        let health = orch.check_health(&registry).await;

        assert_eq!(health.len(), 3);
        assert_eq!(health["ok"].status, ProviderStatus::Online);
        assert_eq!(health["down"].status, ProviderStatus::Degraded);
        assert_eq!(health["hung"].status, ProviderStatus::Degraded);
    }
}
