//! Configuration management for Clinsight services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Two-tier cache configuration
    #[serde(default)]
    pub cache: CacheSettings,

    /// Provider fan-out configuration
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Built-in provider configuration
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Evidence scoring policy
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// External lexicon override
    #[serde(default)]
    pub lexicon: LexiconConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    /// Maximum entries held in the memory tier
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,

    /// Directory of the disk tier (disabled when unset)
    #[serde(default = "default_disk_dir")]
    pub disk_dir: Option<PathBuf>,

    /// TTL for cached provider responses
    #[serde(default = "default_fetch_ttl")]
    pub fetch_ttl_secs: u64,

    /// TTL for computed graphs, findings and syntheses
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: u64,

    /// Key prefix for namespacing
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorSettings {
    /// Timeout applied to each provider fetch independently
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_ms: u64,

    /// Overall deadline for one combined fetch
    #[serde(default = "default_overall_deadline")]
    pub overall_deadline_ms: u64,

    /// Maximum records requested from each provider
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_openfda")]
    pub openfda: ProviderEndpoint,

    #[serde(default = "default_pubmed")]
    pub pubmed: ProviderEndpoint,

    #[serde(default = "default_clinicaltrials")]
    pub clinicaltrials: ProviderEndpoint,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEndpoint {
    /// Register this provider at startup
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// API base URL
    pub base_url: String,

    /// Requests per second allowed against the upstream
    pub requests_per_second: u32,

    /// Optional API key (openFDA and NCBI accept one for higher quotas)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Maximum retries for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringConfig {
    #[serde(default = "default_label_weight")]
    pub label_weight: f64,

    #[serde(default = "default_phase3_weight")]
    pub phase3_weight: f64,

    #[serde(default = "default_research_weight")]
    pub research_weight: f64,

    /// Phase III trials needed for the full trial weight
    #[serde(default = "default_phase3_cap")]
    pub phase3_cap: u32,

    /// Paper count at which the log-scaled research signal saturates
    #[serde(default = "default_paper_saturation")]
    pub paper_saturation: u32,

    /// Length of the ranked intervention list
    #[serde(default = "default_top_interventions")]
    pub top_interventions: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LexiconConfig {
    /// Path to a lexicon JSON replacing the bundled one
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Expose Prometheus metrics on the gateway
    #[serde(default = "default_enabled")]
    pub metrics_enabled: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_memory_capacity() -> usize { 512 }
fn default_disk_dir() -> Option<PathBuf> { Some(PathBuf::from(".clinsight_cache")) }
fn default_fetch_ttl() -> u64 { 600 }
fn default_result_ttl() -> u64 { 300 }
fn default_key_prefix() -> String { "clinsight".to_string() }
fn default_provider_timeout() -> u64 { 10_000 }
fn default_overall_deadline() -> u64 { 15_000 }
fn default_fetch_limit() -> usize { 10 }
fn default_max_retries() -> u32 { 2 }
fn default_label_weight() -> f64 { 0.3 }
fn default_phase3_weight() -> f64 { 0.4 }
fn default_research_weight() -> f64 { 0.3 }
fn default_phase3_cap() -> u32 { 2 }
fn default_paper_saturation() -> u32 { 10 }
fn default_top_interventions() -> usize { 5 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "clinsight".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

fn default_openfda() -> ProviderEndpoint {
    ProviderEndpoint {
        enabled: true,
        base_url: "https://api.fda.gov/drug/label.json".to_string(),
        requests_per_second: 5,
        api_key: None,
        max_retries: default_max_retries(),
    }
}

fn default_pubmed() -> ProviderEndpoint {
    ProviderEndpoint {
        enabled: true,
        base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
        requests_per_second: 3,
        api_key: None,
        max_retries: default_max_retries(),
    }
}

fn default_clinicaltrials() -> ProviderEndpoint {
    ProviderEndpoint {
        enabled: true,
        base_url: "https://clinicaltrials.gov/api/v2/studies".to_string(),
        requests_per_second: 5,
        api_key: None,
        max_retries: default_max_retries(),
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__ORCHESTRATOR__PROVIDER_TIMEOUT_MS=5000
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl OrchestratorSettings {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn overall_deadline(&self) -> Duration {
        Duration::from_millis(self.overall_deadline_ms)
    }
}

impl CacheSettings {
    pub fn fetch_ttl(&self) -> Duration {
        Duration::from_secs(self.fetch_ttl_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            memory_capacity: default_memory_capacity(),
            disk_dir: default_disk_dir(),
            fetch_ttl_secs: default_fetch_ttl(),
            result_ttl_secs: default_result_ttl(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            provider_timeout_ms: default_provider_timeout(),
            overall_deadline_ms: default_overall_deadline(),
            fetch_limit: default_fetch_limit(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openfda: default_openfda(),
            pubmed: default_pubmed(),
            clinicaltrials: default_clinicaltrials(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            label_weight: default_label_weight(),
            phase3_weight: default_phase3_weight(),
            research_weight: default_research_weight(),
            phase3_cap: default_phase3_cap(),
            paper_saturation: default_paper_saturation(),
            top_interventions: default_top_interventions(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_enabled: default_enabled(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.providers.pubmed.requests_per_second, 3);
        assert_eq!(config.scoring.phase3_cap, 2);
        assert!((config.scoring.label_weight - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.orchestrator.provider_timeout(), Duration::from_secs(10));
        assert_eq!(config.cache.fetch_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = Config::builder()
            .add_source(config::File::from_str(
                "[orchestrator]\nprovider_timeout_ms = 2500\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.orchestrator.provider_timeout_ms, 2500);
        assert_eq!(config.orchestrator.fetch_limit, 10);
        assert_eq!(config.cache.memory_capacity, 512);
    }
}
