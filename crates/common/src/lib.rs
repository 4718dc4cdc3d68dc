//! Clinsight Common Library
//!
//! Shared code for the intelligence layer and the gateway:
//! - Error taxonomy and HTTP mapping
//! - Configuration management
//! - Record data model and provider status
//! - Two-tier response cache
//! - Provider gateway with built-in HTTP providers
//! - Metrics and observability

pub mod cache;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod providers;

// Re-export commonly used types
pub use cache::Cache;
pub use config::AppConfig;
pub use errors::{AppError, ProviderError, Result};
pub use models::{Record, RecordSet, RecordSource};
pub use providers::{Provider, ProviderRegistry};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
