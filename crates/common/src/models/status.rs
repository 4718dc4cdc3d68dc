//! Per-provider outcome reporting

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Online,
    Degraded,
}

/// Why a provider was marked degraded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    Timeout,
    DeadlineExceeded,
    Transient,
    Permanent,
    NotRegistered,
}

/// Outcome of one provider for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderReport {
    pub status: ProviderStatus,

    pub latency_ms: u64,

    /// Records contributed to the combined set
    pub records: usize,

    /// Served from cache without touching the network
    #[serde(default)]
    pub cached: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DegradedReason>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderReport {
    pub fn online(latency_ms: u64, records: usize, cached: bool) -> Self {
        Self {
            status: ProviderStatus::Online,
            latency_ms,
            records,
            cached,
            reason: None,
            error: None,
        }
    }

    pub fn degraded(latency_ms: u64, reason: DegradedReason, error: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::Degraded,
            latency_ms,
            records: 0,
            cached: false,
            reason: Some(reason),
            error: Some(error.into()),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == ProviderStatus::Online
    }
}

/// Provider name -> outcome, in name order
pub type StatusMap = BTreeMap<String, ProviderReport>;

/// Health snapshot returned by `provider_status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub status: ProviderStatus,
    pub latency_ms: u64,
}
