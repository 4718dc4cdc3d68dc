//! ClinicalTrials.gov API v2 trial provider
//!
//! The registry intermittently rejects automated clients, so requests go
//! over HTTP/1.1 with `Connection: close` and a browser user agent.

use super::http::{create_rate_limiter, send_json, with_retry, ProviderRateLimiter};
use super::{Provider, CLINICALTRIALS};
use crate::config::ProviderEndpoint;
use crate::errors::{AppError, ProviderError, Result};
use crate::models::{fields, Record, RecordSource};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONNECTION};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct ClinicalTrialsProvider {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    limiter: Arc<ProviderRateLimiter>,
}

#[derive(Deserialize)]
struct StudiesResponse {
    #[serde(default)]
    studies: Vec<Study>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Study {
    #[serde(default)]
    protocol_section: ProtocolSection,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ProtocolSection {
    #[serde(default)]
    identification_module: IdentificationModule,
    #[serde(default)]
    status_module: StatusModule,
    #[serde(default)]
    design_module: DesignModule,
    #[serde(default)]
    conditions_module: ConditionsModule,
    #[serde(default)]
    arms_interventions_module: ArmsInterventionsModule,
    #[serde(default)]
    description_module: DescriptionModule,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct IdentificationModule {
    nct_id: Option<String>,
    brief_title: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct StatusModule {
    overall_status: Option<String>,
}

#[derive(Deserialize, Default)]
struct DesignModule {
    #[serde(default)]
    phases: Vec<String>,
}

#[derive(Deserialize, Default)]
struct ConditionsModule {
    #[serde(default)]
    conditions: Vec<String>,
}

#[derive(Deserialize, Default)]
struct ArmsInterventionsModule {
    #[serde(default)]
    interventions: Vec<Intervention>,
}

#[derive(Deserialize)]
struct Intervention {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DescriptionModule {
    brief_summary: Option<String>,
}

impl ClinicalTrialsProvider {
    pub fn new(endpoint: &ProviderEndpoint, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        let client = reqwest::Client::builder()
            .http1_only()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create ClinicalTrials.gov client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: endpoint.base_url.clone(),
            max_retries: endpoint.max_retries,
            limiter: create_rate_limiter(endpoint.requests_per_second),
        })
    }

    async fn search_once(&self, query: &str, limit: usize) -> std::result::Result<Vec<Record>, ProviderError> {
        self.limiter.until_ready().await;
        let page_size = limit.to_string();
        let request = self
            .client
            .get(&self.base_url)
            .query(&[("query.term", query), ("pageSize", page_size.as_str())]);

        let response: Option<StudiesResponse> = send_json(CLINICALTRIALS, request).await?;
        Ok(response
            .map(|r| r.studies.into_iter().filter_map(study_to_record).collect())
            .unwrap_or_default())
    }
}

fn study_to_record(study: Study) -> Option<Record> {
    let protocol = study.protocol_section;
    let nct_id = protocol.identification_module.nct_id?;
    let title = protocol
        .identification_module
        .brief_title
        .unwrap_or_else(|| "Unknown trial".to_string());
    let summary = protocol.description_module.brief_summary.unwrap_or_default();
    let interventions: Vec<String> = protocol
        .arms_interventions_module
        .interventions
        .into_iter()
        .filter_map(|i| i.name)
        .collect();

    let mut record = Record::new(RecordSource::Trial, CLINICALTRIALS, nct_id.clone(), title, summary)
        .with_field(fields::NCT_ID, [nct_id])
        .with_field(fields::STATUS, protocol.status_module.overall_status)
        .with_field(fields::PHASES, protocol.design_module.phases)
        .with_field(fields::CONDITIONS, protocol.conditions_module.conditions)
        .with_field(fields::INTERVENTIONS, interventions);
    record.structured_fields.retain(|_, values| !values.is_empty());
    Some(record)
}

#[async_trait]
impl Provider for ClinicalTrialsProvider {
    fn name(&self) -> &str {
        CLINICALTRIALS
    }

    fn kind(&self) -> RecordSource {
        RecordSource::Trial
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["trials".to_string(), "studies".to_string(), "recruiting".to_string()]
    }

    async fn fetch(&self, query: &str, limit: usize) -> std::result::Result<Vec<Record>, ProviderError> {
        with_retry(CLINICALTRIALS, self.max_retries, || self.search_once(query, limit)).await
    }

    async fn health_check(&self) -> std::result::Result<(), ProviderError> {
        self.search_once("cancer", 1).await.map(|_| ())
    }
}
