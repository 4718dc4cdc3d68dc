//! PubMed (NCBI Entrez) paper provider
//!
//! Two-step lookup: `esearch` for PMIDs, then `esummary` for titles,
//! journals, dates and authors.

use super::http::{create_rate_limiter, send_json, with_retry, ProviderRateLimiter};
use super::{Provider, PUBMED};
use crate::config::ProviderEndpoint;
use crate::errors::{AppError, ProviderError, Result};
use crate::models::{fields, Record, RecordSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub struct PubMedProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    limiter: Arc<ProviderRateLimiter>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    esearchresult: SearchResult,
}

#[derive(Deserialize, Default)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    result: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct Summary {
    #[serde(default)]
    title: String,
    #[serde(default)]
    fulljournalname: Option<String>,
    #[serde(default)]
    pubdate: Option<String>,
    #[serde(default)]
    authors: Vec<Author>,
}

#[derive(Deserialize)]
struct Author {
    #[serde(default)]
    name: Option<String>,
}

impl PubMedProvider {
    pub fn new(endpoint: &ProviderEndpoint, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create PubMed client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            api_key: endpoint.api_key.clone(),
            max_retries: endpoint.max_retries,
            limiter: create_rate_limiter(endpoint.requests_per_second),
        })
    }

    fn request(&self, utility: &str, params: &[(&str, &str)]) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(format!("{}/{}.fcgi", self.base_url, utility))
            .query(&[("db", "pubmed"), ("retmode", "json")])
            .query(params);
        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key)]);
        }
        request
    }

    async fn search_ids(&self, query: &str, limit: usize) -> std::result::Result<Vec<String>, ProviderError> {
        self.limiter.until_ready().await;
        let retmax = limit.to_string();
        let response: Option<SearchResponse> = send_json(
            PUBMED,
            self.request("esearch", &[("term", query), ("retmax", retmax.as_str())]),
        )
        .await?;
        Ok(response.map(|r| r.esearchresult.idlist).unwrap_or_default())
    }

    async fn summaries(&self, pmids: &[String]) -> std::result::Result<Vec<Record>, ProviderError> {
        self.limiter.until_ready().await;
        let ids = pmids.join(",");
        let response: Option<SummaryResponse> =
            send_json(PUBMED, self.request("esummary", &[("id", ids.as_str())])).await?;
        Ok(response
            .map(|r| parse_summaries(&r.result, pmids))
            .unwrap_or_default())
    }
}

/// Build paper records in PMID order, skipping ids the summary lacks
fn parse_summaries(result: &BTreeMap<String, serde_json::Value>, pmids: &[String]) -> Vec<Record> {
    let mut papers = Vec::with_capacity(pmids.len());
    for pmid in pmids {
        let Some(raw) = result.get(pmid) else { continue };
        if raw.get("error").is_some() {
            continue;
        }
        let Ok(summary) = serde_json::from_value::<Summary>(raw.clone()) else {
            tracing::debug!(pmid = %pmid, "Skipping malformed PubMed summary");
            continue;
        };

        let title = if summary.title.trim().is_empty() {
            "Untitled publication".to_string()
        } else {
            summary.title.trim().to_string()
        };
        let authors: Vec<String> = summary.authors.into_iter().filter_map(|a| a.name).collect();
        let year = summary
            .pubdate
            .as_deref()
            .and_then(|d| d.split_whitespace().next())
            .filter(|y| y.len() == 4 && y.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string);

        let mut record = Record::new(RecordSource::Paper, PUBMED, pmid.clone(), title.clone(), title)
            .with_field(fields::AUTHORS, authors)
            .with_field(fields::JOURNAL, summary.fulljournalname)
            .with_field(fields::PUBLICATION_YEAR, year)
            .with_field("url", [format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid)]);
        record.structured_fields.retain(|_, values| !values.is_empty());
        papers.push(record);
    }
    papers
}

#[async_trait]
impl Provider for PubMedProvider {
    fn name(&self) -> &str {
        PUBMED
    }

    fn kind(&self) -> RecordSource {
        RecordSource::Paper
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["papers".to_string(), "publications".to_string(), "literature".to_string()]
    }

    async fn fetch(&self, query: &str, limit: usize) -> std::result::Result<Vec<Record>, ProviderError> {
        let pmids = with_retry(PUBMED, self.max_retries, || self.search_ids(query, limit)).await?;
        if pmids.is_empty() {
            return Ok(Vec::new());
        }
        with_retry(PUBMED, self.max_retries, || self.summaries(&pmids)).await
    }

    async fn health_check(&self) -> std::result::Result<(), ProviderError> {
        self.search_ids("test", 1).await.map(|_| ())
    }
}
