//! openFDA drug label provider

use super::http::{create_rate_limiter, send_json, with_retry, ProviderRateLimiter};
use super::{Provider, OPENFDA};
use crate::config::ProviderEndpoint;
use crate::errors::{AppError, ProviderError, Result};
use crate::models::{fields, Record, RecordSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Label sections copied into structured fields
const LABEL_SECTIONS: &[&str] = &[
    fields::INDICATIONS,
    fields::DRUG_INTERACTIONS,
    fields::CONTRAINDICATIONS,
    fields::BOXED_WARNING,
    fields::WARNINGS,
    fields::WARNINGS_AND_CAUTIONS,
];

pub struct OpenFdaProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    limiter: Arc<ProviderRateLimiter>,
}

#[derive(Deserialize)]
struct LabelResponse {
    #[serde(default)]
    results: Vec<LabelResult>,
}

#[derive(Deserialize)]
struct LabelResult {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    set_id: Option<String>,
    #[serde(default)]
    openfda: OpenFdaNames,
    #[serde(flatten)]
    sections: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct OpenFdaNames {
    #[serde(default)]
    brand_name: Vec<String>,
    #[serde(default)]
    generic_name: Vec<String>,
    #[serde(default)]
    substance_name: Vec<String>,
    #[serde(default)]
    manufacturer_name: Vec<String>,
}

impl OpenFdaProvider {
    pub fn new(endpoint: &ProviderEndpoint, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create openFDA client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: endpoint.base_url.clone(),
            api_key: endpoint.api_key.clone(),
            max_retries: endpoint.max_retries,
            limiter: create_rate_limiter(endpoint.requests_per_second),
        })
    }

    fn request(&self, search: &str, limit: usize) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(&self.base_url)
            .query(&[("search", search), ("limit", limit.to_string().as_str())]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key)]);
        }
        request
    }

    async fn search_once(&self, search: &str, limit: usize) -> std::result::Result<Vec<Record>, ProviderError> {
        self.limiter.until_ready().await;
        let response: Option<LabelResponse> = send_json(OPENFDA, self.request(search, limit)).await?;
        Ok(response
            .map(|r| r.results.into_iter().filter_map(label_to_record).collect())
            .unwrap_or_default())
    }
}

fn label_to_record(label: LabelResult) -> Option<Record> {
    let external_id = label.set_id.or(label.id)?;
    let names = label.openfda;
    let title = names
        .brand_name
        .first()
        .or_else(|| names.generic_name.first())
        .cloned()
        .unwrap_or_else(|| "Unknown label".to_string());

    let section = |key: &str| -> Vec<String> {
        match label.sections.get(key) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(serde_json::Value::String(s)) => vec![s.trim().to_string()],
            _ => Vec::new(),
        }
    };

    let body = section(fields::INDICATIONS).join("\n");
    let mut record = Record::new(RecordSource::DrugLabel, OPENFDA, external_id, title, body)
        .with_field(fields::BRAND_NAME, names.brand_name.clone())
        .with_field(fields::GENERIC_NAME, names.generic_name.clone())
        .with_field(fields::ACTIVE_INGREDIENTS, names.substance_name)
        .with_field(fields::MANUFACTURER, names.manufacturer_name);

    for &key in LABEL_SECTIONS {
        let values = section(key);
        if !values.is_empty() {
            record = record.with_field(key, values);
        }
    }
    record.structured_fields.retain(|_, values| !values.is_empty());
    Some(record)
}

#[async_trait]
impl Provider for OpenFdaProvider {
    fn name(&self) -> &str {
        OPENFDA
    }

    fn kind(&self) -> RecordSource {
        RecordSource::DrugLabel
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["drugs".to_string(), "labels".to_string(), "safety".to_string()]
    }

    async fn fetch(&self, query: &str, limit: usize) -> std::result::Result<Vec<Record>, ProviderError> {
        let term = query.replace('"', "");
        let search = format!(
            "openfda.brand_name:\"{term}\" openfda.generic_name:\"{term}\""
        );
        with_retry(OPENFDA, self.max_retries, || self.search_once(&search, limit)).await
    }

    async fn health_check(&self) -> std::result::Result<(), ProviderError> {
        self.limiter.until_ready().await;
        send_json::<serde_json::Value>(OPENFDA, self.request("openfda.generic_name:\"aspirin\"", 1))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_mapping() {
        let raw = serde_json::json!({
            "set_id": "set-123",
            "openfda": {
                "brand_name": ["COUMADIN"],
                "generic_name": ["WARFARIN SODIUM"],
                "manufacturer_name": ["Bristol-Myers Squibb"]
            },
            "indications_and_usage": ["Prophylaxis and treatment of venous thrombosis."],
            "drug_interactions": ["Aspirin may increase bleeding risk; monitor INR."],
            "boxed_warning": ["BLEEDING RISK"],
            "spl_product_data_elements": ["ignored"]
        });
        let label: LabelResult = serde_json::from_value(raw).unwrap();
        let record = label_to_record(label).unwrap();

        assert_eq!(record.external_id, "set-123");
        assert_eq!(record.title, "COUMADIN");
        assert_eq!(record.source, RecordSource::DrugLabel);
        assert!(record.body_text.contains("venous thrombosis"));
        assert_eq!(record.field(fields::DRUG_INTERACTIONS).len(), 1);
        assert_eq!(record.first_field(fields::GENERIC_NAME), Some("WARFARIN SODIUM"));
        assert!(!record.structured_fields.contains_key("spl_product_data_elements"));
        assert!(!record.structured_fields.contains_key(fields::ACTIVE_INGREDIENTS));
    }

    #[test]
    fn test_substances_map_to_active_ingredients() {
        let raw = serde_json::json!({
            "set_id": "set-e",
            "openfda": {
                "brand_name": ["EXCEDRIN"],
                "generic_name": ["ACETAMINOPHEN, ASPIRIN, AND CAFFEINE"],
                "substance_name": ["ACETAMINOPHEN", "ASPIRIN", "CAFFEINE"]
            }
        });
        let label: LabelResult = serde_json::from_value(raw).unwrap();
        let record = label_to_record(label).unwrap();

        assert_eq!(record.field(fields::ACTIVE_INGREDIENTS).len(), 3);
        assert!(record.field(fields::ALIASES).is_empty());
        assert!(!record.drug_names().contains(&"ASPIRIN"));
    }

    #[test]
    fn test_label_without_id_is_skipped() {
        let label: LabelResult = serde_json::from_value(serde_json::json!({ "openfda": {} })).unwrap();
        assert!(label_to_record(label).is_none());
    }

    #[test]
    fn test_empty_response_parses() {
        let response: LabelResponse = serde_json::from_str("{}").unwrap();
        assert!(response.results.is_empty());
    }
}
