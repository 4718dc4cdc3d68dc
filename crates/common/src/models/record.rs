//! Normalized fact units fetched from providers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which kind of source a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    DrugLabel,
    Paper,
    Trial,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSource::DrugLabel => "drug_label",
            RecordSource::Paper => "paper",
            RecordSource::Trial => "trial",
        }
    }
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known structured field keys shared by providers and engines
pub mod fields {
    pub const BRAND_NAME: &str = "brand_name";
    pub const GENERIC_NAME: &str = "generic_name";
    pub const ALIASES: &str = "aliases";
    /// Active substances; several on a combination product
    pub const ACTIVE_INGREDIENTS: &str = "active_ingredients";
    pub const MANUFACTURER: &str = "manufacturer";
    pub const INDICATIONS: &str = "indications_and_usage";
    pub const WARNINGS: &str = "warnings";
    pub const WARNINGS_AND_CAUTIONS: &str = "warnings_and_cautions";
    pub const BOXED_WARNING: &str = "boxed_warning";
    pub const CONTRAINDICATIONS: &str = "contraindications";
    pub const DRUG_INTERACTIONS: &str = "drug_interactions";

    pub const NCT_ID: &str = "nct_id";
    pub const PHASES: &str = "phases";
    pub const STATUS: &str = "status";
    pub const CONDITIONS: &str = "conditions";
    pub const INTERVENTIONS: &str = "interventions";

    pub const AUTHORS: &str = "authors";
    pub const JOURNAL: &str = "journal";
    pub const PUBLICATION_YEAR: &str = "publication_year";

    /// Label sections that carry interaction and safety language
    pub const SAFETY_SECTIONS: &[&str] = &[
        DRUG_INTERACTIONS,
        CONTRAINDICATIONS,
        BOXED_WARNING,
        WARNINGS,
        WARNINGS_AND_CAUTIONS,
    ];
}

/// A normalized fact unit from one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Kind of source
    pub source: RecordSource,

    /// Registered name of the provider that fetched it
    pub provider: String,

    /// Provider-native identifier (set id, PMID, NCT number)
    pub external_id: String,

    pub title: String,

    pub body_text: String,

    /// Provider-specific fields, e.g. trial phases or publication year
    #[serde(default)]
    pub structured_fields: BTreeMap<String, Vec<String>>,

    pub fetched_at: DateTime<Utc>,
}

impl Record {
    /// Create a record with no structured fields
    pub fn new(
        source: RecordSource,
        provider: impl Into<String>,
        external_id: impl Into<String>,
        title: impl Into<String>,
        body_text: impl Into<String>,
    ) -> Self {
        Self {
            source,
            provider: provider.into(),
            external_id: external_id.into(),
            title: title.into(),
            body_text: body_text.into(),
            structured_fields: BTreeMap::new(),
            fetched_at: Utc::now(),
        }
    }

    /// Builder-style field setter, appending values to any existing ones
    pub fn with_field<I, S>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.structured_fields
            .entry(key.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Stable identity of this record across queries
    pub fn record_id(&self) -> String {
        format!("{}:{}", self.provider, self.external_id)
    }

    pub fn field(&self, key: &str) -> &[String] {
        self.structured_fields
            .get(key)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn first_field(&self, key: &str) -> Option<&str> {
        self.field(key)
            .iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }

    /// Title, body and every structured value, for text matching
    pub fn searchable_text(&self) -> String {
        let mut text = String::with_capacity(self.title.len() + self.body_text.len() + 64);
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.body_text);
        for values in self.structured_fields.values() {
            for value in values {
                text.push('\n');
                text.push_str(value);
            }
        }
        text
    }

    /// Display names under which a drug-label record is known.
    ///
    /// A lone active ingredient names the same drug. The ingredients of a
    /// combination product are different drugs and are left out.
    pub fn drug_names(&self) -> Vec<&str> {
        let ingredients = self.field(fields::ACTIVE_INGREDIENTS);
        let single_ingredient = if ingredients.len() == 1 { ingredients } else { &[] };

        let mut names: Vec<&str> = Vec::new();
        let listed = [fields::GENERIC_NAME, fields::BRAND_NAME, fields::ALIASES]
            .into_iter()
            .flat_map(|key| self.field(key))
            .chain(single_ingredient);
        for value in listed {
            let value = value.trim();
            if !value.is_empty() && !names.iter().any(|n| n.eq_ignore_ascii_case(value)) {
                names.push(value);
            }
        }
        names
    }
}

/// Lower-case, strip punctuation and collapse whitespace.
///
/// Used as the identity key for graph nodes and vocabulary lookups.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else if ch.is_whitespace() || ch == '-' || ch == '/' {
            pending_space = true;
        }
    }
    out
}
