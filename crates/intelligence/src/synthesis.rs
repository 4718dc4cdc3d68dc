//! Evidence synthesis
//!
//! Provides:
//! - Mention-frequency ranking of interventions
//! - Weighted confidence score from label, trial and research signals
//! - Summary and key findings text
//!
//! A pure function of the record set: no I/O, no randomness, and
//! insensitive to record order.

use crate::lexicon::Lexicon;
use clinsight_common::config::ScoringConfig;
use clinsight_common::metrics;
use clinsight_common::models::{fields, normalize_name, Record, RecordSet, RecordSource};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Names longer than this are procedure descriptions, not interventions
const MAX_INTERVENTION_CHARS: usize = 100;
const MAX_SUGGESTED_TRIALS: usize = 3;

/// Scoring policy; defaults give label 0.3, Phase III 0.4, research 0.3
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    pub label: f64,
    pub phase3: f64,
    pub research: f64,
    /// Late-phase trials needed for the full trial weight
    pub phase3_cap: u32,
    /// Paper count at which the research signal saturates
    pub paper_saturation: u32,
    pub top_interventions: usize,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            label: 0.3,
            phase3: 0.4,
            research: 0.3,
            phase3_cap: 2,
            paper_saturation: 10,
            top_interventions: 5,
        }
    }
}

impl From<&ScoringConfig> for ScoringWeights {
    fn from(config: &ScoringConfig) -> Self {
        Self {
            label: config.label_weight,
            phase3: config.phase3_weight,
            research: config.research_weight,
            phase3_cap: config.phase3_cap,
            paper_saturation: config.paper_saturation,
            top_interventions: config.top_interventions,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceCount {
    pub labels: usize,
    pub trials: usize,
    pub papers: usize,
}

/// Ranked clinical conclusion for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub entity: String,
    pub summary: String,
    /// In [0, 1], two decimals
    pub confidence_score: f64,
    /// By descending mention count, ties alphabetical
    pub top_interventions: Vec<String>,
    /// Label, then trial, then research findings
    pub key_findings: Vec<String>,
    pub evidence_count: EvidenceCount,
    /// Recruiting trial ids
    pub suggested_trials: Vec<String>,
    /// Providers that contributed records
    pub sources: Vec<String>,
    /// Providers that failed for this query
    #[serde(default)]
    pub degraded: Vec<String>,
}

/// Signals behind a score, each already in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
struct Signals {
    label: f64,
    phase3: f64,
    research: f64,
}

/// One intervention and every spelling it is counted under
#[derive(Debug, Default)]
struct Candidate {
    display: Option<String>,
    spellings: BTreeSet<String>,
    names: BTreeSet<String>,
}

pub struct SynthesisScorer {
    lexicon: Arc<Lexicon>,
    weights: ScoringWeights,
}

impl SynthesisScorer {
    pub fn new(lexicon: Arc<Lexicon>, weights: ScoringWeights) -> Self {
        Self { lexicon, weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn synthesize(&self, entity: &str, records: &RecordSet) -> SynthesisResult {
        let entity = entity.trim();
        let labels: Vec<&Record> = records.of_source(RecordSource::DrugLabel).collect();
        let trials: Vec<&Record> = records.of_source(RecordSource::Trial).collect();
        let papers: Vec<&Record> = records.of_source(RecordSource::Paper).collect();

        let evidence_count = EvidenceCount {
            labels: labels.len(),
            trials: trials.len(),
            papers: papers.len(),
        };
        let sources: Vec<String> = records.providers().map(str::to_string).collect();

        if records.is_empty() {
            metrics::record_synthesis(0.0);
            return SynthesisResult {
                entity: entity.to_string(),
                summary: format!("No evidence found for '{}'.", entity),
                confidence_score: 0.0,
                top_interventions: Vec::new(),
                key_findings: vec![format!(
                    "No evidence found for '{}' in any responding provider",
                    entity
                )],
                evidence_count,
                suggested_trials: Vec::new(),
                sources,
                degraded: Vec::new(),
            };
        }

        let late_phase: BTreeSet<String> = trials
            .iter()
            .filter(|t| is_late_phase(t))
            .map(|t| t.record_id())
            .collect();
        let signals = self.signals(!labels.is_empty(), late_phase.len(), papers.len());
        let confidence_score = self.confidence(signals);

        let top_interventions = self.rank_interventions(records);
        let key_findings = key_findings(&labels, trials.len(), late_phase.len(), papers.len());
        let summary = summarize(entity, confidence_score, evidence_count);

        let recruiting: BTreeSet<String> = trials
            .iter()
            .filter(|t| t.field(fields::STATUS).iter().any(|s| normalize_name(s) == "recruiting"))
            .map(|t| {
                t.first_field(fields::NCT_ID)
                    .unwrap_or(t.external_id.as_str())
                    .to_string()
            })
            .collect();
        let suggested_trials: Vec<String> = recruiting.into_iter().take(MAX_SUGGESTED_TRIALS).collect();

        metrics::record_synthesis(confidence_score);
        tracing::info!(
            entity = %entity,
            confidence = confidence_score,
            records = records.len(),
            "Synthesis complete"
        );

        SynthesisResult {
            entity: entity.to_string(),
            summary,
            confidence_score,
            top_interventions,
            key_findings,
            evidence_count,
            suggested_trials,
            sources,
            degraded: Vec::new(),
        }
    }

    fn signals(&self, has_label: bool, late_phase: usize, papers: usize) -> Signals {
        let cap = self.weights.phase3_cap.max(1) as f64;
        let phase3 = (late_phase as f64 / cap).min(1.0);

        let saturation = self.weights.paper_saturation as f64;
        let research = if saturation <= 1.0 {
            (papers as f64).min(1.0)
        } else {
            ((1.0 + papers as f64).ln() / (1.0 + saturation).ln()).clamp(0.0, 1.0)
        };

        Signals {
            label: if has_label { 1.0 } else { 0.0 },
            phase3,
            research,
        }
    }

    fn confidence(&self, signals: Signals) -> f64 {
        let w = &self.weights;
        let raw = w.label * signals.label + w.phase3 * signals.phase3 + w.research * signals.research;
        let clamped = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 };
        (clamped * 100.0).round() / 100.0
    }

    /// Vocabulary drugs plus names the records themselves list as drugs or interventions
    fn candidates(&self, records: &RecordSet) -> BTreeMap<String, Candidate> {
        let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();

        for (display, names) in self.lexicon.drugs() {
            let candidate = candidates.entry(normalize_name(&display)).or_default();
            candidate.display = Some(display);
            candidate.names.extend(names);
        }

        let mut add = |written: Vec<&str>| {
            let usable: Vec<&str> = written
                .iter()
                .map(|w| w.trim())
                .filter(|w| !w.is_empty() && w.chars().count() < MAX_INTERVENTION_CHARS)
                .collect();
            let Some(first) = usable.first() else { return };
            let key = usable
                .iter()
                .find_map(|w| self.lexicon.lookup(w).map(|e| normalize_name(&e.display)))
                .filter(|key| candidates.contains_key(key))
                .unwrap_or_else(|| normalize_name(first));
            if key.is_empty() {
                return;
            }
            let candidate = candidates.entry(key).or_default();
            if candidate.display.is_none() {
                candidate.spellings.insert(first.to_string());
            }
            candidate
                .names
                .extend(usable.iter().map(|w| normalize_name(w)).filter(|n| !n.is_empty()));
        };

        for record in records.iter() {
            match record.source {
                RecordSource::DrugLabel => add(record.drug_names()),
                RecordSource::Trial => {
                    for intervention in record.field(fields::INTERVENTIONS) {
                        add(vec![intervention.as_str()]);
                    }
                }
                RecordSource::Paper => {}
            }
        }
        candidates
    }

    fn rank_interventions(&self, records: &RecordSet) -> Vec<String> {
        let texts: Vec<String> = records.iter().map(Record::searchable_text).collect();

        let mut counted: Vec<(usize, String)> = Vec::new();
        for candidate in self.candidates(records).into_values() {
            let display = match (candidate.display, candidate.spellings.first()) {
                (Some(display), _) => display,
                (None, Some(spelling)) => spelling.clone(),
                (None, None) => continue,
            };
            let Some(pattern) = mention_pattern(&candidate.names) else {
                continue;
            };
            let count: usize = texts.iter().map(|t| pattern.find_iter(t).count()).sum();
            if count > 0 {
                counted.push((count, display));
            }
        }

        counted.sort_by(|(ca, na), (cb, nb)| cb.cmp(ca).then_with(|| na.cmp(nb)));
        counted
            .into_iter()
            .take(self.weights.top_interventions)
            .map(|(_, name)| name)
            .collect()
    }
}

/// Phase III or later, in any of the spellings registries use
fn is_late_phase(trial: &Record) -> bool {
    trial.field(fields::PHASES).iter().any(|phase| {
        let compact: String = phase
            .to_uppercase()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect();
        compact
            .split(|c: char| c == '/' || c == ',' || c == '|')
            .any(|p| matches!(p, "PHASE3" | "PHASEIII" | "PHASE4" | "PHASEIV"))
    })
}

/// Case-insensitive whole-word alternation over normalized names
fn mention_pattern(names: &BTreeSet<String>) -> Option<Regex> {
    let mut sorted: Vec<&String> = names.iter().filter(|n| !n.is_empty()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|x, y| y.len().cmp(&x.len()).then_with(|| x.cmp(y)));
    let alternatives: Vec<String> = sorted
        .iter()
        .map(|name| {
            name.split(' ')
                .map(regex_lite::escape)
                .collect::<Vec<_>>()
                .join(r"[\s\-/]+")
        })
        .collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).ok()
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{} {}", n, if n == 1 { one } else { many })
}

fn key_findings(labels: &[&Record], trials: usize, late_phase: usize, papers: usize) -> Vec<String> {
    let mut findings = Vec::new();

    if !labels.is_empty() {
        let names: BTreeSet<&str> = labels
            .iter()
            .map(|l| {
                l.first_field(fields::GENERIC_NAME)
                    .or_else(|| l.first_field(fields::BRAND_NAME))
                    .unwrap_or(l.title.as_str())
            })
            .collect();
        findings.push(format!(
            "FDA data available for: {}",
            names.into_iter().collect::<Vec<_>>().join(", ")
        ));
    }

    if late_phase > 0 {
        findings.push(format!(
            "Validated by {}",
            plural(late_phase, "Phase III trial", "Phase III trials")
        ));
    } else if trials > 0 {
        findings.push(format!("{} found, none in Phase III", plural(trials, "trial", "trials")));
    }

    if papers > 0 {
        findings.push(format!(
            "Supported by {}",
            plural(papers, "research paper", "research papers")
        ));
    }

    findings
}

fn summarize(entity: &str, confidence: f64, count: EvidenceCount) -> String {
    if confidence > 0.7 {
        format!(
            "High-confidence clinical evidence exists for '{}'. Analysis identifies {} and {}.",
            entity,
            plural(count.labels, "FDA label", "FDA labels"),
            plural(count.trials, "trial", "trials")
        )
    } else if confidence > 0.4 {
        format!(
            "Emerging evidence for '{}' across {} and {}.",
            entity,
            plural(count.papers, "paper", "papers"),
            plural(count.trials, "trial", "trials")
        )
    } else {
        format!(
            "Limited clinical evidence available for '{}'. Synthesis based on {} and {}.",
            entity,
            plural(count.papers, "paper", "papers"),
            plural(count.trials, "trial", "trials")
        )
    }
}
