//! Drug-drug interaction detection over label text
//!
//! This is a recall-oriented textual heuristic, not a pharmacological model.
//! A finding means one drug's label names the other drug (or a known alias)
//! in its interaction, contraindication or warning sections. Interactions
//! that no label spells out are not found.

use crate::lexicon::{contains_phrase, Lexicon, SeverityCues, VocabEntry};
use clinsight_common::models::{fields, normalize_name, Record, RecordSet, RecordSource};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Sentences longer than this are cut to a window around the match
const MAX_PASSAGE_CHARS: usize = 400;
/// Half-width of the fallback window, in bytes
const WINDOW_BYTES: usize = 160;
/// Longest risk phrase returned
const MAX_RISK_CHARS: usize = 280;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Unknown,
    Low,
    Moderate,
    High,
}

impl Severity {
    /// Strongest cue found in a passage; high beats moderate beats low
    pub fn classify(passage: &str, cues: &SeverityCues) -> Self {
        let normalized = normalize_name(passage);
        let hit = |list: &[String]| list.iter().any(|cue| contains_phrase(&normalized, cue));
        if hit(cues.high.as_slice()) {
            Severity::High
        } else if hit(cues.moderate.as_slice()) {
            Severity::Moderate
        } else if hit(cues.low.as_slice()) {
            Severity::Low
        } else {
            Severity::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionFinding {
    pub drug_a: String,
    pub drug_b: String,
    /// Passage naming the other drug
    pub risk: String,
    pub severity: Severity,
    pub evidence_record_id: String,
}

/// One drug and every name its label may be cited by
struct DrugNames {
    entry: VocabEntry,
    names: BTreeSet<String>,
    pattern: Option<Regex>,
}

pub struct InteractionDetector {
    lexicon: Arc<Lexicon>,
}

impl InteractionDetector {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    /// Scan every unordered pair of `drugs` against the label records.
    ///
    /// Findings are ordered by drug pair, then evidence record id. At most
    /// one finding is reported per pair and label, the most severe one.
    pub fn detect(&self, drugs: &[VocabEntry], labels: &RecordSet) -> Vec<InteractionFinding> {
        let mut unique: BTreeMap<String, VocabEntry> = BTreeMap::new();
        for drug in drugs {
            if !drug.canonical.is_empty() {
                unique.entry(drug.canonical.clone()).or_insert_with(|| drug.clone());
            }
        }
        if unique.len() < 2 {
            return Vec::new();
        }

        let labels: Vec<&Record> = labels.of_source(RecordSource::DrugLabel).collect();
        let drugs: Vec<DrugNames> = unique
            .into_values()
            .map(|entry| self.names_for(entry, &labels))
            .collect();

        let mut findings: BTreeMap<(usize, usize, String), InteractionFinding> = BTreeMap::new();
        for i in 0..drugs.len() {
            for j in (i + 1)..drugs.len() {
                let (a, b) = (&drugs[i], &drugs[j]);
                for (owner, other) in [(a, b), (b, a)] {
                    let Some(pattern) = &other.pattern else { continue };
                    // A label listing both drugs is a combination product, not an interaction
                    let owned = labels
                        .iter()
                        .filter(|l| owns(&owner.names, l) && !owns(&other.names, l));
                    for label in owned {
                        let record_id = label.record_id();
                        if let Some((severity, risk)) = self.scan_label(label, pattern) {
                            let key = (i, j, record_id.clone());
                            let stronger = findings.get(&key).map_or(true, |f| severity > f.severity);
                            if stronger {
                                findings.insert(
                                    key,
                                    InteractionFinding {
                                        drug_a: a.entry.display.clone(),
                                        drug_b: b.entry.display.clone(),
                                        risk,
                                        severity,
                                        evidence_record_id: record_id,
                                    },
                                );
                            }
                        }
                    }
                }
            }
        }

        let findings: Vec<InteractionFinding> = findings.into_values().collect();
        tracing::debug!(
            drugs = drugs.len(),
            labels = labels.len(),
            findings = findings.len(),
            "Interaction scan complete"
        );
        findings
    }

    fn names_for(&self, entry: VocabEntry, labels: &[&Record]) -> DrugNames {
        let mut names: BTreeSet<String> = self.lexicon.aliases_of(&entry.canonical).into_iter().collect();
        names.insert(entry.canonical.clone());

        // Brand and generic names of single-drug labels naming this drug exactly
        let mut extra = BTreeSet::new();
        for label in labels.iter().filter(|l| names_exactly(&names, l)) {
            extra.extend(label.drug_names().into_iter().map(normalize_name));
        }
        names.extend(extra);
        names.remove("");

        let pattern = name_pattern(&names);
        DrugNames {
            entry,
            names,
            pattern,
        }
    }

    /// Most severe passage in a label mentioning the pattern
    fn scan_label(&self, label: &Record, pattern: &Regex) -> Option<(Severity, String)> {
        let sections: Vec<&String> = fields::SAFETY_SECTIONS
            .iter()
            .flat_map(|key| label.field(key))
            .collect();
        let texts: Vec<&str> = if sections.is_empty() {
            vec![label.body_text.as_str()]
        } else {
            sections.into_iter().map(String::as_str).collect()
        };

        let cues = self.lexicon.severity();
        let mut best: Option<(Severity, String)> = None;
        for text in texts {
            for m in pattern.find_iter(text) {
                let passage = passage_around(text, m.start(), m.end());
                let severity = Severity::classify(passage, cues);
                if best.as_ref().map_or(true, |(s, _)| severity > *s) {
                    best = Some((severity, clip(passage)));
                }
            }
        }
        best
    }
}

/// A label belongs to a drug when one of its listed names is, or contains, a drug name
fn owns(names: &BTreeSet<String>, label: &Record) -> bool {
    label.drug_names().into_iter().any(|listed| {
        let listed = normalize_name(listed);
        names.contains(&listed) || names.iter().any(|n| contains_phrase(&listed, n))
    })
}

fn names_exactly(names: &BTreeSet<String>, label: &Record) -> bool {
    label
        .drug_names()
        .into_iter()
        .any(|listed| names.contains(&normalize_name(listed)))
}

/// Case-insensitive whole-word alternation of names, longest first
fn name_pattern(names: &BTreeSet<String>) -> Option<Regex> {
    let mut sorted: Vec<&String> = names.iter().collect();
    sorted.sort_by(|x, y| y.len().cmp(&x.len()).then_with(|| x.cmp(y)));
    let alternatives: Vec<String> = sorted
        .iter()
        .map(|name| {
            name.split(' ')
                .map(regex_lite::escape)
                .collect::<Vec<_>>()
                .join(r"[\s\-]+")
        })
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    let source = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
    match Regex::new(&source) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build drug name pattern");
            None
        }
    }
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | ';' | '!' | '?' | '\n')
}

/// The sentence holding a match, or a bounded window for run-on text
fn passage_around(text: &str, start: usize, end: usize) -> &str {
    let from = text[..start].rfind(is_sentence_end).map_or(0, |i| i + 1);
    let to = text[end..].find(is_sentence_end).map_or(text.len(), |i| end + i + 1);
    let sentence = &text[from..to];
    if sentence.chars().count() <= MAX_PASSAGE_CHARS {
        return sentence.trim();
    }
    let from = floor_boundary(text, start.saturating_sub(WINDOW_BYTES).max(from));
    let to = floor_boundary(text, (end + WINDOW_BYTES).min(to));
    text[from..to].trim()
}

fn floor_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn clip(passage: &str) -> String {
    let collapsed = passage.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_RISK_CHARS {
        return collapsed;
    }
    let mut clipped: String = collapsed.chars().take(MAX_RISK_CHARS).collect();
    clipped.push_str("...");
    clipped
}
