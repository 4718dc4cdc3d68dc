//! Curated vocabulary and cue lists
//!
//! Stop phrases, drug and condition vocabulary with aliases, routing cues and
//! the severity lexicon live in JSON (`data/lexicon.json` is bundled) so they
//! can be updated without touching matching logic.

use clinsight_common::errors::{AppError, Result};
use clinsight_common::models::normalize_name;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const BUNDLED: &str = include_str!("../data/lexicon.json");

/// What kind of clinical subject a vocabulary entry names
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Drug,
    Condition,
    /// Free term outside the vocabulary
    Term,
}

/// A resolved vocabulary entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabEntry {
    /// Normalized canonical name, the identity key
    pub canonical: String,
    /// Display casing
    pub display: String,
    pub kind: EntityKind,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntentCues {
    #[serde(default)]
    pub drug_detail: Vec<String>,
    #[serde(default)]
    pub condition_summary: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeverityCues {
    #[serde(default)]
    pub high: Vec<String>,
    #[serde(default)]
    pub moderate: Vec<String>,
    #[serde(default)]
    pub low: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LexiconData {
    #[serde(default)]
    stop_phrases: Vec<String>,
    #[serde(default)]
    stopwords: Vec<String>,
    #[serde(default)]
    drugs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    conditions: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    capability_cues: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    engine_cues: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    restrict_cues: Vec<String>,
    #[serde(default)]
    intent_cues: IntentCues,
    #[serde(default)]
    severity: SeverityCues,
}

/// Indexed lexicon
#[derive(Debug, Clone)]
pub struct Lexicon {
    /// Tokenized stop phrases, longest first
    stop_phrases: Vec<Vec<String>>,
    stopwords: BTreeSet<String>,
    /// Normalized name or alias -> entry
    entries: BTreeMap<String, VocabEntry>,
    max_phrase_tokens: usize,
    /// Known single tokens, sorted, used for typo correction
    correction_words: Vec<String>,
    /// Tokens of drug and condition names
    vocab_words: BTreeSet<String>,
    capability_cues: BTreeMap<String, Vec<String>>,
    engine_cues: BTreeMap<String, Vec<String>>,
    restrict_cues: BTreeSet<String>,
    intent_cues: IntentCues,
    severity: SeverityCues,
}

fn normalize_all(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| normalize_name(s))
        .filter(|s| !s.is_empty())
        .collect()
}

fn normalize_groups(groups: &BTreeMap<String, Vec<String>>) -> BTreeMap<String, Vec<String>> {
    groups
        .iter()
        .map(|(key, cues)| (key.clone(), normalize_all(cues)))
        .collect()
}

impl Lexicon {
    /// The lexicon compiled into the crate
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED)
    }

    /// Load from `path`, or the bundled lexicon when no path is configured
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| AppError::Configuration {
                    message: format!("Cannot read lexicon {}: {}", path.display(), e),
                })?;
                tracing::info!(path = %path.display(), "Loaded external lexicon");
                Self::from_json(&raw)
            }
            None => Self::bundled(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let data: LexiconData = serde_json::from_str(raw).map_err(|e| AppError::Configuration {
            message: format!("Invalid lexicon: {}", e),
        })?;
        Ok(Self::index(data))
    }

    fn index(data: LexiconData) -> Self {
        let mut entries = BTreeMap::new();
        // Conditions first so a drug sharing a name wins
        for (kind, group) in [
            (EntityKind::Condition, &data.conditions),
            (EntityKind::Drug, &data.drugs),
        ] {
            for (display, aliases) in group {
                let canonical = normalize_name(display);
                if canonical.is_empty() {
                    continue;
                }
                let entry = VocabEntry {
                    canonical: canonical.clone(),
                    display: display.trim().to_string(),
                    kind,
                };
                for name in std::iter::once(canonical.clone()).chain(normalize_all(aliases)) {
                    entries.insert(name, entry.clone());
                }
            }
        }

        let mut stop_phrases: Vec<Vec<String>> = normalize_all(&data.stop_phrases)
            .into_iter()
            .map(|p| p.split(' ').map(str::to_string).collect())
            .collect();
        stop_phrases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        stop_phrases.dedup();

        let stopwords: BTreeSet<String> = normalize_all(&data.stopwords).into_iter().collect();
        let capability_cues = normalize_groups(&data.capability_cues);
        let engine_cues = normalize_groups(&data.engine_cues);

        let vocab_words: BTreeSet<String> = entries
            .keys()
            .flat_map(|name| name.split(' ').map(str::to_string))
            .collect();

        let mut words = vocab_words.clone();
        let phrase_sources = stopwords
            .iter()
            .chain(capability_cues.values().flatten())
            .chain(engine_cues.values().flatten());
        for phrase in phrase_sources {
            words.extend(phrase.split(' ').map(str::to_string));
        }
        for phrase in &stop_phrases {
            words.extend(phrase.iter().cloned());
        }

        let max_phrase_tokens = entries
            .keys()
            .map(|k| k.split(' ').count())
            .max()
            .unwrap_or(1);

        Self {
            stop_phrases,
            stopwords,
            entries,
            max_phrase_tokens,
            correction_words: words.into_iter().collect(),
            vocab_words,
            capability_cues,
            engine_cues,
            restrict_cues: normalize_all(&data.restrict_cues).into_iter().collect(),
            intent_cues: IntentCues {
                drug_detail: normalize_all(&data.intent_cues.drug_detail),
                condition_summary: normalize_all(&data.intent_cues.condition_summary),
            },
            severity: SeverityCues {
                high: normalize_all(&data.severity.high),
                moderate: normalize_all(&data.severity.moderate),
                low: normalize_all(&data.severity.low),
            },
        }
    }

    /// Exact lookup of a name or alias
    pub fn lookup(&self, name: &str) -> Option<&VocabEntry> {
        self.entries.get(&normalize_name(name))
    }

    /// Vocabulary entry for a name, or a free-term entry
    pub fn resolve(&self, name: &str) -> VocabEntry {
        self.lookup(name).cloned().unwrap_or_else(|| VocabEntry {
            canonical: normalize_name(name),
            display: name.trim().to_string(),
            kind: EntityKind::Term,
        })
    }

    /// Every normalized name mapping to a canonical entry, itself included
    pub fn aliases_of(&self, canonical: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.canonical == canonical)
            .map(|(name, _)| name.clone())
            .collect();
        if names.is_empty() && !canonical.is_empty() {
            names.push(canonical.to_string());
        }
        names
    }

    /// Drug vocabulary as (display, normalized names)
    pub fn drugs(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, entry) in &self.entries {
            if entry.kind == EntityKind::Drug {
                out.entry(entry.display.clone()).or_default().push(name.clone());
            }
        }
        out
    }

    /// Normalized alias -> entry for one kind
    pub fn entries_of(&self, kind: EntityKind) -> impl Iterator<Item = (&str, &VocabEntry)> {
        self.entries
            .iter()
            .filter(move |(_, e)| e.kind == kind)
            .map(|(name, e)| (name.as_str(), e))
    }

    pub fn max_phrase_tokens(&self) -> usize {
        self.max_phrase_tokens
    }

    pub fn stop_phrases(&self) -> &[Vec<String>] {
        &self.stop_phrases
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    pub fn capability_cues(&self) -> &BTreeMap<String, Vec<String>> {
        &self.capability_cues
    }

    pub fn engine_cues(&self, engine: &str) -> &[String] {
        self.engine_cues.get(engine).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_restrict_cue(&self, token: &str) -> bool {
        self.restrict_cues.contains(token)
    }

    pub fn intent_cues(&self) -> &IntentCues {
        &self.intent_cues
    }

    pub fn severity(&self) -> &SeverityCues {
        &self.severity
    }

    /// Correct a token to the closest known word within an edit-distance bound.
    ///
    /// Tokens of three characters or fewer are never corrected, tokens up to
    /// six characters tolerate one edit and longer ones two. The two-edit
    /// bound only reaches drug and condition words; scaffolding and cue words
    /// stay at one edit. Ties go to the lexicographically smallest word.
    pub fn correct_token<'a>(&'a self, token: &'a str) -> &'a str {
        let len = token.chars().count();
        let bound = match len {
            0..=3 => return token,
            4..=6 => 1,
            _ => 2,
        };
        if self.correction_words.binary_search_by(|w| w.as_str().cmp(token)).is_ok() {
            return token;
        }

        let mut best: Option<(usize, &str)> = None;
        for word in &self.correction_words {
            let word_bound = if self.vocab_words.contains(word) {
                bound
            } else {
                bound.min(1)
            };
            let word_len = word.chars().count();
            if word_len.abs_diff(len) > word_bound || word_len <= 3 {
                continue;
            }
            let distance = strsim::levenshtein(token, word);
            if distance <= word_bound && best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, word));
            }
        }
        best.map(|(_, word)| word).unwrap_or(token)
    }
}

/// Whole-word containment of a normalized phrase in normalized text
pub fn contains_phrase(normalized_text: &str, normalized_phrase: &str) -> bool {
    if normalized_phrase.is_empty() {
        return false;
    }
    format!(" {} ", normalized_text).contains(&format!(" {} ", normalized_phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_lexicon_loads() {
        let lexicon = Lexicon::bundled().unwrap();
        let keytruda = lexicon.lookup("KEYTRUDA").unwrap();
        assert_eq!(keytruda.canonical, "pembrolizumab");
        assert_eq!(keytruda.display, "Pembrolizumab");
        assert_eq!(keytruda.kind, EntityKind::Drug);

        assert_eq!(lexicon.lookup("non-small cell lung cancer").unwrap().display, "NSCLC");
        assert!(lexicon.max_phrase_tokens() >= 5);
        assert!(lexicon.is_stopword("the"));
    }

    #[test]
    fn test_resolve_unknown_term() {
        let lexicon = Lexicon::bundled().unwrap();
        let entry = lexicon.resolve(" Tirzepatide ");
        assert_eq!(entry.kind, EntityKind::Term);
        assert_eq!(entry.canonical, "tirzepatide");
        assert_eq!(entry.display, "Tirzepatide");
    }

    #[test]
    fn test_aliases_of() {
        let lexicon = Lexicon::bundled().unwrap();
        let aliases = lexicon.aliases_of("warfarin");
        assert!(aliases.contains(&"coumadin".to_string()));
        assert!(aliases.contains(&"warfarin".to_string()));
        assert_eq!(lexicon.aliases_of("unknowndrug"), vec!["unknowndrug".to_string()]);
    }

    #[test]
    fn test_correct_token() {
        let lexicon = Lexicon::bundled().unwrap();
        assert_eq!(lexicon.correct_token("clinial"), "clinical");
        assert_eq!(lexicon.correct_token("pembrolizumb"), "pembrolizumab");
        assert_eq!(lexicon.correct_token("nsclc"), "nsclc");
        assert_eq!(lexicon.correct_token("asa"), "asa");
        assert_eq!(lexicon.correct_token("tirzepatide"), "tirzepatide");
    }

    #[test]
    fn test_two_edits_only_reach_vocabulary() {
        let lexicon = Lexicon::bundled().unwrap();
        // Two edits from "status", which is scaffolding
        assert_eq!(lexicon.correct_token("statins"), "statins");
        // One edit still corrects scaffolding
        assert_eq!(lexicon.correct_token("studys"), "study");
        // Two edits still reach a drug name
        assert_eq!(lexicon.correct_token("warfarn"), "warfarin");
        assert_eq!(lexicon.correct_token("metfromin"), "metformin");
    }

    #[test]
    fn test_contains_phrase() {
        assert!(contains_phrase("increased bleeding risk with aspirin", "aspirin"));
        assert!(contains_phrase("non small cell lung cancer", "lung cancer"));
        assert!(!contains_phrase("aspirinate", "aspirin"));
        assert!(!contains_phrase("anything", ""));
    }

    #[test]
    fn test_invalid_lexicon_is_configuration_error() {
        assert!(matches!(
            Lexicon::from_json("{not json"),
            Err(AppError::Configuration { .. })
        ));
    }
}
