//! Capability Router - turns free text into a routing decision
//!
//! Provides:
//! - Tokenization with edit-distance-bounded typo correction
//! - Stop phrase / stopword stripping of query scaffolding
//! - Entity extraction against the drug and condition vocabulary
//! - Provider prioritization by capability cues
//! - Engine selection and intent classification

use crate::lexicon::{contains_phrase, EntityKind, Lexicon, VocabEntry};
use clinsight_common::models::normalize_name;
use clinsight_common::providers::ProviderRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Query intent classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    /// Details about one drug (mechanism, dosing, side effects)
    DrugDetail,
    /// Overview of a condition and its treatments
    ConditionSummary,
    /// General evidence synthesis
    Synthesis,
}

/// Downstream engines a query is relevant to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    Synthesis,
    Graph,
    Interactions,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Synthesis => "synthesis",
            Engine::Graph => "graph",
            Engine::Interactions => "interactions",
        }
    }
}

/// Routing decision for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    /// Clinical subject of the query
    pub entity: VocabEntry,

    pub intent: QueryIntent,

    /// Providers to query, highest priority first
    pub providers: Vec<String>,

    /// True when the query explicitly narrowed the provider set
    pub restricted: bool,

    pub engines: Vec<Engine>,

    /// Every drug named in the query, in order of appearance
    pub drugs: Vec<VocabEntry>,

    /// Lower-cased query after typo correction
    pub corrected_query: String,
}

/// Outcome of routing
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Routed(RoutePlan),
    /// Nothing left to search for once scaffolding is removed
    NoEntityFound,
}

impl RouteOutcome {
    pub fn is_no_entity(&self) -> bool {
        matches!(self, RouteOutcome::NoEntityFound)
    }

    pub fn plan(self) -> Option<RoutePlan> {
        match self {
            RouteOutcome::Routed(plan) => Some(plan),
            RouteOutcome::NoEntityFound => None,
        }
    }
}

/// Vocabulary hit inside the token stream
struct VocabMatch {
    start: usize,
    len: usize,
    entry: VocabEntry,
}

pub struct CapabilityRouter {
    lexicon: Arc<Lexicon>,
}

impl CapabilityRouter {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Route a free-text query over the registered providers
    pub fn route(&self, text: &str, registry: &ProviderRegistry) -> RouteOutcome {
        let tokens = self.tokenize(text);
        if tokens.is_empty() {
            return RouteOutcome::NoEntityFound;
        }
        let corrected = tokens.join(" ");

        let matches = self.match_vocabulary(&tokens);
        let drugs = dedup_entries(
            matches
                .iter()
                .filter(|m| m.entry.kind == EntityKind::Drug)
                .map(|m| m.entry.clone()),
        );

        let entity = drugs
            .first()
            .cloned()
            .or_else(|| {
                matches
                    .iter()
                    .find(|m| m.entry.kind == EntityKind::Condition)
                    .map(|m| m.entry.clone())
            })
            .or_else(|| self.residual_term(&tokens, &matches));

        let Some(entity) = entity else {
            debug!(query = %text, "No entity found");
            return RouteOutcome::NoEntityFound;
        };

        let (providers, restricted) = self.rank_providers(&tokens, &corrected, registry);
        let engines = self.select_engines(&corrected, &drugs);
        let intent = self.detect_intent(&corrected);

        debug!(
            entity = %entity.display,
            kind = ?entity.kind,
            ?intent,
            ?providers,
            ?engines,
            "Query routed"
        );

        RouteOutcome::Routed(RoutePlan {
            entity,
            intent,
            providers,
            restricted,
            engines,
            drugs,
            corrected_query: corrected,
        })
    }

    /// Resolve a bare entity name without routing
    pub fn resolve_entity(&self, name: &str) -> Option<VocabEntry> {
        let corrected: Vec<String> = self.tokenize(name);
        if corrected.is_empty() {
            return None;
        }
        let joined = corrected.join(" ");
        Some(
            self.lexicon
                .lookup(&joined)
                .cloned()
                .unwrap_or_else(|| self.lexicon.resolve(name)),
        )
    }

    /// Normalize, split and typo-correct
    fn tokenize(&self, text: &str) -> Vec<String> {
        normalize_name(text)
            .split(' ')
            .filter(|t| !t.is_empty())
            .map(|t| self.lexicon.correct_token(t).to_string())
            .collect()
    }

    /// Greedy longest-first vocabulary scan, left to right
    fn match_vocabulary(&self, tokens: &[String]) -> Vec<VocabMatch> {
        let mut matches = Vec::new();
        let max = self.lexicon.max_phrase_tokens();
        let mut i = 0;
        'outer: while i < tokens.len() {
            for len in (1..=max.min(tokens.len() - i)).rev() {
                let phrase = tokens[i..i + len].join(" ");
                if let Some(entry) = self.lexicon.lookup(&phrase) {
                    matches.push(VocabMatch {
                        start: i,
                        len,
                        entry: entry.clone(),
                    });
                    i += len;
                    continue 'outer;
                }
            }
            i += 1;
        }
        matches
    }

    /// Tokens left after removing stop phrases, stopwords and cues
    fn residual_term(&self, tokens: &[String], matches: &[VocabMatch]) -> Option<VocabEntry> {
        let mut keep = vec![true; tokens.len()];

        let mut i = 0;
        while i < tokens.len() {
            let hit = self
                .lexicon
                .stop_phrases()
                .iter()
                .find(|phrase| tokens[i..].starts_with(phrase));
            match hit {
                Some(phrase) => {
                    keep[i..i + phrase.len()].iter_mut().for_each(|k| *k = false);
                    i += phrase.len();
                }
                None => i += 1,
            }
        }
        for m in matches {
            keep[m.start..m.start + m.len].iter_mut().for_each(|k| *k = false);
        }

        let residual: Vec<&str> = tokens
            .iter()
            .zip(&keep)
            .filter(|(token, keep)| **keep && !self.lexicon.is_stopword(token) && !self.lexicon.is_restrict_cue(token))
            .map(|(token, _)| token.as_str())
            .collect();

        if residual.is_empty() {
            return None;
        }
        Some(self.lexicon.resolve(&residual.join(" ")))
    }

    /// Providers ordered by cue match, then name; narrowed on an explicit restriction
    fn rank_providers(&self, tokens: &[String], corrected: &str, registry: &ProviderRegistry) -> (Vec<String>, bool) {
        let cued: BTreeSet<&str> = self
            .lexicon
            .capability_cues()
            .iter()
            .filter(|(_, cues)| cues.iter().any(|cue| contains_phrase(corrected, cue)))
            .map(|(capability, _)| capability.as_str())
            .collect();

        let mut ranked: Vec<(bool, String)> = registry
            .iter()
            .map(|(name, provider)| {
                let matched = provider
                    .capabilities()
                    .iter()
                    .any(|c| cued.contains(c.as_str()));
                (!matched, name.to_string())
            })
            .collect();
        ranked.sort();

        let wants_restriction = !cued.is_empty() && tokens.iter().any(|t| self.lexicon.is_restrict_cue(t));
        let matching = ranked.iter().filter(|(unmatched, _)| !unmatched).count();
        if wants_restriction && matching > 0 {
            ranked.truncate(matching);
            return (ranked.into_iter().map(|(_, name)| name).collect(), true);
        }

        (ranked.into_iter().map(|(_, name)| name).collect(), false)
    }

    fn select_engines(&self, corrected: &str, drugs: &[VocabEntry]) -> Vec<Engine> {
        let mut engines = vec![Engine::Synthesis];
        let cued = |engine: Engine| {
            self.lexicon
                .engine_cues(engine.as_str())
                .iter()
                .any(|cue| contains_phrase(corrected, cue))
        };

        if cued(Engine::Graph) {
            engines.push(Engine::Graph);
        }
        if drugs.len() >= 2 || (cued(Engine::Interactions) && !drugs.is_empty()) {
            engines.push(Engine::Interactions);
        }
        engines
    }

    fn detect_intent(&self, corrected: &str) -> QueryIntent {
        let cues = self.lexicon.intent_cues();
        if cues.drug_detail.iter().any(|c| contains_phrase(corrected, c)) {
            return QueryIntent::DrugDetail;
        }
        if cues.condition_summary.iter().any(|c| contains_phrase(corrected, c)) {
            return QueryIntent::ConditionSummary;
        }
        QueryIntent::Synthesis
    }
}

fn dedup_entries(entries: impl Iterator<Item = VocabEntry>) -> Vec<VocabEntry> {
    let mut seen = BTreeSet::new();
    entries.filter(|e| seen.insert(e.canonical.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinsight_common::models::RecordSource;
    use clinsight_common::providers::StaticProvider;

    fn router() -> CapabilityRouter {
        CapabilityRouter::new(Arc::new(Lexicon::bundled().unwrap()))
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for (name, kind) in [
            ("openfda", RecordSource::DrugLabel),
            ("pubmed", RecordSource::Paper),
            ("clinicaltrials", RecordSource::Trial),
        ] {
            registry.register(Arc::new(StaticProvider::new(name, kind))).unwrap();
        }
        registry
    }

    fn plan(query: &str) -> RoutePlan {
        router()
            .route(query, &registry())
            .plan()
            .unwrap_or_else(|| panic!("no entity for {query:?}"))
    }

    #[test]
    fn test_misspelled_status_query() {
        let outcome = router().route("what is the clinial status of pembrolizumab for NSCLC", &registry());
        assert!(!outcome.is_no_entity());

        let plan = outcome.plan().unwrap();
        assert_eq!(plan.entity.canonical, "pembrolizumab");
        assert_eq!(plan.entity.kind, EntityKind::Drug);
        assert_eq!(plan.providers.len(), 3);
        assert!(!plan.restricted);
        assert!(plan.corrected_query.contains("clinical"));
    }

    #[test]
    fn test_brand_alias_resolves_to_generic() {
        assert_eq!(plan("tell me about KEYTRUDA").entity.display, "Pembrolizumab");
    }

    #[test]
    fn test_trial_cue_prioritizes_without_restricting() {
        let plan = plan("recruiting trials for melanoma");
        assert_eq!(plan.entity.kind, EntityKind::Condition);
        assert_eq!(plan.providers[0], "clinicaltrials");
        assert_eq!(plan.providers.len(), 3);
    }

    #[test]
    fn test_explicit_restriction() {
        let plan = plan("only trials for melanoma");
        assert!(plan.restricted);
        assert_eq!(plan.providers, vec!["clinicaltrials".to_string()]);
    }

    #[test]
    fn test_scaffolding_only_is_no_entity() {
        let router = router();
        assert!(router.route("what is the status of", &registry()).is_no_entity());
        assert!(router.route("   ?? ", &registry()).is_no_entity());
    }

    #[test]
    fn test_unknown_term_falls_back_to_residual() {
        let plan = plan("what is the clinical status of tirzepatide");
        assert_eq!(plan.entity.kind, EntityKind::Term);
        assert_eq!(plan.entity.canonical, "tirzepatide");
    }

    #[test]
    fn test_unknown_entity_near_stopword_is_kept() {
        let outcome = router().route("what is the evidence for statins", &registry());
        assert!(!outcome.is_no_entity());

        let plan = outcome.plan().unwrap();
        assert_eq!(plan.entity.kind, EntityKind::Term);
        assert_eq!(plan.entity.canonical, "statins");
    }

    #[test]
    fn test_two_drugs_select_interactions() {
        let plan = plan("is aspirin safe together with warfarin");
        assert_eq!(plan.entity.display, "Aspirin");
        assert_eq!(plan.drugs.len(), 2);
        assert!(plan.engines.contains(&Engine::Interactions));
        assert_eq!(plan.engines[0], Engine::Synthesis);
    }

    #[test]
    fn test_intent_detection() {
        assert_eq!(plan("dosage of metformin").intent, QueryIntent::DrugDetail);
        assert_eq!(plan("overview of treatments for asthma").intent, QueryIntent::ConditionSummary);
        assert_eq!(plan("pembrolizumab nsclc").intent, QueryIntent::Synthesis);
    }

    #[test]
    fn test_resolve_entity() {
        let router = router();
        assert_eq!(router.resolve_entity("Coumadin").unwrap().canonical, "warfarin");
        assert_eq!(router.resolve_entity("Lung Cancer").unwrap().kind, EntityKind::Condition);
        assert!(router.resolve_entity("  ").is_none());
    }
}
