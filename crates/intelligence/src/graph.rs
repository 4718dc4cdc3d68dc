//! Relationship graph over a record set
//!
//! Nodes and edges live in maps keyed by normalized ids, so rebuilding from
//! the same records in any order yields the same graph. Edge weight is the
//! number of distinct records corroborating the edge.
//!
//! Identity merging happens only through explicit alias links: names listed
//! together on one drug label, or curated vocabulary aliases. Names that
//! merely look alike are never merged.

use crate::lexicon::{contains_phrase, EntityKind, Lexicon, VocabEntry};
use clinsight_common::models::{fields, normalize_name, Record, RecordSet, RecordSource};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Drug,
    Trial,
    Paper,
    Condition,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Drug => "drug",
            NodeKind::Trial => "trial",
            NodeKind::Paper => "paper",
            NodeKind::Condition => "condition",
        }
    }

    /// Node id for a normalized key, namespaced by kind
    pub fn node_id(&self, key: &str) -> String {
        format!("{}:{}", self.as_str(), key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// drug -> condition
    Treats,
    /// drug -> trial
    IntervenesIn,
    /// paper -> drug
    Mentions,
    /// paper or trial -> condition
    Researches,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    pub source_record_ids: BTreeSet<String>,
    /// Alias names folded into this node
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub aliases: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub relation: Relation,
    /// Count of corroborating records
    pub weight: usize,
    pub evidence_record_ids: BTreeSet<String>,
}

type EdgeKey = (String, String, Relation);

/// Typed node/edge graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "GraphDocument", from = "GraphDocument")]
pub struct Graph {
    nodes: BTreeMap<String, GraphNode>,
    edges: BTreeMap<EdgeKey, GraphEdge>,
    /// Folded alias id -> canonical id
    aliases: BTreeMap<String, String>,
    /// Node id -> record id its label was taken from
    label_sources: BTreeMap<String, String>,
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.edges == other.edges && self.aliases == other.aliases
    }
}

/// Serialized form of [`Graph`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphDocument {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    aliases: BTreeMap<String, String>,
}

impl From<Graph> for GraphDocument {
    fn from(graph: Graph) -> Self {
        Self {
            nodes: graph.nodes.into_values().collect(),
            edges: graph.edges.into_values().collect(),
            aliases: graph.aliases,
        }
    }
}

impl From<GraphDocument> for Graph {
    fn from(doc: GraphDocument) -> Self {
        // Best effort: a labelled node is taken to carry its smallest record's label
        let label_sources = doc
            .nodes
            .iter()
            .filter(|n| !n.label.is_empty())
            .filter_map(|n| Some((n.id.clone(), n.source_record_ids.first()?.clone())))
            .collect();
        Self {
            nodes: doc.nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            edges: doc
                .edges
                .into_iter()
                .map(|e| ((e.from.clone(), e.to.clone(), e.relation), e))
                .collect(),
            aliases: doc.aliases,
            label_sources,
        }
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or strengthen a node.
    ///
    /// The label comes from the smallest record id offering a non-empty one,
    /// whatever the insertion order.
    pub fn add_node(&mut self, id: &str, kind: NodeKind, label: &str, record_id: &str) {
        let node = self.nodes.entry(id.to_string()).or_insert_with(|| GraphNode {
            id: id.to_string(),
            kind,
            label: String::new(),
            source_record_ids: BTreeSet::new(),
            aliases: BTreeSet::new(),
        });
        node.source_record_ids.insert(record_id.to_string());

        let label = label.trim();
        if label.is_empty() {
            return;
        }
        let leads = self
            .label_sources
            .get(id)
            .map_or(true, |source| record_id < source.as_str());
        if leads {
            node.label = label.to_string();
            self.label_sources.insert(id.to_string(), record_id.to_string());
        }
    }

    /// Insert or strengthen an edge; both endpoints must already exist
    pub fn add_edge(&mut self, from: &str, to: &str, relation: Relation, record_id: &str) {
        if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            return;
        }
        let edge = self
            .edges
            .entry((from.to_string(), to.to_string(), relation))
            .or_insert_with(|| GraphEdge {
                from: from.to_string(),
                to: to.to_string(),
                relation,
                weight: 0,
                evidence_record_ids: BTreeSet::new(),
            });
        edge.evidence_record_ids.insert(record_id.to_string());
        edge.weight = edge.evidence_record_ids.len();
    }

    /// Canonical id for a node id or a folded alias id
    pub fn resolve<'a>(&'a self, id: &'a str) -> Option<&'a str> {
        if self.nodes.contains_key(id) {
            return Some(id);
        }
        self.aliases
            .get(id)
            .map(String::as_str)
            .filter(|canonical| self.nodes.contains_key(*canonical))
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.resolve(id).and_then(|id| self.nodes.get(id))
    }

    pub fn edge(&self, from: &str, to: &str, relation: Relation) -> Option<&GraphEdge> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        self.edges.get(&(from.to_string(), to.to_string(), relation))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.values()
    }

    /// Edges touching a node, in key order
    pub fn neighbors<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        let id = self.resolve(id).unwrap_or(id);
        self.edges.values().filter(move |e| e.from == id || e.to == id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Drug name -> canonical name, built from explicit alias links only
#[derive(Debug, Default)]
struct DrugIndex {
    canonical_of: BTreeMap<String, String>,
    display: BTreeMap<String, String>,
}

impl DrugIndex {
    fn build(builder: &GraphBuilder, records: &RecordSet) -> Self {
        let mut parent: BTreeMap<String, String> = BTreeMap::new();
        let mut preferred: BTreeSet<String> = BTreeSet::new();
        let mut generics: BTreeSet<String> = BTreeSet::new();
        let mut display: BTreeMap<String, String> = BTreeMap::new();

        for (alias, (canonical, label)) in &builder.known_drugs {
            union(&mut parent, alias, canonical);
            preferred.insert(canonical.clone());
            display.insert(canonical.clone(), label.clone());
        }

        if let Some(anchor) = builder.anchor.as_ref().filter(|a| a.kind == EntityKind::Drug) {
            for alias in &builder.anchor_aliases {
                union(&mut parent, alias, &anchor.canonical);
            }
            preferred.insert(anchor.canonical.clone());
            display.insert(anchor.canonical.clone(), anchor.display.clone());
        }

        for record in records.of_source(RecordSource::DrugLabel) {
            let names: Vec<String> = label_names(record);
            generics.extend(record.field(fields::GENERIC_NAME).iter().map(|n| normalize_name(n)));
            if let Some((first, rest)) = names.split_first() {
                find(&mut parent, first);
                for name in rest {
                    union(&mut parent, first, name);
                }
            }
        }

        let names: Vec<String> = parent.keys().cloned().collect();
        let mut components: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in names {
            let root = find(&mut parent, &name);
            components.entry(root).or_default().push(name);
        }

        let mut canonical_of = BTreeMap::new();
        for members in components.values() {
            // Members are sorted; pick the first preferred, then generic, then any name
            let canonical = members
                .iter()
                .find(|m| preferred.contains(*m))
                .or_else(|| members.iter().find(|m| generics.contains(*m)))
                .or_else(|| members.first())
                .cloned()
                .unwrap_or_default();
            for member in members {
                canonical_of.insert(member.clone(), canonical.clone());
            }
        }
        display.retain(|canonical, _| canonical_of.values().any(|c| c == canonical));

        Self { canonical_of, display }
    }

    fn resolve(&self, name: &str) -> Option<&str> {
        self.canonical_of.get(name).map(String::as_str)
    }

    /// Every known name with its canonical, for text scanning
    fn names(&self) -> impl Iterator<Item = (&str, &str)> {
        self.canonical_of.iter().map(|(n, c)| (n.as_str(), c.as_str()))
    }

    /// Canonical drugs mentioned in normalized text
    fn mentioned_in(&self, normalized_text: &str) -> BTreeSet<&str> {
        self.names()
            .filter(|(name, _)| contains_phrase(normalized_text, name))
            .map(|(_, canonical)| canonical)
            .collect()
    }

    fn aliases_of(&self, canonical: &str) -> BTreeSet<String> {
        self.canonical_of
            .iter()
            .filter(|(name, c)| c.as_str() == canonical && name.as_str() != canonical)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

fn find(parent: &mut BTreeMap<String, String>, name: &str) -> String {
    let mut root = name.to_string();
    loop {
        match parent.get(&root) {
            Some(p) if *p != root => root = p.clone(),
            Some(_) => break,
            None => {
                parent.insert(root.clone(), root.clone());
                break;
            }
        }
    }
    let mut current = name.to_string();
    while current != root {
        let next = parent.insert(current.clone(), root.clone()).unwrap_or_else(|| root.clone());
        current = next;
    }
    root
}

fn union(parent: &mut BTreeMap<String, String>, a: &str, b: &str) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent.insert(high, low);
    }
}

fn label_names(record: &Record) -> Vec<String> {
    let mut names: Vec<String> = record
        .drug_names()
        .into_iter()
        .map(normalize_name)
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        let title = normalize_name(&record.title);
        if !title.is_empty() {
            names.push(title);
        }
    }
    names
}

/// Builds a [`Graph`] from a record set
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    anchor: Option<VocabEntry>,
    /// Normalized names of the anchor, canonical included
    anchor_aliases: Vec<String>,
    /// Normalized alias -> (canonical, display)
    known_drugs: BTreeMap<String, (String, String)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor the graph on the query entity
    pub fn with_anchor(mut self, entity: VocabEntry, aliases: impl IntoIterator<Item = String>) -> Self {
        let mut names: BTreeSet<String> = aliases.into_iter().map(|a| normalize_name(&a)).collect();
        names.insert(entity.canonical.clone());
        names.remove("");
        self.anchor_aliases = names.into_iter().collect();
        self.anchor = Some(entity);
        self
    }

    /// Recognize vocabulary drugs in trial and paper text
    pub fn with_vocabulary(mut self, lexicon: &Lexicon) -> Self {
        for (alias, entry) in lexicon.entries_of(EntityKind::Drug) {
            self.known_drugs
                .insert(alias.to_string(), (entry.canonical.clone(), entry.display.clone()));
        }
        self
    }

    fn condition_anchor(&self) -> Option<&VocabEntry> {
        self.anchor.as_ref().filter(|a| a.kind != EntityKind::Drug)
    }

    fn names_condition(&self, normalized_text: &str) -> bool {
        self.anchor_aliases
            .iter()
            .any(|alias| contains_phrase(normalized_text, alias))
    }

    pub fn build(&self, records: &RecordSet) -> Graph {
        let index = DrugIndex::build(self, records);
        let mut graph = Graph::new();
        let condition = self
            .condition_anchor()
            .map(|anchor| (NodeKind::Condition.node_id(&anchor.canonical), anchor.display.clone()));

        for record in records.iter() {
            let record_id = record.record_id();
            match record.source {
                RecordSource::DrugLabel => {
                    let Some(canonical) = label_names(record).first().and_then(|n| index.resolve(n)) else {
                        continue;
                    };
                    let drug_id = NodeKind::Drug.node_id(canonical);
                    let label = record
                        .first_field(fields::GENERIC_NAME)
                        .unwrap_or(record.title.as_str());
                    graph.add_node(&drug_id, NodeKind::Drug, label, &record_id);

                    if let Some((condition_id, condition_label)) = &condition {
                        let indications = normalize_name(&format!(
                            "{}\n{}",
                            record.field(fields::INDICATIONS).join("\n"),
                            record.body_text
                        ));
                        if self.names_condition(&indications) {
                            graph.add_node(condition_id, NodeKind::Condition, condition_label, &record_id);
                            graph.add_edge(&drug_id, condition_id, Relation::Treats, &record_id);
                        }
                    }
                }
                RecordSource::Trial => {
                    let trial_id = NodeKind::Trial.node_id(&normalize_name(&record.external_id));
                    graph.add_node(&trial_id, NodeKind::Trial, &record.title, &record_id);

                    let mut drugs: BTreeMap<&str, &str> = BTreeMap::new();
                    for intervention in record.field(fields::INTERVENTIONS) {
                        let normalized = normalize_name(intervention);
                        match index.resolve(&normalized) {
                            Some(canonical) => {
                                drugs.insert(canonical, intervention.as_str());
                            }
                            None => {
                                for canonical in index.mentioned_in(&normalized) {
                                    drugs.entry(canonical).or_insert(intervention.as_str());
                                }
                            }
                        }
                    }
                    for (canonical, written) in &drugs {
                        let drug_id = NodeKind::Drug.node_id(canonical);
                        graph.add_node(&drug_id, NodeKind::Drug, written, &record_id);
                        graph.add_edge(&drug_id, &trial_id, Relation::IntervenesIn, &record_id);
                    }

                    if let Some((condition_id, condition_label)) = &condition {
                        let studied = normalize_name(&format!(
                            "{}\n{}",
                            record.field(fields::CONDITIONS).join("\n"),
                            record.title
                        ));
                        if self.names_condition(&studied) {
                            graph.add_node(condition_id, NodeKind::Condition, condition_label, &record_id);
                            graph.add_edge(&trial_id, condition_id, Relation::Researches, &record_id);
                            for canonical in drugs.keys() {
                                graph.add_edge(
                                    &NodeKind::Drug.node_id(canonical),
                                    condition_id,
                                    Relation::Treats,
                                    &record_id,
                                );
                            }
                        }
                    }
                }
                RecordSource::Paper => {
                    let paper_id = NodeKind::Paper.node_id(&normalize_name(&record.external_id));
                    graph.add_node(&paper_id, NodeKind::Paper, &record.title, &record_id);

                    let text = normalize_name(&format!("{}\n{}", record.title, record.body_text));
                    for canonical in index.mentioned_in(&text) {
                        let drug_id = NodeKind::Drug.node_id(canonical);
                        let label = index.display.get(canonical).map(String::as_str).unwrap_or(canonical);
                        graph.add_node(&drug_id, NodeKind::Drug, label, &record_id);
                        graph.add_edge(&paper_id, &drug_id, Relation::Mentions, &record_id);
                    }

                    if let Some((condition_id, condition_label)) = &condition {
                        if self.names_condition(&text) {
                            graph.add_node(condition_id, NodeKind::Condition, condition_label, &record_id);
                            graph.add_edge(&paper_id, condition_id, Relation::Researches, &record_id);
                        }
                    }
                }
            }
        }

        // Curated display names win over record spellings; record alias folds
        for node in graph.nodes.values_mut().filter(|n| n.kind == NodeKind::Drug) {
            let canonical = node.id.trim_start_matches("drug:").to_string();
            if let Some(display) = index.display.get(&canonical) {
                node.label = display.clone();
            }
            node.aliases = index.aliases_of(&canonical);
            for alias in &node.aliases {
                graph
                    .aliases
                    .insert(NodeKind::Drug.node_id(alias), node.id.clone());
            }
        }

        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Graph built"
        );
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    fn label(id: &str, generic: &str, brand: &str, indications: &str) -> Record {
        Record::new(RecordSource::DrugLabel, "openfda", id, brand, indications)
            .with_field(fields::GENERIC_NAME, [generic])
            .with_field(fields::BRAND_NAME, [brand])
            .with_field(fields::INDICATIONS, [indications])
    }

    fn trial(nct: &str, intervention: &str, condition: &str) -> Record {
        Record::new(RecordSource::Trial, "clinicaltrials", nct, format!("{} in {}", intervention, condition), "")
            .with_field(fields::INTERVENTIONS, [intervention])
            .with_field(fields::CONDITIONS, [condition])
            .with_field(fields::PHASES, ["PHASE3"])
    }

    fn paper(pmid: &str, title: &str) -> Record {
        Record::new(RecordSource::Paper, "pubmed", pmid, title, title)
    }

    fn corpus() -> Vec<Record> {
        vec![
            label("set-1", "pembrolizumab", "KEYTRUDA", "treatment of NSCLC and melanoma"),
            trial("NCT001", "Pembrolizumab", "Non-Small Cell Lung Cancer"),
            trial("NCT002", "KEYTRUDA 200 mg", "NSCLC"),
            trial("NCT003", "Placebo", "NSCLC"),
            paper("111", "Pembrolizumab versus chemotherapy in NSCLC"),
            paper("222", "Keytruda long-term outcomes"),
            paper("333", "Unrelated cardiology note"),
        ]
    }

    fn nsclc_builder() -> GraphBuilder {
        let anchor = VocabEntry {
            canonical: "nsclc".to_string(),
            display: "NSCLC".to_string(),
            kind: EntityKind::Condition,
        };
        GraphBuilder::new().with_anchor(anchor, vec!["non small cell lung cancer".to_string()])
    }

    #[test]
    fn test_build_links_drug_trials_papers() {
        let graph = nsclc_builder().build(&RecordSet::from_records(corpus()));

        let drug = graph.node("drug:pembrolizumab").unwrap();
        assert_eq!(drug.kind, NodeKind::Drug);
        assert!(drug.aliases.contains("keytruda"));
        assert_eq!(graph.resolve("drug:keytruda"), Some("drug:pembrolizumab"));

        assert!(graph.edge("drug:pembrolizumab", "trial:nct001", Relation::IntervenesIn).is_some());
        assert!(graph.edge("drug:keytruda", "trial:nct002", Relation::IntervenesIn).is_some());
        assert!(graph.node("drug:placebo").is_none());

        let mentions: Vec<_> = graph.edges().filter(|e| e.relation == Relation::Mentions).collect();
        assert_eq!(mentions.len(), 2);

        // Label indication + two trials naming the drug and the condition
        let treats = graph.edge("drug:pembrolizumab", "condition:nsclc", Relation::Treats).unwrap();
        assert_eq!(treats.weight, 3);

        assert!(graph.edge("trial:nct003", "condition:nsclc", Relation::Researches).is_some());
        assert!(graph.node("paper:333").is_some());
    }

    #[test]
    fn test_no_merge_on_similarity_alone() {
        let records = RecordSet::from_records(vec![
            paper("1", "pembrolizumab-like compound"),
            trial("NCT9", "Pembrolizumab biosimilar XYZ", "Melanoma"),
        ]);
        let anchor = VocabEntry {
            canonical: "pembrolizumab".to_string(),
            display: "Pembrolizumab".to_string(),
            kind: EntityKind::Drug,
        };
        let graph = GraphBuilder::new().with_anchor(anchor, Vec::new()).build(&records);

        assert!(graph.node("drug:pembrolizumab biosimilar xyz").is_none());
        assert!(graph.node("drug:pembrolizumab").is_some());
    }

    #[test]
    fn test_rebuild_is_order_independent() {
        let builder = nsclc_builder();
        let expected = builder.build(&RecordSet::from_records(corpus()));

        let mut rng = rand::thread_rng();
        for _ in 0..10 {
            let mut shuffled = corpus();
            shuffled.shuffle(&mut rng);
            assert_eq!(builder.build(&RecordSet::from_records(shuffled)), expected);
        }
    }

    #[test]
    fn test_adding_records_never_weakens() {
        let builder = nsclc_builder();
        let all = corpus();
        let base = builder.build(&RecordSet::from_records(all[..4].to_vec()));
        let grown = builder.build(&RecordSet::from_records(all.clone()));

        for node in base.nodes() {
            assert!(grown.node(&node.id).is_some(), "lost node {}", node.id);
        }
        for edge in base.edges() {
            let after = grown.edge(&edge.from, &edge.to, edge.relation).unwrap();
            assert!(after.weight >= edge.weight);
        }
    }

    #[test]
    fn test_brand_id_resolves_to_generic_node() {
        let graph = GraphBuilder::new().build(&RecordSet::from_records(vec![
            trial("NCT1", "Coumadin", "Atrial Fibrillation"),
            label("set-9", "warfarin", "Coumadin", ""),
            paper("5", "Warfarin dosing"),
        ]));

        assert_eq!(graph.resolve("drug:coumadin"), Some("drug:warfarin"));
        // Label comes from the smallest contributing record id
        assert_eq!(graph.node("drug:coumadin").unwrap().label, "Coumadin");
        assert_eq!(
            graph.edge("drug:coumadin", "trial:nct1", Relation::IntervenesIn).unwrap().weight,
            1
        );
        assert!(graph.edge("paper:5", "drug:warfarin", Relation::Mentions).is_some());
    }

    #[test]
    fn test_vocabulary_aliases_fold_without_labels() {
        let lexicon = Lexicon::bundled().unwrap();
        let graph = GraphBuilder::new()
            .with_vocabulary(&lexicon)
            .build(&RecordSet::from_records(vec![
                trial("NCT7", "Jantoven", "Atrial Fibrillation"),
                paper("8", "Coumadin adherence"),
            ]));

        let node = graph.node("drug:warfarin").unwrap();
        assert_eq!(node.label, "Warfarin");
        assert_eq!(node.source_record_ids.len(), 2);
    }

    #[test]
    fn test_combination_label_keeps_ingredients_apart() {
        let lexicon = Lexicon::bundled().unwrap();
        let dual_action = Record::new(RecordSource::DrugLabel, "openfda", "set-adv", "ADVIL DUAL ACTION", "")
            .with_field(fields::GENERIC_NAME, ["IBUPROFEN AND ACETAMINOPHEN"])
            .with_field(fields::BRAND_NAME, ["ADVIL DUAL ACTION"])
            .with_field(fields::ACTIVE_INGREDIENTS, ["ACETAMINOPHEN", "IBUPROFEN"]);
        let graph = GraphBuilder::new()
            .with_vocabulary(&lexicon)
            .build(&RecordSet::from_records(vec![
                dual_action,
                trial("NCT8", "Ibuprofen", "Pain"),
                trial("NCT9", "Acetaminophen", "Pain"),
            ]));

        assert_eq!(graph.resolve("drug:ibuprofen"), Some("drug:ibuprofen"));
        assert_eq!(graph.resolve("drug:acetaminophen"), Some("drug:acetaminophen"));
        assert!(!graph
            .node("drug:acetaminophen")
            .unwrap()
            .source_record_ids
            .contains("openfda:set-adv"));
        assert!(graph.node("drug:ibuprofen and acetaminophen").is_some());
    }

    #[test]
    fn test_label_ignores_empty_leading_title() {
        let untitled = ("ctgov:NCT5", "");
        let titled = ("registry:NCT5", "Aspirin after stroke");

        for order in [[untitled, titled], [titled, untitled]] {
            let mut graph = Graph::new();
            for (record_id, title) in order {
                graph.add_node("trial:nct5", NodeKind::Trial, title, record_id);
            }
            let node = graph.node("trial:nct5").unwrap();
            assert_eq!(node.label, "Aspirin after stroke");
            assert_eq!(node.source_record_ids.len(), 2);
        }
    }

    #[test]
    fn test_smallest_labelled_record_wins() {
        let mut forward = Graph::new();
        let mut backward = Graph::new();
        let offers = [("b:2", "Second"), ("a:1", "First"), ("c:3", "")];
        for (record_id, label) in offers {
            forward.add_node("drug:x", NodeKind::Drug, label, record_id);
        }
        for (record_id, label) in offers.iter().rev() {
            backward.add_node("drug:x", NodeKind::Drug, label, record_id);
        }
        assert_eq!(forward.node("drug:x").unwrap().label, "First");
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_serialized_shape() {
        let graph = nsclc_builder().build(&RecordSet::from_records(corpus()));
        let json = serde_json::to_value(&graph).unwrap();
        assert!(json["nodes"].is_array());
        assert!(json["edges"][0]["weight"].is_u64());

        let back: Graph = serde_json::from_value(json).unwrap();
        assert_eq!(back, graph);
    }
}
