//! Clinsight Intelligence Layer
//!
//! Turns three disjoint record streams (drug labels, papers, trials) into
//! one answer under partial provider failure:
//! - Capability routing of free-text questions
//! - Concurrent, cached, deadline-bounded provider orchestration
//! - Relationship graph construction
//! - Label-based drug interaction detection
//! - Weighted evidence synthesis

pub mod engine;
pub mod graph;
pub mod interactions;
pub mod lexicon;
pub mod orchestrator;
pub mod router;
pub mod synthesis;

pub use engine::{ClinicalIntelligence, EngineSettings, InteractionReport};
pub use graph::{Graph, GraphBuilder, GraphEdge, GraphNode, NodeKind, Relation};
pub use interactions::{InteractionDetector, InteractionFinding, Severity};
pub use lexicon::{EntityKind, Lexicon, VocabEntry};
pub use orchestrator::{FetchOutcome, Orchestrator};
pub use router::{CapabilityRouter, Engine, QueryIntent, RouteOutcome, RoutePlan};
pub use synthesis::{EvidenceCount, ScoringWeights, SynthesisResult, SynthesisScorer};
