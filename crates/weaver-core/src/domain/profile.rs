//! Repository profiles and the transient candidates derived from them

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::philosophy::{
    AbstractionLevel, Antagonist, CognitiveTransform, Epistemology, Temporality,
};
use super::weave::{WeaveType, unordered_pair};

/// Structured functional description of a repository
///
/// Every vocabulary-backed list holds normalized ontology terms only, without
/// duplicates and in first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoProfile {
    pub repo_id: String,
    pub purpose: String,
    pub capabilities: Vec<String>,
    pub produces_artifacts: Vec<String>,
    pub consumes_artifacts: Vec<String>,
    pub domains: Vec<String>,
    pub roles: Vec<String>,
    pub keywords: Vec<String>,
    pub problems_solved: Vec<String>,
    pub target_users: Vec<String>,
    /// Short excerpts of the source material
    pub excerpts: Vec<String>,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl RepoProfile {
    pub fn new(repo_id: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            purpose: purpose.into(),
            capabilities: Vec::new(),
            produces_artifacts: Vec::new(),
            consumes_artifacts: Vec::new(),
            domains: Vec::new(),
            roles: Vec::new(),
            keywords: Vec::new(),
            problems_solved: Vec::new(),
            target_users: Vec::new(),
            excerpts: Vec::new(),
            confidence: 0.5,
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    pub fn produces(&self, artifact: &str) -> bool {
        self.produces_artifacts.iter().any(|a| a == artifact)
    }

    pub fn consumes(&self, artifact: &str) -> bool {
        self.consumes_artifacts.iter().any(|a| a == artifact)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Domains present in both profiles, in this profile's order
    pub fn shared_domains<'a>(&'a self, other: &RepoProfile) -> Vec<&'a str> {
        self.domains
            .iter()
            .filter(|d| other.domains.contains(d))
            .map(String::as_str)
            .collect()
    }
}

/// Stance description of a repository along five fixed dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhilosophicalProfile {
    pub repo_id: String,
    pub epistemology: Epistemology,
    pub antagonist: Antagonist,
    pub cognitive_transform: CognitiveTransform,
    pub temporality: Temporality,
    pub abstraction_level: AbstractionLevel,
    /// One-sentence stance statement
    pub stance: String,
    /// Core virtue label
    pub virtue: String,
    pub confidence: f64,
}

impl PhilosophicalProfile {
    /// The five dimensions as a JSON object
    pub fn dimensions(&self) -> serde_json::Value {
        serde_json::json!({
            "epistemology": self.epistemology.as_str(),
            "antagonist": self.antagonist.as_str(),
            "cognitive_transform": self.cognitive_transform.as_str(),
            "temporality": self.temporality.as_str(),
            "abstraction_level": self.abstraction_level.as_str(),
        })
    }
}

/// A hypothesised functional relationship awaiting assessment
#[derive(Debug, Clone)]
pub struct RelationshipCandidate {
    pub source: Arc<RepoProfile>,
    pub target: Arc<RepoProfile>,
    pub weave_type: WeaveType,
    /// Rule that fired
    pub rule_id: &'static str,
    pub hypothesis: String,
    /// Capability/artifact matches that justified the firing
    pub evidence: Vec<String>,
    /// Initial confidence in [0, 0.95]
    pub confidence: f64,
}

/// A stance-level alignment between two repositories
#[derive(Debug, Clone)]
pub struct PhilosophicalMatch {
    pub source: Arc<PhilosophicalProfile>,
    pub target: Arc<PhilosophicalProfile>,
    pub match_type: WeaveType,
    pub description: String,
    pub confidence: f64,
    pub integration_hypothesis: String,
}

/// Anything the matcher can rank and deduplicate by unordered pair
pub trait PairCandidate {
    fn source_id(&self) -> &str;
    fn target_id(&self) -> &str;
    fn weave_type(&self) -> WeaveType;
    fn confidence(&self) -> f64;

    fn pair_key(&self) -> (String, String) {
        unordered_pair(self.source_id(), self.target_id())
    }
}

impl PairCandidate for RelationshipCandidate {
    fn source_id(&self) -> &str {
        &self.source.repo_id
    }

    fn target_id(&self) -> &str {
        &self.target.repo_id
    }

    fn weave_type(&self) -> WeaveType {
        self.weave_type
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }
}

impl PairCandidate for PhilosophicalMatch {
    fn source_id(&self) -> &str {
        &self.source.repo_id
    }

    fn target_id(&self) -> &str {
        &self.target.repo_id
    }

    fn weave_type(&self) -> WeaveType {
        self.match_type
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }
}
