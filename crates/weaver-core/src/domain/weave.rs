//! Weaves: persisted relationships between repositories
//!
//! A weave is a typed, scored edge between two repositories of a plexus,
//! carrying the provenance that justified it. Within a plexus there is at most
//! one active weave per unordered repository pair per type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

/// A persisted relationship between two repositories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Weave {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Plexus this weave belongs to
    pub plexus_id: String,
    pub source_repo_id: String,
    pub target_repo_id: String,
    pub weave_type: WeaveType,
    pub title: String,
    pub description: String,
    /// Score in [0, 1]
    pub score: f64,
    /// Provenance (always a JSON object)
    pub metadata: Value,
    pub status: WeaveStatus,
    /// Discovery run that produced the weave
    pub run_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Weave {
    /// Create a new active weave
    pub fn new(
        plexus_id: impl Into<String>,
        source_repo_id: impl Into<String>,
        target_repo_id: impl Into<String>,
        weave_type: WeaveType,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            plexus_id: plexus_id.into(),
            source_repo_id: source_repo_id.into(),
            target_repo_id: target_repo_id.into(),
            weave_type,
            title: title.into(),
            description: description.into(),
            score: 0.5,
            metadata: Value::Object(Default::default()),
            status: WeaveStatus::Active,
            run_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the score (clamped to 0.0-1.0)
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score.clamp(0.0, 1.0);
        self
    }

    /// Set the provenance metadata
    ///
    /// Non-object values are wrapped under a `value` key so the column always
    /// holds an object.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = match metadata {
            Value::Object(_) => metadata,
            other => serde_json::json!({ "value": other }),
        };
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Unordered pair key `(low, high)`
    pub fn pair_key(&self) -> (String, String) {
        unordered_pair(&self.source_repo_id, &self.target_repo_id)
    }

    pub fn is_active(&self) -> bool {
        self.status == WeaveStatus::Active
    }

    /// Mark the weave dismissed
    pub fn dismiss(&mut self) {
        self.status = WeaveStatus::Dismissed;
        self.updated_at = Utc::now();
    }
}

/// Order two repository ids into an unordered pair key
pub fn unordered_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Relationship types a weave can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaveType {
    /// Source's analysis applies to artifacts target produces
    AnalyzesOutput,
    /// Source detects drift in artifacts target produces
    DetectsDriftIn,
    /// Source produces an artifact target consumes
    FeedsInto,
    /// Source validates artifacts target produces
    ValidatesOutput,
    /// Source can orchestrate target
    Orchestrates,
    /// Source visualizes data target produces
    Visualizes,
    /// Source documents artifacts target produces
    Documents,
    /// Shared domain, complementary capabilities
    Complements,
    /// Both oppose the same force
    SharedAntagonist,
    /// Same antagonist at different abstraction levels
    VerticalAlignment,
    /// Same way of knowing
    EpistemologicalKin,
    /// One reveals, the other enforces
    RevealEnforcePair,
    /// Both fight disorder, from different angles
    AntiEntropyAlignment,
    /// Embedding-level content similarity
    SemanticSimilarity,
}

/// Which matching axis produced a weave type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaveCategory {
    Functional,
    Philosophical,
    Semantic,
}

impl WeaveType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnalyzesOutput => "analyzes_output",
            Self::DetectsDriftIn => "detects_drift_in",
            Self::FeedsInto => "feeds_into",
            Self::ValidatesOutput => "validates_output",
            Self::Orchestrates => "orchestrates",
            Self::Visualizes => "visualizes",
            Self::Documents => "documents",
            Self::Complements => "complements",
            Self::SharedAntagonist => "shared_antagonist",
            Self::VerticalAlignment => "vertical_alignment",
            Self::EpistemologicalKin => "epistemological_kin",
            Self::RevealEnforcePair => "reveal_enforce_pair",
            Self::AntiEntropyAlignment => "anti_entropy_alignment",
            Self::SemanticSimilarity => "semantic_similarity",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "analyzes_output" => Some(Self::AnalyzesOutput),
            "detects_drift_in" | "detects_drift" => Some(Self::DetectsDriftIn),
            "feeds_into" | "pipeline" => Some(Self::FeedsInto),
            "validates_output" => Some(Self::ValidatesOutput),
            "orchestrates" => Some(Self::Orchestrates),
            "visualizes" => Some(Self::Visualizes),
            "documents" => Some(Self::Documents),
            "complements" | "complementary" => Some(Self::Complements),
            "shared_antagonist" => Some(Self::SharedAntagonist),
            "vertical_alignment" => Some(Self::VerticalAlignment),
            "epistemological_kin" => Some(Self::EpistemologicalKin),
            "reveal_enforce_pair" => Some(Self::RevealEnforcePair),
            "anti_entropy_alignment" => Some(Self::AntiEntropyAlignment),
            "semantic_similarity" => Some(Self::SemanticSimilarity),
            _ => None,
        }
    }

    /// Get all weave types
    pub fn all() -> &'static [WeaveType] {
        &[
            Self::AnalyzesOutput,
            Self::DetectsDriftIn,
            Self::FeedsInto,
            Self::ValidatesOutput,
            Self::Orchestrates,
            Self::Visualizes,
            Self::Documents,
            Self::Complements,
            Self::SharedAntagonist,
            Self::VerticalAlignment,
            Self::EpistemologicalKin,
            Self::RevealEnforcePair,
            Self::AntiEntropyAlignment,
            Self::SemanticSimilarity,
        ]
    }

    pub fn category(&self) -> WeaveCategory {
        match self {
            Self::SharedAntagonist
            | Self::VerticalAlignment
            | Self::EpistemologicalKin
            | Self::RevealEnforcePair
            | Self::AntiEntropyAlignment => WeaveCategory::Philosophical,
            Self::SemanticSimilarity => WeaveCategory::Semantic,
            _ => WeaveCategory::Functional,
        }
    }
}

impl std::fmt::Display for WeaveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a weave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaveStatus {
    Active,
    /// Rejected by a reviewer; ignored by the duplicate check
    Dismissed,
}

impl WeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }
}

/// Result of attempting to persist a weave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// An active weave already covers this pair and type
    Duplicate,
}

/// Repository trait for weave persistence
#[async_trait]
pub trait WeaveRepository: Send + Sync {
    /// Find the active weave for an unordered pair and type, if any
    async fn find_active(
        &self,
        plexus_id: &str,
        repo_a: &str,
        repo_b: &str,
        weave_type: WeaveType,
    ) -> Result<Option<Weave>>;

    /// Insert a weave, reporting a duplicate instead of failing
    async fn insert(&self, weave: &Weave) -> Result<InsertOutcome>;

    /// Get a weave by ID
    async fn get(&self, id: &str) -> Result<Option<Weave>>;

    /// List weaves of a plexus, best score first
    async fn list(
        &self,
        plexus_id: &str,
        weave_type: Option<WeaveType>,
        include_dismissed: bool,
    ) -> Result<Vec<Weave>>;

    /// Dismiss a weave; returns false if it does not exist
    async fn dismiss(&self, id: &str) -> Result<bool>;

    /// Count active weaves in a plexus
    async fn count_active(&self, plexus_id: &str) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weave_creation() {
        let weave = Weave::new(
            "plexus-1",
            "drift-detector",
            "component-lib",
            WeaveType::DetectsDriftIn,
            "Drift checks for components",
            "desc",
        )
        .with_score(1.4)
        .with_run_id("run-1");

        assert_eq!(weave.score, 1.0);
        assert!(weave.is_active());
        assert_eq!(weave.run_id.as_deref(), Some("run-1"));
        assert!(weave.metadata.is_object());
    }

    #[test]
    fn test_pair_key_is_unordered() {
        let ab = Weave::new("p", "a", "b", WeaveType::FeedsInto, "t", "d");
        let ba = Weave::new("p", "b", "a", WeaveType::FeedsInto, "t", "d");
        assert_eq!(ab.pair_key(), ba.pair_key());
        assert_eq!(ab.pair_key(), ("a".to_string(), "b".to_string()));
    }

    #[test]
    fn test_metadata_always_object() {
        let weave = Weave::new("p", "a", "b", WeaveType::FeedsInto, "t", "d")
            .with_metadata(serde_json::json!([1, 2]));
        assert_eq!(weave.metadata["value"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_weave_type_roundtrip() {
        for weave_type in WeaveType::all() {
            assert_eq!(WeaveType::parse(weave_type.as_str()), Some(*weave_type));
        }
        assert_eq!(WeaveType::parse("Detects-Drift-In"), Some(WeaveType::DetectsDriftIn));
        assert_eq!(WeaveType::parse("pipeline"), Some(WeaveType::FeedsInto));
        assert_eq!(WeaveType::parse("nonsense"), None);
    }

    #[test]
    fn test_weave_type_categories() {
        assert_eq!(WeaveType::AnalyzesOutput.category(), WeaveCategory::Functional);
        assert_eq!(WeaveType::RevealEnforcePair.category(), WeaveCategory::Philosophical);
        assert_eq!(WeaveType::SemanticSimilarity.category(), WeaveCategory::Semantic);
    }

    #[test]
    fn test_dismiss() {
        let mut weave = Weave::new("p", "a", "b", WeaveType::Complements, "t", "d");
        weave.dismiss();
        assert_eq!(weave.status, WeaveStatus::Dismissed);
        assert_eq!(WeaveStatus::parse("dismissed"), Some(WeaveStatus::Dismissed));
    }
}
