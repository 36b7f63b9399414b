//! Philosophical profiling
//!
//! One strict oracle call per repository: every dimension must be a member of
//! its enumeration, or the whole answer is rejected.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::domain::philosophy::{
    AbstractionLevel, Antagonist, CognitiveTransform, Epistemology, Temporality,
};
use crate::domain::{PhilosophicalProfile, RepoProfile};
use crate::error::{Error, Result};
use crate::oracle::{Oracle, OracleRequest, invoke_with_timeout};

/// Oracle call name for philosophical extraction
pub const PHILOSOPHICAL_CALL: &str = "philosophical_extraction";

/// Derives stance profiles from functional profiles
#[derive(Clone)]
pub struct PhilosophicalProfiler {
    oracle: Arc<dyn Oracle>,
    timeout: Duration,
}

/// Strict stance answer; every field required
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStance {
    epistemology: String,
    antagonist: String,
    cognitive_transform: String,
    temporality: String,
    abstraction_level: String,
    statement: String,
    virtue: String,
    confidence: f64,
}

impl PhilosophicalProfiler {
    pub fn new(oracle: Arc<dyn Oracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    /// Derive the stance profile of an already profiled repository
    pub async fn profile(&self, profile: &RepoProfile) -> Result<PhilosophicalProfile> {
        let request = OracleRequest::new(
            PHILOSOPHICAL_CALL,
            &profile.repo_id,
            PHILOSOPHICAL_SYSTEM_PROMPT,
            build_stance_prompt(profile),
            stance_schema(),
        );

        let reply = invoke_with_timeout(self.oracle.as_ref(), &request, self.timeout).await?;
        let stance = parse_stance(&profile.repo_id, reply)?;

        info!(
            repo_id = %profile.repo_id,
            antagonist = stance.antagonist.as_str(),
            transform = stance.cognitive_transform.as_str(),
            "Philosophical profile derived"
        );

        Ok(stance)
    }
}

fn invalid(reason: String) -> Error {
    Error::OracleFailure(PHILOSOPHICAL_CALL.to_string(), reason)
}

fn parse_stance(repo_id: &str, reply: Value) -> Result<PhilosophicalProfile> {
    let raw: RawStance = serde_json::from_value(reply).map_err(|e| invalid(e.to_string()))?;

    let epistemology = Epistemology::parse(&raw.epistemology)
        .ok_or_else(|| invalid(format!("unknown epistemology '{}'", raw.epistemology)))?;
    let antagonist = Antagonist::parse(&raw.antagonist)
        .ok_or_else(|| invalid(format!("unknown antagonist '{}'", raw.antagonist)))?;
    let cognitive_transform = CognitiveTransform::parse(&raw.cognitive_transform).ok_or_else(|| {
        invalid(format!(
            "unknown cognitive transform '{}'",
            raw.cognitive_transform
        ))
    })?;
    let temporality = Temporality::parse(&raw.temporality)
        .ok_or_else(|| invalid(format!("unknown temporality '{}'", raw.temporality)))?;
    let abstraction_level = AbstractionLevel::parse(&raw.abstraction_level).ok_or_else(|| {
        invalid(format!(
            "unknown abstraction level '{}'",
            raw.abstraction_level
        ))
    })?;

    if !raw.confidence.is_finite() {
        return Err(invalid("confidence is not a number".to_string()));
    }

    Ok(PhilosophicalProfile {
        repo_id: repo_id.to_string(),
        epistemology,
        antagonist,
        cognitive_transform,
        temporality,
        abstraction_level,
        stance: raw.statement.trim().to_string(),
        virtue: raw.virtue.trim().to_string(),
        confidence: raw.confidence.clamp(0.0, 1.0),
    })
}

fn enum_values<T: Copy>(all: &[T], as_str: fn(&T) -> &'static str) -> Vec<&'static str> {
    all.iter().map(as_str).collect()
}

fn stance_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "epistemology": { "type": "string", "enum": enum_values(Epistemology::all(), Epistemology::as_str) },
            "antagonist": { "type": "string", "enum": enum_values(Antagonist::all(), Antagonist::as_str) },
            "cognitiveTransform": { "type": "string", "enum": enum_values(CognitiveTransform::all(), CognitiveTransform::as_str) },
            "temporality": { "type": "string", "enum": enum_values(Temporality::all(), Temporality::as_str) },
            "abstractionLevel": { "type": "string", "enum": enum_values(AbstractionLevel::all(), AbstractionLevel::as_str) },
            "statement": { "type": "string" },
            "virtue": { "type": "string" },
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 }
        },
        "required": ["epistemology", "antagonist", "cognitiveTransform", "temporality",
                     "abstractionLevel", "statement", "virtue", "confidence"]
    })
}

fn build_stance_prompt(profile: &RepoProfile) -> String {
    format!(
        r#"Describe the philosophical stance of this repository.

PROFILE:
- Repository: {repo_id}
- Purpose: {purpose}
- Capabilities: {capabilities}
- Produces: {produces}
- Consumes: {consumes}
- Domains: {domains}
- Problems solved: {problems}

Choose exactly one value per dimension:
- epistemology: how it comes to know things
- antagonist: the force it works against
- cognitiveTransform: what it does to understanding
- temporality: when it acts relative to the problem
- abstractionLevel: the level it operates at

Then give a one-sentence stance statement, the core virtue it embodies, and your
confidence (0.0 to 1.0)."#,
        repo_id = profile.repo_id,
        purpose = profile.purpose,
        capabilities = profile.capabilities.join(", "),
        produces = profile.produces_artifacts.join(", "),
        consumes = profile.consumes_artifacts.join(", "),
        domains = profile.domains.join(", "),
        problems = profile.problems_solved.join("; "),
    )
}

/// System prompt for philosophical extraction
const PHILOSOPHICAL_SYSTEM_PROMPT: &str = r#"You are a philosopher of software who identifies the stance a tool takes toward the problem it solves.

Look past features to the underlying position: what the tool believes, what it fights, and how it changes what its users understand.

Only use the enumerated values you are given. Return valid JSON only, with no additional text or explanation."#;
