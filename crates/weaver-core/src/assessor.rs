//! Candidate assessment
//!
//! Each top-ranked functional candidate gets one skeptical oracle call asking
//! whether the relationship is real and actionable. Only answers that claim a
//! valid opportunity with enough confidence are accepted.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::domain::RelationshipCandidate;
use crate::error::{Error, Result};
use crate::oracle::{Oracle, OracleRequest, invoke_with_timeout};

/// Oracle call name for candidate assessment
pub const ASSESSMENT_CALL: &str = "candidate_assessment";

/// Default minimum confidence for an accepted assessment
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

/// The oracle's verdict on one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub is_valid_opportunity: bool,
    pub title: String,
    pub description: String,
    pub specific_integration: Option<String>,
    pub value_proposition: Option<String>,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub reasoning: String,
}

impl Assessment {
    /// Valid and at least `min_confidence`
    pub fn is_accepted(&self, min_confidence: f64) -> bool {
        self.is_valid_opportunity && self.confidence >= min_confidence
    }
}

/// Wire shape of the assessment reply
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAssessment {
    is_valid_opportunity: bool,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    specific_integration: Option<String>,
    #[serde(default)]
    value_proposition: Option<String>,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Validates functional candidates through the oracle
#[derive(Clone)]
pub struct Assessor {
    oracle: Arc<dyn Oracle>,
    timeout: Duration,
}

impl Assessor {
    pub fn new(oracle: Arc<dyn Oracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    /// Ask the oracle about one candidate
    ///
    /// Oracle failures are returned as errors for which
    /// [`Error::is_oracle_failure`] holds; the candidate should be dropped.
    pub async fn assess(&self, candidate: &RelationshipCandidate) -> Result<Assessment> {
        let subject = format!("{}->{}", candidate.source.repo_id, candidate.target.repo_id);
        let request = OracleRequest::new(
            ASSESSMENT_CALL,
            subject,
            ASSESSMENT_SYSTEM_PROMPT,
            build_assessment_prompt(candidate),
            assessment_schema(),
        );

        let reply = invoke_with_timeout(self.oracle.as_ref(), &request, self.timeout).await?;
        let assessment = parse_assessment(reply, candidate)?;

        debug!(
            source = %candidate.source.repo_id,
            target = %candidate.target.repo_id,
            valid = assessment.is_valid_opportunity,
            confidence = assessment.confidence,
            "Candidate assessed"
        );
        Ok(assessment)
    }

    /// Assess and filter: `Some` only for accepted assessments
    pub async fn evaluate(
        &self,
        candidate: &RelationshipCandidate,
        min_confidence: f64,
    ) -> Result<Option<Assessment>> {
        let assessment = self.assess(candidate).await?;
        if assessment.is_accepted(min_confidence) {
            info!(
                source = %candidate.source.repo_id,
                target = %candidate.target.repo_id,
                weave_type = %candidate.weave_type,
                confidence = assessment.confidence,
                "Candidate accepted"
            );
            Ok(Some(assessment))
        } else {
            Ok(None)
        }
    }
}

fn parse_assessment(reply: Value, candidate: &RelationshipCandidate) -> Result<Assessment> {
    let raw: RawAssessment = serde_json::from_value(reply)
        .map_err(|e| Error::OracleFailure(ASSESSMENT_CALL.to_string(), e.to_string()))?;

    if !raw.confidence.is_finite() {
        return Err(Error::OracleFailure(
            ASSESSMENT_CALL.to_string(),
            "confidence is not a number".to_string(),
        ));
    }

    let title = match raw.title.trim() {
        "" => fallback_title(candidate),
        t => t.to_string(),
    };
    let description = match raw.description.trim() {
        "" => candidate.hypothesis.clone(),
        d => d.to_string(),
    };

    Ok(Assessment {
        is_valid_opportunity: raw.is_valid_opportunity,
        title,
        description,
        specific_integration: non_blank(raw.specific_integration),
        value_proposition: non_blank(raw.value_proposition),
        confidence: raw.confidence.clamp(0.0, 1.0),
        reasoning: raw.reasoning.trim().to_string(),
    })
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn fallback_title(candidate: &RelationshipCandidate) -> String {
    format!(
        "{} {} {}",
        candidate.source.repo_id,
        candidate.weave_type.as_str().replace('_', " "),
        candidate.target.repo_id
    )
}

fn build_assessment_prompt(candidate: &RelationshipCandidate) -> String {
    let source = &candidate.source;
    let target = &candidate.target;

    format!(
        r#"Assess this candidate relationship between two repositories.

HYPOTHESIS ({weave_type}): {hypothesis}
MATCHED EVIDENCE: {evidence}

SOURCE: {source_id}
- Purpose: {source_purpose}
- Capabilities: {source_capabilities}
- Produces: {source_produces}
- Consumes: {source_consumes}
- Excerpts:
{source_excerpts}

TARGET: {target_id}
- Purpose: {target_purpose}
- Capabilities: {target_capabilities}
- Produces: {target_produces}
- Consumes: {target_consumes}
- Excerpts:
{target_excerpts}

Is this a real, specific, actionable integration? If so, name the concrete action
(specificIntegration) and what it would be worth (valueProposition)."#,
        weave_type = candidate.weave_type.as_str(),
        hypothesis = candidate.hypothesis,
        evidence = candidate.evidence.join(", "),
        source_id = source.repo_id,
        source_purpose = source.purpose,
        source_capabilities = source.capabilities.join(", "),
        source_produces = source.produces_artifacts.join(", "),
        source_consumes = source.consumes_artifacts.join(", "),
        source_excerpts = format_excerpts(&source.excerpts),
        target_id = target.repo_id,
        target_purpose = target.purpose,
        target_capabilities = target.capabilities.join(", "),
        target_produces = target.produces_artifacts.join(", "),
        target_consumes = target.consumes_artifacts.join(", "),
        target_excerpts = format_excerpts(&target.excerpts),
    )
}

fn format_excerpts(excerpts: &[String]) -> String {
    if excerpts.is_empty() {
        return "  (none)".to_string();
    }
    excerpts
        .iter()
        .map(|e| format!("  > {}", e.replace('\n', "\n    ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn assessment_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "isValidOpportunity": { "type": "boolean" },
            "title": { "type": "string" },
            "description": { "type": "string" },
            "specificIntegration": { "type": ["string", "null"] },
            "valueProposition": { "type": ["string", "null"] },
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
            "reasoning": { "type": "string" }
        },
        "required": ["isValidOpportunity", "title", "description", "specificIntegration",
                     "valueProposition", "confidence", "reasoning"]
    })
}

/// System prompt for candidate assessment
const ASSESSMENT_SYSTEM_PROMPT: &str = r#"You are a skeptical principal engineer reviewing proposed integrations between software repositories.

Most candidates should NOT pass. A candidate is only valid if a specific team could act on it this quarter and get real value.

Reject:
- Vague connections ("both deal with data")
- Obvious connections anyone would already know about
- Relationships that depend on capabilities the excerpts do not show

When you accept, be concrete about the integration and its value. Set confidence to how sure you are, not to how interesting the idea is.

Return valid JSON only, with no additional text or explanation."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RepoProfile;
    use crate::domain::weave::WeaveType;
    use crate::oracle::testing::FnOracle;

    fn candidate() -> RelationshipCandidate {
        let mut source = RepoProfile::new("drift-detector", "Detects drift");
        source.excerpts = vec!["# Drift\nline two".into()];
        RelationshipCandidate {
            source: Arc::new(source),
            target: Arc::new(RepoProfile::new("component-lib", "Components")),
            weave_type: WeaveType::DetectsDriftIn,
            rule_id: "detects_drift",
            hypothesis: "drift-detector can detect drift in the components maintained by component-lib".into(),
            evidence: vec!["capability:detects_drift".into(), "artifact:components".into()],
            confidence: 0.82,
        }
    }

    fn reply(valid: bool, confidence: f64) -> Value {
        json!({
            "isValidOpportunity": valid,
            "title": "Drift checks for the component library",
            "description": "Run drift detection in CI",
            "specificIntegration": "Add a CI job",
            "valueProposition": null,
            "confidence": confidence,
            "reasoning": "Token drift is a known pain"
        })
    }

    #[tokio::test]
    async fn test_evaluate_accepts_valid_confident() {
        let oracle = Arc::new(FnOracle::new(|_| Ok(reply(true, 0.8))));
        let assessor = Assessor::new(oracle, Duration::from_secs(5));

        let accepted = assessor.evaluate(&candidate(), DEFAULT_MIN_CONFIDENCE).await.unwrap();
        let assessment = accepted.unwrap();
        assert_eq!(assessment.title, "Drift checks for the component library");
        assert_eq!(assessment.specific_integration.as_deref(), Some("Add a CI job"));
        assert!(assessment.value_proposition.is_none());
    }

    #[tokio::test]
    async fn test_evaluate_rejects_invalid_even_when_confident() {
        let oracle = Arc::new(FnOracle::new(|_| Ok(reply(false, 0.99))));
        let assessor = Assessor::new(oracle, Duration::from_secs(5));

        assert!(assessor.evaluate(&candidate(), 0.6).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_evaluate_rejects_low_confidence() {
        let oracle = Arc::new(FnOracle::new(|_| Ok(reply(true, 0.59))));
        let assessor = Assessor::new(oracle, Duration::from_secs(5));

        assert!(assessor.evaluate(&candidate(), 0.6).await.unwrap().is_none());
    }

    #[test]
    fn test_out_of_range_confidence_clamped() {
        let assessment = parse_assessment(reply(true, 7.0), &candidate()).unwrap();
        assert_eq!(assessment.confidence, 1.0);
        assert!(assessment.is_accepted(0.95));
    }

    #[test]
    fn test_empty_title_falls_back() {
        let mut value = reply(true, 0.7);
        value["title"] = json!("  ");
        value["description"] = json!("");
        let assessment = parse_assessment(value, &candidate()).unwrap();
        assert_eq!(assessment.title, "drift-detector detects drift in component-lib");
        assert_eq!(assessment.description, candidate().hypothesis);
    }

    #[test]
    fn test_malformed_reply_is_oracle_failure() {
        let err = parse_assessment(json!({ "title": "no verdict" }), &candidate()).unwrap_err();
        assert!(err.is_oracle_failure());

        let err = parse_assessment(json!({ "isValidOpportunity": "yes", "confidence": 0.9 }), &candidate())
            .unwrap_err();
        assert!(err.is_oracle_failure());
    }

    #[test]
    fn test_prompt_contains_evidence_and_excerpts() {
        let prompt = build_assessment_prompt(&candidate());
        assert!(prompt.contains("artifact:components"));
        assert!(prompt.contains("  > # Drift\n    line two"));
        assert!(prompt.contains("TARGET: component-lib"));
    }
}
