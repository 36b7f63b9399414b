//! Functional ontology
//!
//! Closed vocabularies for what a repository can do (capabilities), what it
//! makes and uses (artifacts), where it lives (domains) and how it participates
//! in a system (roles), plus the rule table mapping a pair of profiles to a
//! relationship hypothesis.
//!
//! Oracle answers are free text; [`normalize_terms`] maps them onto the closed
//! vocabularies through a fixed synonym table.

use super::profile::RepoProfile;
use super::weave::WeaveType;

/// Capabilities a repository can have
pub const CAPABILITIES: &[&str] = &[
    "analyzes",
    "generates",
    "validates",
    "transforms",
    "orchestrates",
    "detects_drift",
    "monitors",
    "visualizes",
    "extracts",
    "indexes",
    "tests",
    "documents",
    "deploys",
    "secures",
    "optimizes",
    "parses",
    "synthesizes",
    "reconciles",
];

/// Artifact kinds a repository can produce or consume
pub const ARTIFACTS: &[&str] = &[
    "components",
    "configurations",
    "apis",
    "schemas",
    "documentation",
    "tests",
    "metrics",
    "logs",
    "models",
    "datasets",
    "reports",
    "code",
    "designs",
    "tokens",
    "diagrams",
    "workflows",
    "policies",
    "embeddings",
    "graphs",
    "events",
];

/// Domains a repository can belong to
pub const DOMAINS: &[&str] = &[
    "design_systems",
    "developer_tooling",
    "infrastructure",
    "data",
    "machine_learning",
    "security",
    "observability",
    "documentation",
    "testing",
    "frontend",
    "backend",
    "knowledge_management",
    "governance",
    "research",
];

/// Roles a repository can play
pub const ROLES: &[&str] = &[
    "analyzer",
    "producer",
    "consumer",
    "orchestrator",
    "validator",
    "utility",
    "platform",
    "library",
    "transformer",
];

/// Artifacts that tend to drift from their source of truth
pub const DRIFT_PRONE_ARTIFACTS: &[&str] = &[
    "components",
    "configurations",
    "schemas",
    "apis",
    "tokens",
    "designs",
];

/// Artifacts worth validating even when nobody declares consuming them
const VALIDATABLE_ARTIFACTS: &[&str] = &["schemas", "configurations", "apis", "code", "tests"];

const VISUALIZABLE_ARTIFACTS: &[&str] = &["metrics", "logs", "reports", "graphs", "datasets", "events"];

const DOCUMENTABLE_ARTIFACTS: &[&str] = &["apis", "code", "schemas", "components"];

const ORCHESTRATABLE_ROLES: &[&str] = &["producer", "analyzer", "transformer", "validator"];

/// Common oracle spellings mapped onto vocabulary terms
const SYNONYMS: &[(&str, &str)] = &[
    // artifacts
    ("configs", "configurations"),
    ("config", "configurations"),
    ("configuration", "configurations"),
    ("settings", "configurations"),
    ("api", "apis"),
    ("endpoints", "apis"),
    ("schema", "schemas"),
    ("component", "components"),
    ("ui_components", "components"),
    ("docs", "documentation"),
    ("doc", "documentation"),
    ("test", "tests"),
    ("test_cases", "tests"),
    ("metric", "metrics"),
    ("log", "logs"),
    ("model", "models"),
    ("dataset", "datasets"),
    ("data", "datasets"),
    ("report", "reports"),
    ("source_code", "code"),
    ("design", "designs"),
    ("design_tokens", "tokens"),
    ("token", "tokens"),
    ("diagram", "diagrams"),
    ("workflow", "workflows"),
    ("pipelines", "workflows"),
    ("policy", "policies"),
    ("embedding", "embeddings"),
    ("vectors", "embeddings"),
    ("graph", "graphs"),
    ("event", "events"),
    // capabilities
    ("analysis", "analyzes"),
    ("analyze", "analyzes"),
    ("analyses", "analyzes"),
    ("generate", "generates"),
    ("generation", "generates"),
    ("validate", "validates"),
    ("validation", "validates"),
    ("transform", "transforms"),
    ("transformation", "transforms"),
    ("orchestrate", "orchestrates"),
    ("orchestration", "orchestrates"),
    ("drift_detection", "detects_drift"),
    ("detect_drift", "detects_drift"),
    ("monitor", "monitors"),
    ("monitoring", "monitors"),
    ("visualize", "visualizes"),
    ("visualization", "visualizes"),
    ("extract", "extracts"),
    ("extraction", "extracts"),
    ("index", "indexes"),
    ("indexing", "indexes"),
    ("testing", "tests"),
    ("document", "documents"),
    ("deploy", "deploys"),
    ("deployment", "deploys"),
    ("secure", "secures"),
    ("optimize", "optimizes"),
    ("optimization", "optimizes"),
    ("parse", "parses"),
    ("parsing", "parses"),
    ("synthesize", "synthesizes"),
    ("reconcile", "reconciles"),
    // domains
    ("design_system", "design_systems"),
    ("devtools", "developer_tooling"),
    ("developer_tools", "developer_tooling"),
    ("ml", "machine_learning"),
    ("ai", "machine_learning"),
    ("infra", "infrastructure"),
    ("knowledge", "knowledge_management"),
    // roles
    ("analyser", "analyzer"),
    ("generator", "producer"),
    ("orchestration_layer", "orchestrator"),
    ("lib", "library"),
    ("tool", "utility"),
];

/// Which closed vocabulary a list of terms is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    Capabilities,
    Artifacts,
    Domains,
    Roles,
}

impl Vocabulary {
    pub fn terms(&self) -> &'static [&'static str] {
        match self {
            Self::Capabilities => CAPABILITIES,
            Self::Artifacts => ARTIFACTS,
            Self::Domains => DOMAINS,
            Self::Roles => ROLES,
        }
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms().contains(&term)
    }
}

/// Canonical spelling of one free-text term, before vocabulary filtering
fn canonical_term(raw: &str, vocabulary: Vocabulary) -> String {
    let cleaned: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect();

    // A term that is already valid in this vocabulary wins over the synonym
    // table ("tests" is both a capability and an artifact, "data" a domain).
    if vocabulary.contains(&cleaned) {
        return cleaned;
    }

    SYNONYMS
        .iter()
        .find(|(from, _)| *from == cleaned)
        .map(|(_, to)| to.to_string())
        .unwrap_or(cleaned)
}

/// Normalize free-text terms onto a closed vocabulary
///
/// Lower-cases, maps spaces and hyphens to underscores, applies the synonym
/// table, drops anything outside the vocabulary and removes duplicates while
/// preserving first-seen order.
pub fn normalize_terms<S: AsRef<str>>(raw: &[S], vocabulary: Vocabulary) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for term in raw {
        let canonical = canonical_term(term.as_ref(), vocabulary);
        if vocabulary.contains(&canonical) && !out.contains(&canonical) {
            out.push(canonical);
        }
    }
    out
}

pub fn normalize_capabilities<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    normalize_terms(raw, Vocabulary::Capabilities)
}

pub fn normalize_artifacts<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    normalize_terms(raw, Vocabulary::Artifacts)
}

pub fn normalize_domains<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    normalize_terms(raw, Vocabulary::Domains)
}

pub fn normalize_roles<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    normalize_terms(raw, Vocabulary::Roles)
}

/// What a functional rule produced for one ordered pair
#[derive(Debug, Clone, PartialEq)]
pub struct RuleFiring {
    pub hypothesis: String,
    /// Matched capabilities and artifacts, e.g. `artifact:schemas`
    pub evidence: Vec<String>,
}

/// One functional matching rule
pub struct MatchRule {
    pub id: &'static str,
    pub weave_type: WeaveType,
    /// Added to the initial confidence of high-value rules
    pub bonus: f64,
    pub evaluate: fn(&RepoProfile, &RepoProfile) -> Option<RuleFiring>,
}

/// The functional rule set, evaluated for every ordered pair
pub static FUNCTIONAL_RULES: &[MatchRule] = &[
    MatchRule {
        id: "analyzes_output",
        weave_type: WeaveType::AnalyzesOutput,
        bonus: 0.0,
        evaluate: analyzes_output,
    },
    MatchRule {
        id: "detects_drift",
        weave_type: WeaveType::DetectsDriftIn,
        bonus: 0.10,
        evaluate: detects_drift,
    },
    MatchRule {
        id: "pipeline",
        weave_type: WeaveType::FeedsInto,
        bonus: 0.05,
        evaluate: pipeline,
    },
    MatchRule {
        id: "validates_output",
        weave_type: WeaveType::ValidatesOutput,
        bonus: 0.0,
        evaluate: validates_output,
    },
    MatchRule {
        id: "orchestrates",
        weave_type: WeaveType::Orchestrates,
        bonus: 0.0,
        evaluate: orchestrates,
    },
    MatchRule {
        id: "visualizes",
        weave_type: WeaveType::Visualizes,
        bonus: 0.0,
        evaluate: visualizes,
    },
    MatchRule {
        id: "documents",
        weave_type: WeaveType::Documents,
        bonus: 0.0,
        evaluate: documents,
    },
    MatchRule {
        id: "complementary",
        weave_type: WeaveType::Complements,
        bonus: 0.0,
        evaluate: complementary,
    },
];

fn produced_from<'a>(target: &'a RepoProfile, kinds: &[&str]) -> Vec<&'a str> {
    target
        .produces_artifacts
        .iter()
        .filter(|a| kinds.contains(&a.as_str()))
        .map(String::as_str)
        .collect()
}

fn artifact_evidence(capability: &str, artifacts: &[&str]) -> Vec<String> {
    let mut evidence = vec![format!("capability:{}", capability)];
    evidence.extend(artifacts.iter().map(|a| format!("artifact:{}", a)));
    evidence
}

fn analyzes_output(source: &RepoProfile, target: &RepoProfile) -> Option<RuleFiring> {
    if !source.has_capability("analyzes") || target.produces_artifacts.is_empty() {
        return None;
    }
    let artifacts: Vec<&str> = target.produces_artifacts.iter().map(String::as_str).collect();
    Some(RuleFiring {
        hypothesis: format!(
            "{} can analyze the {} that {} produces",
            source.repo_id,
            artifacts.join(", "),
            target.repo_id
        ),
        evidence: artifact_evidence("analyzes", &artifacts),
    })
}

fn detects_drift(source: &RepoProfile, target: &RepoProfile) -> Option<RuleFiring> {
    if !source.has_capability("detects_drift") {
        return None;
    }
    let artifacts = produced_from(target, DRIFT_PRONE_ARTIFACTS);
    if artifacts.is_empty() {
        return None;
    }
    Some(RuleFiring {
        hypothesis: format!(
            "{} can detect drift in the {} maintained by {}",
            source.repo_id,
            artifacts.join(", "),
            target.repo_id
        ),
        evidence: artifact_evidence("detects_drift", &artifacts),
    })
}

fn pipeline(source: &RepoProfile, target: &RepoProfile) -> Option<RuleFiring> {
    let artifacts: Vec<&str> = source
        .produces_artifacts
        .iter()
        .filter(|a| target.consumes(a))
        .map(String::as_str)
        .collect();
    if artifacts.is_empty() {
        return None;
    }
    Some(RuleFiring {
        hypothesis: format!(
            "{} produces {} that {} consumes",
            source.repo_id,
            artifacts.join(", "),
            target.repo_id
        ),
        evidence: artifacts.iter().map(|a| format!("artifact:{}", a)).collect(),
    })
}

fn validates_output(source: &RepoProfile, target: &RepoProfile) -> Option<RuleFiring> {
    if !source.has_capability("validates") {
        return None;
    }
    let artifacts: Vec<&str> = target
        .produces_artifacts
        .iter()
        .filter(|a| source.consumes(a) || VALIDATABLE_ARTIFACTS.contains(&a.as_str()))
        .map(String::as_str)
        .collect();
    if artifacts.is_empty() {
        return None;
    }
    Some(RuleFiring {
        hypothesis: format!(
            "{} can validate the {} that {} produces",
            source.repo_id,
            artifacts.join(", "),
            target.repo_id
        ),
        evidence: artifact_evidence("validates", &artifacts),
    })
}

fn orchestrates(source: &RepoProfile, target: &RepoProfile) -> Option<RuleFiring> {
    if !source.has_capability("orchestrates") {
        return None;
    }
    let roles: Vec<&str> = target
        .roles
        .iter()
        .filter(|r| ORCHESTRATABLE_ROLES.contains(&r.as_str()))
        .map(String::as_str)
        .collect();
    if roles.is_empty() {
        return None;
    }
    let mut evidence = vec!["capability:orchestrates".to_string()];
    evidence.extend(roles.iter().map(|r| format!("role:{}", r)));
    Some(RuleFiring {
        hypothesis: format!(
            "{} can orchestrate {} as a {} step",
            source.repo_id,
            target.repo_id,
            roles.join("/")
        ),
        evidence,
    })
}

fn visualizes(source: &RepoProfile, target: &RepoProfile) -> Option<RuleFiring> {
    if !source.has_capability("visualizes") {
        return None;
    }
    let artifacts = produced_from(target, VISUALIZABLE_ARTIFACTS);
    if artifacts.is_empty() {
        return None;
    }
    Some(RuleFiring {
        hypothesis: format!(
            "{} can visualize the {} emitted by {}",
            source.repo_id,
            artifacts.join(", "),
            target.repo_id
        ),
        evidence: artifact_evidence("visualizes", &artifacts),
    })
}

fn documents(source: &RepoProfile, target: &RepoProfile) -> Option<RuleFiring> {
    if !source.has_capability("documents") {
        return None;
    }
    let artifacts = produced_from(target, DOCUMENTABLE_ARTIFACTS);
    if artifacts.is_empty() {
        return None;
    }
    Some(RuleFiring {
        hypothesis: format!(
            "{} can document the {} of {}",
            source.repo_id,
            artifacts.join(", "),
            target.repo_id
        ),
        evidence: artifact_evidence("documents", &artifacts),
    })
}

fn complementary(source: &RepoProfile, target: &RepoProfile) -> Option<RuleFiring> {
    let shared = source.shared_domains(target);
    if shared.is_empty() {
        return None;
    }
    let source_only: Vec<&str> = source
        .capabilities
        .iter()
        .filter(|c| !target.has_capability(c))
        .map(String::as_str)
        .collect();
    let target_only: Vec<&str> = target
        .capabilities
        .iter()
        .filter(|c| !source.has_capability(c))
        .map(String::as_str)
        .collect();
    if source_only.is_empty() || target_only.is_empty() {
        return None;
    }

    let mut evidence: Vec<String> = shared.iter().map(|d| format!("domain:{}", d)).collect();
    evidence.extend(source_only.iter().map(|c| format!("source_capability:{}", c)));
    evidence.extend(target_only.iter().map(|c| format!("target_capability:{}", c)));
    Some(RuleFiring {
        hypothesis: format!(
            "{} ({}) and {} ({}) cover complementary ground in {}",
            source.repo_id,
            source_only.join(", "),
            target.repo_id,
            target_only.join(", "),
            shared.join(", ")
        ),
        evidence,
    })
}
