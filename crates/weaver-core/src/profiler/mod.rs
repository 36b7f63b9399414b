//! Repository profiling
//!
//! The [`Profiler`] turns a repository's raw material into a [`RepoProfile`]
//! with one oracle call, then normalizes the lenient free-text answer onto the
//! closed ontology vocabularies. The [`PhilosophicalProfiler`] derives a
//! stance profile from a finished `RepoProfile` with a second, strict call.

mod cache;
mod philosophical;
mod source;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::domain::ontology::{
    ARTIFACTS, CAPABILITIES, DOMAINS, ROLES, normalize_artifacts, normalize_capabilities,
    normalize_domains, normalize_roles,
};
use crate::domain::{RepoProfile, RepoRef};
use crate::error::{Error, Result};
use crate::oracle::{Oracle, OracleRequest, invoke_with_timeout};

pub use cache::ProfileCache;
pub use philosophical::PhilosophicalProfiler;
pub use source::{
    FsRepoSource, MAX_DESCRIPTION_CHARS, MAX_DIRECTORIES, MAX_MANIFEST_CHARS, RepoInputs,
    RepoSource,
};

pub(crate) use source::truncate_content;

/// Oracle call name for profile extraction
pub const PROFILE_CALL: &str = "profile_extraction";

/// Confidence ceiling when only directory names were available
const DIRECTORY_ONLY_MAX_CONFIDENCE: f64 = 0.4;

/// Confidence used when the oracle omits one
const DEFAULT_CONFIDENCE: f64 = 0.5;

const MAX_EXCERPTS: usize = 3;
const MAX_EXCERPT_CHARS: usize = 400;
const MAX_KEYWORDS: usize = 20;
const MAX_PROBLEMS: usize = 10;
const MAX_TARGET_USERS: usize = 10;

/// Derives functional profiles for repositories
#[derive(Clone)]
pub struct Profiler {
    oracle: Arc<dyn Oracle>,
    source: Arc<dyn RepoSource>,
    cache: Option<Arc<dyn ProfileCache>>,
    timeout: Duration,
}

impl Profiler {
    pub fn new(oracle: Arc<dyn Oracle>, source: Arc<dyn RepoSource>, timeout: Duration) -> Self {
        Self {
            oracle,
            source,
            cache: None,
            timeout,
        }
    }

    /// Reuse profiles whose inputs are unchanged
    pub fn with_cache(mut self, cache: Arc<dyn ProfileCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Profile one repository
    ///
    /// Oracle failures are returned as errors for which
    /// [`Error::is_oracle_failure`] holds; the call is not retried here.
    /// Repositories with no description and no manifest are still profiled
    /// from their directory names, at reduced confidence.
    pub async fn profile(&self, repo: &RepoRef) -> Result<RepoProfile> {
        let inputs = RepoInputs::gather(self.source.as_ref(), repo).await;
        let input_hash = inputs.input_hash();

        if let Some(cache) = &self.cache {
            match cache.get(&repo.repo_id, &input_hash).await {
                Ok(Some(profile)) => {
                    debug!(repo_id = %repo.repo_id, "Profile cache hit");
                    return Ok(profile);
                }
                Ok(None) => {}
                Err(e) => warn!(repo_id = %repo.repo_id, error = %e, "Profile cache read failed"),
            }
        }

        if inputs.is_directory_only() {
            info!(
                repo_id = %repo.repo_id,
                directories = inputs.directories.len(),
                "No description or manifest, profiling from directory names only"
            );
        }

        let request = OracleRequest::new(
            PROFILE_CALL,
            &repo.repo_id,
            PROFILE_SYSTEM_PROMPT,
            build_profile_prompt(repo, &inputs),
            profile_schema(),
        );

        let reply = invoke_with_timeout(self.oracle.as_ref(), &request, self.timeout).await?;
        let raw = parse_profile_reply(reply)?;
        let profile = raw.into_profile(&repo.repo_id, &inputs);

        info!(
            repo_id = %repo.repo_id,
            capabilities = profile.capabilities.len(),
            confidence = profile.confidence,
            "Repository profiled"
        );

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&repo.repo_id, &input_hash, &profile).await {
                warn!(repo_id = %repo.repo_id, error = %e, "Profile cache write failed");
            }
        }

        Ok(profile)
    }
}

/// Lenient profile answer; every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawProfile {
    #[serde(deserialize_with = "lenient_string")]
    pub purpose: String,
    #[serde(deserialize_with = "lenient_list")]
    pub capabilities: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub produces_artifacts: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub consumes_artifacts: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub domains: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub roles: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub keywords: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub problems_solved: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub target_users: Vec<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub confidence: Option<f64>,
}

impl RawProfile {
    /// Normalize onto the ontology and produce the typed profile
    pub fn into_profile(self, repo_id: &str, inputs: &RepoInputs) -> RepoProfile {
        let mut confidence = self
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0);
        if inputs.is_directory_only() {
            confidence = confidence.min(DIRECTORY_ONLY_MAX_CONFIDENCE);
        }

        RepoProfile {
            repo_id: repo_id.to_string(),
            purpose: self.purpose.trim().to_string(),
            capabilities: normalize_capabilities(&self.capabilities),
            produces_artifacts: normalize_artifacts(&self.produces_artifacts),
            consumes_artifacts: normalize_artifacts(&self.consumes_artifacts),
            domains: normalize_domains(&self.domains),
            roles: normalize_roles(&self.roles),
            keywords: clean_free_text(self.keywords, MAX_KEYWORDS),
            problems_solved: clean_free_text(self.problems_solved, MAX_PROBLEMS),
            target_users: clean_free_text(self.target_users, MAX_TARGET_USERS),
            excerpts: excerpts(inputs),
            confidence,
        }
    }
}

/// Decode a profile reply; only the vocabulary is lenient, not its shape
fn parse_profile_reply(reply: Value) -> Result<RawProfile> {
    let failure = |reason: String| Error::OracleFailure(PROFILE_CALL.to_string(), reason);

    if !reply.is_object() {
        return Err(failure("reply is not a JSON object".to_string()));
    }
    let raw: RawProfile = serde_json::from_value(reply).map_err(|e| failure(e.to_string()))?;
    if raw.purpose.trim().is_empty() {
        return Err(failure("reply has no purpose".to_string()));
    }
    Ok(raw)
}

/// Trim, drop blanks and case-insensitive duplicates, cap
fn clean_free_text(items: Vec<String>, cap: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let trimmed = item.trim();
        if trimmed.is_empty() || out.iter().any(|o| o.eq_ignore_ascii_case(trimmed)) {
            continue;
        }
        out.push(trimmed.to_string());
        if out.len() == cap {
            break;
        }
    }
    out
}

fn excerpts(inputs: &RepoInputs) -> Vec<String> {
    let mut out = Vec::with_capacity(MAX_EXCERPTS);
    if let Some(description) = &inputs.description {
        out.push(truncate_content(description.trim(), MAX_EXCERPT_CHARS));
    }
    if let Some(manifest) = &inputs.manifest {
        out.push(truncate_content(manifest.trim(), MAX_EXCERPT_CHARS));
    }
    if !inputs.directories.is_empty() {
        out.push(truncate_content(&inputs.directories.join(", "), MAX_EXCERPT_CHARS));
    }
    out.truncate(MAX_EXCERPTS);
    out
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Accept an array of strings, a comma-separated string, or null
fn lenient_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    })
}

/// Accept a number or a numeric string
fn lenient_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn build_profile_prompt(repo: &RepoRef, inputs: &RepoInputs) -> String {
    let description = inputs
        .description
        .as_deref()
        .unwrap_or("(no description document found)");
    let manifest = inputs
        .manifest
        .as_deref()
        .unwrap_or("(no manifest found)");
    let directories = if inputs.directories.is_empty() {
        "(none)".to_string()
    } else {
        inputs.directories.join(", ")
    };

    format!(
        r#"Build a conceptual profile of this repository.

REPOSITORY: {name} (id: {repo_id})

DESCRIPTION:
```
{description}
```

MANIFEST:
```
{manifest}
```

TOP-LEVEL DIRECTORIES: {directories}

Describe what the repository does, what it produces and consumes, and who it is for.
Prefer terms from these vocabularies:
- capabilities: {capabilities}
- artifacts (for producesArtifacts and consumesArtifacts): {artifacts}
- domains: {domains}
- roles: {roles}

Set confidence (0.0 to 1.0) to how well the material supports the profile. If you only
have directory names, keep it low."#,
        name = repo.name,
        repo_id = repo.repo_id,
        capabilities = CAPABILITIES.join(", "),
        artifacts = ARTIFACTS.join(", "),
        domains = DOMAINS.join(", "),
        roles = ROLES.join(", "),
    )
}

fn profile_schema() -> Value {
    let string_list = json!({ "type": "array", "items": { "type": "string" } });
    json!({
        "type": "object",
        "properties": {
            "purpose": { "type": "string" },
            "capabilities": string_list,
            "producesArtifacts": string_list,
            "consumesArtifacts": string_list,
            "domains": string_list,
            "roles": string_list,
            "keywords": string_list,
            "problemsSolved": string_list,
            "targetUsers": string_list,
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 }
        },
        "required": ["purpose", "capabilities", "producesArtifacts", "consumesArtifacts",
                     "domains", "roles", "confidence"]
    })
}

/// System prompt for profile extraction
const PROFILE_SYSTEM_PROMPT: &str = r#"You are an expert software architect who reads repositories and describes what they are for.

Your task is to produce a structured profile of one repository from its description, manifest and directory layout.

Guidelines:
1. Describe what the repository actually does, not what it aspires to
2. Only claim capabilities the material supports
3. List artifacts it produces and consumes as kinds, not file names
4. Use the provided vocabularies wherever a term fits
5. Lower your confidence when the material is thin

Return your analysis as valid JSON only, with no additional text or explanation."#;
