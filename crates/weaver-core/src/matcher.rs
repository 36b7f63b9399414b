//! Candidate generation
//!
//! [`Matcher`] runs the functional rule table over every ordered pair of
//! profiles; [`PhilosophicalMatcher`] does the same with the stance rules.
//! Both rank their output and keep one candidate per unordered pair (or per
//! unordered pair and type, see [`DedupScope`]).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::ontology::{FUNCTIONAL_RULES, MatchRule};
use crate::domain::philosophy::STANCE_RULES;
use crate::domain::weave::WeaveType;
use crate::domain::{
    PairCandidate, PhilosophicalMatch, PhilosophicalProfile, RelationshipCandidate, RepoProfile,
};

/// Base initial confidence of every functional candidate
const BASE_CONFIDENCE: f64 = 0.5;

/// Weight of the mean profile confidence
const PROFILE_CONFIDENCE_WEIGHT: f64 = 0.1;

/// Bonus per shared domain
const SHARED_DOMAIN_BONUS: f64 = 0.05;

/// Bonus when an analyzer meets a producer
const ANALYZER_PRODUCER_BONUS: f64 = 0.15;

/// Ceiling of pre-assessment confidence
pub const MAX_INITIAL_CONFIDENCE: f64 = 0.95;

/// What counts as the same candidate during deduplication
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupScope {
    /// One candidate per unordered pair
    #[default]
    Pair,
    /// One candidate per unordered pair and relationship type
    PairAndType,
}

impl DedupScope {
    pub fn from_allow_multiple(allow_multiple_types_per_pair: bool) -> Self {
        if allow_multiple_types_per_pair {
            Self::PairAndType
        } else {
            Self::Pair
        }
    }
}

/// Keep the highest-confidence candidate per key, then rank
///
/// Ties keep the earliest candidate. The result is sorted by confidence
/// descending, then source id, target id and type.
pub fn dedup<T: PairCandidate>(candidates: Vec<T>, scope: DedupScope) -> Vec<T> {
    let mut best: HashMap<(String, String, Option<WeaveType>), usize> = HashMap::new();
    let mut slots: Vec<Option<T>> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let (low, high) = candidate.pair_key();
        let type_key = match scope {
            DedupScope::Pair => None,
            DedupScope::PairAndType => Some(candidate.weave_type()),
        };
        let key = (low, high, type_key);

        match best.get(&key) {
            Some(&idx) => {
                let current = slots[idx].as_ref().map(|c| c.confidence()).unwrap_or(f64::MIN);
                if candidate.confidence() > current {
                    slots[idx] = Some(candidate);
                }
            }
            None => {
                best.insert(key, slots.len());
                slots.push(Some(candidate));
            }
        }
    }

    let mut survivors: Vec<T> = slots.into_iter().flatten().collect();
    survivors.sort_by(|a, b| {
        b.confidence()
            .total_cmp(&a.confidence())
            .then_with(|| a.source_id().cmp(b.source_id()))
            .then_with(|| a.target_id().cmp(b.target_id()))
            .then_with(|| a.weave_type().cmp(&b.weave_type()))
    });
    survivors
}

/// Initial confidence of a functional rule firing
pub fn initial_confidence(rule: &MatchRule, source: &RepoProfile, target: &RepoProfile) -> f64 {
    let mean_profile_confidence = (source.confidence + target.confidence) / 2.0;
    let shared_domains = source.shared_domains(target).len() as f64;

    let mut confidence = BASE_CONFIDENCE
        + PROFILE_CONFIDENCE_WEIGHT * mean_profile_confidence
        + SHARED_DOMAIN_BONUS * shared_domains
        + rule.bonus;
    if source.has_role("analyzer") && target.has_role("producer") {
        confidence += ANALYZER_PRODUCER_BONUS;
    }
    confidence.clamp(0.0, MAX_INITIAL_CONFIDENCE)
}

/// Functional candidate generator
#[derive(Debug, Clone, Copy, Default)]
pub struct Matcher {
    scope: DedupScope,
}

impl Matcher {
    pub fn new(scope: DedupScope) -> Self {
        Self { scope }
    }

    /// Number of ordered pairs evaluated for `n` profiles
    pub fn pairs_checked(n: usize) -> usize {
        n.saturating_mul(n.saturating_sub(1))
    }

    /// Every rule firing over every ordered pair, before deduplication
    pub fn raw_candidates(&self, profiles: &[Arc<RepoProfile>]) -> Vec<RelationshipCandidate> {
        let mut candidates = Vec::new();

        for source in profiles {
            for target in profiles {
                if source.repo_id == target.repo_id {
                    continue;
                }
                for rule in FUNCTIONAL_RULES {
                    let Some(firing) = (rule.evaluate)(source, target) else {
                        continue;
                    };
                    candidates.push(RelationshipCandidate {
                        source: Arc::clone(source),
                        target: Arc::clone(target),
                        weave_type: rule.weave_type,
                        rule_id: rule.id,
                        hypothesis: firing.hypothesis,
                        evidence: firing.evidence,
                        confidence: initial_confidence(rule, source, target),
                    });
                }
            }
        }

        candidates
    }

    /// Deduplicated, ranked candidates
    pub fn find_candidates(&self, profiles: &[Arc<RepoProfile>]) -> Vec<RelationshipCandidate> {
        let raw = self.raw_candidates(profiles);
        let raw_count = raw.len();
        let candidates = dedup(raw, self.scope);

        debug!(
            profiles = profiles.len(),
            raw = raw_count,
            kept = candidates.len(),
            "Functional candidates generated"
        );
        candidates
    }
}

/// Stance-alignment match generator
#[derive(Debug, Clone, Copy, Default)]
pub struct PhilosophicalMatcher {
    scope: DedupScope,
}

impl PhilosophicalMatcher {
    pub fn new(scope: DedupScope) -> Self {
        Self { scope }
    }

    /// Deduplicated, ranked stance matches
    pub fn find_matches(&self, profiles: &[Arc<PhilosophicalProfile>]) -> Vec<PhilosophicalMatch> {
        let mut matches = Vec::new();

        for source in profiles {
            for target in profiles {
                if source.repo_id == target.repo_id {
                    continue;
                }
                let mean_confidence = (source.confidence + target.confidence) / 2.0;
                for rule in STANCE_RULES {
                    let Some(firing) = (rule.evaluate)(source, target) else {
                        continue;
                    };
                    matches.push(PhilosophicalMatch {
                        source: Arc::clone(source),
                        target: Arc::clone(target),
                        match_type: rule.match_type,
                        description: firing.description,
                        confidence: (rule.base_confidence * mean_confidence).clamp(0.0, 1.0),
                        integration_hypothesis: firing.integration_hypothesis,
                    });
                }
            }
        }

        let raw_count = matches.len();
        let matches = dedup(matches, self.scope);
        debug!(
            profiles = profiles.len(),
            raw = raw_count,
            kept = matches.len(),
            "Philosophical matches generated"
        );
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::philosophy::{
        AbstractionLevel, Antagonist, CognitiveTransform, Epistemology, Temporality,
    };

    fn profile(repo_id: &str) -> RepoProfile {
        RepoProfile::new(repo_id, "")
    }

    fn drift_detector() -> RepoProfile {
        let mut p = profile("drift-detector");
        p.capabilities = vec!["analyzes".into(), "detects_drift".into()];
        p.roles = vec!["analyzer".into()];
        p.confidence = 0.8;
        p
    }

    fn component_lib() -> RepoProfile {
        let mut p = profile("component-lib");
        p.roles = vec!["producer".into()];
        p.produces_artifacts = vec!["components".into()];
        p.confidence = 0.6;
        p
    }

    fn stance(repo_id: &str, antagonist: Antagonist, confidence: f64) -> Arc<PhilosophicalProfile> {
        Arc::new(PhilosophicalProfile {
            repo_id: repo_id.to_string(),
            epistemology: Epistemology::Empirical,
            antagonist,
            cognitive_transform: CognitiveTransform::Connects,
            temporality: Temporality::Continuous,
            abstraction_level: AbstractionLevel::Component,
            stance: String::new(),
            virtue: String::new(),
            confidence,
        })
    }

    #[test]
    fn test_analyzer_producer_confidence() {
        let profiles = vec![Arc::new(drift_detector()), Arc::new(component_lib())];
        let raw = Matcher::default().raw_candidates(&profiles);

        let analyzes = raw
            .iter()
            .find(|c| c.weave_type == WeaveType::AnalyzesOutput)
            .unwrap();
        assert!(analyzes.confidence >= 0.5 + 0.15);
        assert!((analyzes.confidence - (0.5 + 0.1 * 0.7 + 0.15)).abs() < 1e-9);

        let drift = raw
            .iter()
            .find(|c| c.weave_type == WeaveType::DetectsDriftIn)
            .unwrap();
        assert!((drift.confidence - (0.5 + 0.07 + 0.15 + 0.10)).abs() < 1e-9);

        // Nothing fires from the producer toward the analyzer
        assert!(raw.iter().all(|c| c.source.repo_id == "drift-detector"));
    }

    #[test]
    fn test_confidence_clamped() {
        let mut source = drift_detector();
        let mut target = component_lib();
        source.domains = vec!["frontend".into(), "design_systems".into(), "testing".into()];
        target.domains = source.domains.clone();
        source.confidence = 1.0;
        target.confidence = 1.0;

        let rule = FUNCTIONAL_RULES.iter().find(|r| r.id == "detects_drift").unwrap();
        assert_eq!(initial_confidence(rule, &source, &target), MAX_INITIAL_CONFIDENCE);
    }

    #[test]
    fn test_dedup_keeps_max_per_unordered_pair() {
        let profiles = vec![Arc::new(drift_detector()), Arc::new(component_lib())];
        let candidates = Matcher::new(DedupScope::Pair).find_candidates(&profiles);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].weave_type, WeaveType::DetectsDriftIn);

        let raw = Matcher::default().raw_candidates(&profiles);
        let max = raw.iter().map(|c| c.confidence).fold(f64::MIN, f64::max);
        assert_eq!(candidates[0].confidence, max);
    }

    #[test]
    fn test_dedup_pair_and_type_keeps_each_type() {
        let profiles = vec![Arc::new(drift_detector()), Arc::new(component_lib())];
        let candidates = Matcher::new(DedupScope::PairAndType).find_candidates(&profiles);

        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].confidence >= candidates[1].confidence);
    }

    #[test]
    fn test_dedup_merges_both_directions() {
        let mut a = profile("a");
        a.produces_artifacts = vec!["schemas".into()];
        a.consumes_artifacts = vec!["apis".into()];
        let mut b = profile("b");
        b.produces_artifacts = vec!["apis".into()];
        b.consumes_artifacts = vec!["schemas".into()];
        let profiles = vec![Arc::new(a), Arc::new(b)];

        let raw = Matcher::default().raw_candidates(&profiles);
        assert_eq!(raw.len(), 2);
        let kept = Matcher::default().find_candidates(&profiles);
        assert_eq!(kept.len(), 1);
        // Tie on confidence keeps the first generated (a -> b)
        assert_eq!(kept[0].source.repo_id, "a");
    }

    #[test]
    fn test_ranking_is_descending() {
        let mut profiles = vec![Arc::new(drift_detector()), Arc::new(component_lib())];
        let mut weak = profile("weak-producer");
        weak.produces_artifacts = vec!["logs".into()];
        weak.confidence = 0.1;
        profiles.push(Arc::new(weak));

        let candidates = Matcher::default().find_candidates(&profiles);
        assert_eq!(candidates.len(), 2);
        assert!(candidates.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        assert_eq!(Matcher::pairs_checked(3), 6);
    }

    #[test]
    fn test_anti_entropy_match() {
        let profiles = vec![
            stance("a", Antagonist::Complexity, 0.8),
            stance("b", Antagonist::Inconsistency, 0.6),
        ];
        let matches = PhilosophicalMatcher::default().find_matches(&profiles);

        // epistemological_kin also fires (both empirical); anti-entropy ranks first
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].match_type, WeaveType::AntiEntropyAlignment);
        assert!((matches[0].confidence - 0.65 * 0.7).abs() < 1e-9);

        let all = PhilosophicalMatcher::new(DedupScope::PairAndType).find_matches(&profiles);
        assert!(all.iter().all(|m| m.match_type != WeaveType::SharedAntagonist));
        assert!(all.iter().any(|m| m.match_type == WeaveType::EpistemologicalKin));
    }

    #[test]
    fn test_vertical_alignment_beats_shared_antagonist() {
        let a = stance("a", Antagonist::Opacity, 0.9);
        let mut b = (*stance("b", Antagonist::Opacity, 0.9)).clone();
        b.abstraction_level = AbstractionLevel::Ecosystem;
        let matches = PhilosophicalMatcher::default().find_matches(&[a, Arc::new(b)]);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].match_type, WeaveType::VerticalAlignment);
        assert!((matches[0].confidence - 0.8 * 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_single_profile_yields_nothing() {
        let profiles = vec![Arc::new(drift_detector())];
        assert!(Matcher::default().find_candidates(&profiles).is_empty());
        assert_eq!(Matcher::pairs_checked(1), 0);
        assert_eq!(Matcher::pairs_checked(0), 0);
    }
}
