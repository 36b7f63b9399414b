//! Philosophical ontology
//!
//! A second taxonomy, independent of the functional one, describing the stance
//! a repository takes toward its problem: how it knows, what it fights, what it
//! does to understanding, when it acts and at which level. The stance rules
//! ("schizosophy" rules) pair repositories whose stances align.

use serde::{Deserialize, Serialize};

use super::profile::PhilosophicalProfile;
use super::weave::WeaveType;

/// How a repository comes to know things
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Epistemology {
    /// Measures and observes
    Empirical,
    /// Derives from rules and models
    Rationalist,
    /// Whatever works in practice
    Pragmatic,
    /// Builds understanding incrementally
    Constructivist,
    /// Distrusts until verified
    Skeptical,
    /// Understands through relationships between parts
    Systemic,
}

impl Epistemology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empirical => "empirical",
            Self::Rationalist => "rationalist",
            Self::Pragmatic => "pragmatic",
            Self::Constructivist => "constructivist",
            Self::Skeptical => "skeptical",
            Self::Systemic => "systemic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "empirical" => Some(Self::Empirical),
            "rationalist" => Some(Self::Rationalist),
            "pragmatic" => Some(Self::Pragmatic),
            "constructivist" => Some(Self::Constructivist),
            "skeptical" => Some(Self::Skeptical),
            "systemic" => Some(Self::Systemic),
            _ => None,
        }
    }

    pub fn all() -> &'static [Epistemology] {
        &[
            Self::Empirical,
            Self::Rationalist,
            Self::Pragmatic,
            Self::Constructivist,
            Self::Skeptical,
            Self::Systemic,
        ]
    }
}

/// The force a repository works against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Antagonist {
    Complexity,
    Inconsistency,
    Entropy,
    Opacity,
    Fragility,
    Friction,
    Ignorance,
    Isolation,
    Waste,
}

impl Antagonist {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complexity => "complexity",
            Self::Inconsistency => "inconsistency",
            Self::Entropy => "entropy",
            Self::Opacity => "opacity",
            Self::Fragility => "fragility",
            Self::Friction => "friction",
            Self::Ignorance => "ignorance",
            Self::Isolation => "isolation",
            Self::Waste => "waste",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "complexity" => Some(Self::Complexity),
            "inconsistency" => Some(Self::Inconsistency),
            "entropy" => Some(Self::Entropy),
            "opacity" => Some(Self::Opacity),
            "fragility" => Some(Self::Fragility),
            "friction" => Some(Self::Friction),
            "ignorance" => Some(Self::Ignorance),
            "isolation" => Some(Self::Isolation),
            "waste" => Some(Self::Waste),
            _ => None,
        }
    }

    pub fn all() -> &'static [Antagonist] {
        &[
            Self::Complexity,
            Self::Inconsistency,
            Self::Entropy,
            Self::Opacity,
            Self::Fragility,
            Self::Friction,
            Self::Ignorance,
            Self::Isolation,
            Self::Waste,
        ]
    }

    /// Forms of disorder
    pub fn is_entropic(&self) -> bool {
        matches!(self, Self::Complexity | Self::Inconsistency | Self::Entropy)
    }
}

/// What a repository does to understanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveTransform {
    Reveals,
    Enforces,
    Connects,
    Simplifies,
    Generates,
    Preserves,
    Translates,
}

impl CognitiveTransform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reveals => "reveals",
            Self::Enforces => "enforces",
            Self::Connects => "connects",
            Self::Simplifies => "simplifies",
            Self::Generates => "generates",
            Self::Preserves => "preserves",
            Self::Translates => "translates",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "reveals" => Some(Self::Reveals),
            "enforces" => Some(Self::Enforces),
            "connects" => Some(Self::Connects),
            "simplifies" => Some(Self::Simplifies),
            "generates" => Some(Self::Generates),
            "preserves" => Some(Self::Preserves),
            "translates" => Some(Self::Translates),
            _ => None,
        }
    }

    pub fn all() -> &'static [CognitiveTransform] {
        &[
            Self::Reveals,
            Self::Enforces,
            Self::Connects,
            Self::Simplifies,
            Self::Generates,
            Self::Preserves,
            Self::Translates,
        ]
    }
}

/// When a repository acts relative to the problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Temporality {
    Preventive,
    Reactive,
    Continuous,
    Historical,
    Predictive,
}

impl Temporality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preventive => "preventive",
            Self::Reactive => "reactive",
            Self::Continuous => "continuous",
            Self::Historical => "historical",
            Self::Predictive => "predictive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "preventive" => Some(Self::Preventive),
            "reactive" => Some(Self::Reactive),
            "continuous" => Some(Self::Continuous),
            "historical" => Some(Self::Historical),
            "predictive" => Some(Self::Predictive),
            _ => None,
        }
    }

    pub fn all() -> &'static [Temporality] {
        &[
            Self::Preventive,
            Self::Reactive,
            Self::Continuous,
            Self::Historical,
            Self::Predictive,
        ]
    }
}

/// The level a repository operates at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstractionLevel {
    Implementation,
    Component,
    System,
    Ecosystem,
    Meta,
}

impl AbstractionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Implementation => "implementation",
            Self::Component => "component",
            Self::System => "system",
            Self::Ecosystem => "ecosystem",
            Self::Meta => "meta",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "implementation" => Some(Self::Implementation),
            "component" => Some(Self::Component),
            "system" => Some(Self::System),
            "ecosystem" => Some(Self::Ecosystem),
            "meta" => Some(Self::Meta),
            _ => None,
        }
    }

    pub fn all() -> &'static [AbstractionLevel] {
        &[
            Self::Implementation,
            Self::Component,
            Self::System,
            Self::Ecosystem,
            Self::Meta,
        ]
    }
}

/// What a stance rule produced for one ordered pair
#[derive(Debug, Clone, PartialEq)]
pub struct StanceFiring {
    pub description: String,
    pub integration_hypothesis: String,
}

/// One stance-alignment rule
pub struct StanceRule {
    pub id: &'static str,
    pub match_type: WeaveType,
    /// Multiplied by the mean of the two profile confidences
    pub base_confidence: f64,
    pub evaluate: fn(&PhilosophicalProfile, &PhilosophicalProfile) -> Option<StanceFiring>,
}

/// The stance rule set
pub static STANCE_RULES: &[StanceRule] = &[
    StanceRule {
        id: "shared_antagonist",
        match_type: WeaveType::SharedAntagonist,
        base_confidence: 0.70,
        evaluate: shared_antagonist,
    },
    StanceRule {
        id: "vertical_alignment",
        match_type: WeaveType::VerticalAlignment,
        base_confidence: 0.80,
        evaluate: vertical_alignment,
    },
    StanceRule {
        id: "epistemological_kin",
        match_type: WeaveType::EpistemologicalKin,
        base_confidence: 0.60,
        evaluate: epistemological_kin,
    },
    StanceRule {
        id: "reveal_enforce_pair",
        match_type: WeaveType::RevealEnforcePair,
        base_confidence: 0.75,
        evaluate: reveal_enforce_pair,
    },
    StanceRule {
        id: "anti_entropy_alignment",
        match_type: WeaveType::AntiEntropyAlignment,
        base_confidence: 0.65,
        evaluate: anti_entropy_alignment,
    },
];

fn shared_antagonist(a: &PhilosophicalProfile, b: &PhilosophicalProfile) -> Option<StanceFiring> {
    if a.antagonist != b.antagonist {
        return None;
    }
    Some(StanceFiring {
        description: format!(
            "{} and {} both fight {}",
            a.repo_id,
            b.repo_id,
            a.antagonist.as_str()
        ),
        integration_hypothesis: format!(
            "Combine {}'s {} approach with {}'s {} approach against {}",
            a.repo_id,
            a.cognitive_transform.as_str(),
            b.repo_id,
            b.cognitive_transform.as_str(),
            a.antagonist.as_str()
        ),
    })
}

fn vertical_alignment(a: &PhilosophicalProfile, b: &PhilosophicalProfile) -> Option<StanceFiring> {
    if a.antagonist != b.antagonist || a.abstraction_level == b.abstraction_level {
        return None;
    }
    Some(StanceFiring {
        description: format!(
            "{} ({} level) and {} ({} level) oppose {} at different altitudes",
            a.repo_id,
            a.abstraction_level.as_str(),
            b.repo_id,
            b.abstraction_level.as_str(),
            a.antagonist.as_str()
        ),
        integration_hypothesis: format!(
            "Stack {} under {} so {} is addressed from {} up to {}",
            a.repo_id,
            b.repo_id,
            a.antagonist.as_str(),
            a.abstraction_level.as_str(),
            b.abstraction_level.as_str()
        ),
    })
}

fn epistemological_kin(a: &PhilosophicalProfile, b: &PhilosophicalProfile) -> Option<StanceFiring> {
    if a.epistemology != b.epistemology {
        return None;
    }
    Some(StanceFiring {
        description: format!(
            "{} and {} share a {} way of knowing",
            a.repo_id,
            b.repo_id,
            a.epistemology.as_str()
        ),
        integration_hypothesis: format!(
            "Evidence produced by {} should be directly usable by {}",
            a.repo_id, b.repo_id
        ),
    })
}

fn reveal_enforce_pair(a: &PhilosophicalProfile, b: &PhilosophicalProfile) -> Option<StanceFiring> {
    let (revealer, enforcer) = match (a.cognitive_transform, b.cognitive_transform) {
        (CognitiveTransform::Reveals, CognitiveTransform::Enforces) => (a, b),
        (CognitiveTransform::Enforces, CognitiveTransform::Reveals) => (b, a),
        _ => return None,
    };
    Some(StanceFiring {
        description: format!(
            "{} reveals what {} can enforce",
            revealer.repo_id, enforcer.repo_id
        ),
        integration_hypothesis: format!(
            "Turn findings from {} into rules enforced by {}",
            revealer.repo_id, enforcer.repo_id
        ),
    })
}

fn anti_entropy_alignment(
    a: &PhilosophicalProfile,
    b: &PhilosophicalProfile,
) -> Option<StanceFiring> {
    if !a.antagonist.is_entropic() || !b.antagonist.is_entropic() || a.antagonist == b.antagonist {
        return None;
    }
    Some(StanceFiring {
        description: format!(
            "{} fights {} while {} fights {}: two fronts against disorder",
            a.repo_id,
            a.antagonist.as_str(),
            b.repo_id,
            b.antagonist.as_str()
        ),
        integration_hypothesis: format!(
            "Use {} and {} together to hold back disorder on both fronts",
            a.repo_id, b.repo_id
        ),
    })
}
