//! Domain layer
//!
//! Contains the ontologies, profile types, and the persisted entities
//! (plexuses, discovery runs, weaves) with their repository traits.

pub mod ontology;
pub mod philosophy;
pub mod profile;
pub mod run;
pub mod scope;
pub mod weave;

pub use profile::{
    PairCandidate, PhilosophicalMatch, PhilosophicalProfile, RelationshipCandidate, RepoProfile,
};
pub use run::{
    DiscoveryEvent, DiscoveryMode, DiscoveryRun, DiscoveryRunRepository, LogLevel, RunCounters,
    RunLogEntry, RunStatus,
};
pub use scope::{Plexus, RepoRef, ScopeCatalog};
pub use weave::{InsertOutcome, Weave, WeaveCategory, WeaveRepository, WeaveStatus, WeaveType};
