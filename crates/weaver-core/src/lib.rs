//! Weaver Core Library
//!
//! This crate provides the core functionality for Weaver, including:
//! - Repository profiling through a structured-output oracle
//! - Functional and philosophical candidate matching
//! - Skeptical candidate assessment
//! - Similarity retrieval over precomputed fragment embeddings
//! - Discovery run orchestration and weave persistence (SQLite)
//! - LLM integration (OpenRouter API)

pub mod assessor;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod llm;
pub mod matcher;
pub mod oracle;
pub mod profiler;
pub mod retrieval;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::discovery::{DiscoveryOptions, DiscoveryService};
    pub use crate::domain::{
        DiscoveryEvent, DiscoveryMode, DiscoveryRun, DiscoveryRunRepository, Plexus, RepoRef,
        RunStatus, ScopeCatalog, Weave, WeaveRepository, WeaveStatus, WeaveType,
    };
    pub use crate::error::{Error, Result};
    pub use crate::oracle::{LlmOracle, Oracle, OracleRequest};
    pub use crate::storage::Database;
}
