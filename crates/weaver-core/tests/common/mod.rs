//! Shared fixtures for the discovery integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use weaver_core::discovery::DiscoveryService;
use weaver_core::domain::{
    InsertOutcome, Plexus, RepoRef, ScopeCatalog, Weave, WeaveRepository, WeaveType,
};
use weaver_core::infrastructure::{
    SqliteDiscoveryRunRepository, SqliteFragmentIndex, SqliteScopeCatalog, SqliteWeaveRepository,
};
use weaver_core::oracle::{Oracle, OracleRequest};
use weaver_core::profiler::RepoSource;
use weaver_core::retrieval::SimilarityRetriever;
use weaver_core::storage::Database;
use weaver_core::{Error, Result};

/// Oracle with canned replies per call name and subject
#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<HashMap<(String, String), Value>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay` before answering
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn reply(self, call: &str, subject: &str, value: Value) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert((call.to_string(), subject.to_string()), value);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn invoke(&self, request: &OracleRequest) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&(request.name.clone(), request.subject.clone()))
            .cloned();
        reply.ok_or_else(|| {
            Error::OracleFailure(request.name.clone(), format!("no reply for {}", request.subject))
        })
    }
}

/// Source that gives every repository a short description
pub struct StaticSource;

#[async_trait]
impl RepoSource for StaticSource {
    async fn description(&self, repo: &RepoRef) -> Result<Option<String>> {
        Ok(Some(format!("# {}\n\nA repository.", repo.repo_id)))
    }

    async fn manifest(&self, _repo: &RepoRef) -> Result<Option<String>> {
        Ok(None)
    }

    async fn top_level_dirs(&self, _repo: &RepoRef) -> Result<Vec<String>> {
        Ok(vec!["src".to_string()])
    }
}

/// Weave store that fails every insert after the first `allowed`
pub struct FailingWeaves {
    inner: Arc<SqliteWeaveRepository>,
    allowed: usize,
    inserts: AtomicUsize,
}

impl FailingWeaves {
    pub fn new(inner: Arc<SqliteWeaveRepository>, allowed: usize) -> Self {
        Self {
            inner,
            allowed,
            inserts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WeaveRepository for FailingWeaves {
    async fn find_active(
        &self,
        plexus_id: &str,
        repo_a: &str,
        repo_b: &str,
        weave_type: WeaveType,
    ) -> Result<Option<Weave>> {
        self.inner.find_active(plexus_id, repo_a, repo_b, weave_type).await
    }

    async fn insert(&self, weave: &Weave) -> Result<InsertOutcome> {
        if self.inserts.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            return Err(Error::Other("disk I/O error".to_string()));
        }
        self.inner.insert(weave).await
    }

    async fn get(&self, id: &str) -> Result<Option<Weave>> {
        self.inner.get(id).await
    }

    async fn list(
        &self,
        plexus_id: &str,
        weave_type: Option<WeaveType>,
        include_dismissed: bool,
    ) -> Result<Vec<Weave>> {
        self.inner.list(plexus_id, weave_type, include_dismissed).await
    }

    async fn dismiss(&self, id: &str) -> Result<bool> {
        self.inner.dismiss(id).await
    }

    async fn count_active(&self, plexus_id: &str) -> Result<usize> {
        self.inner.count_active(plexus_id).await
    }
}

pub struct Harness {
    pub db: Database,
    pub plexus: Plexus,
    pub catalog: Arc<SqliteScopeCatalog>,
    pub runs: Arc<SqliteDiscoveryRunRepository>,
    pub weaves: Arc<SqliteWeaveRepository>,
    pub fragments: Arc<SqliteFragmentIndex>,
}

impl Harness {
    /// In-memory database with one plexus holding `repo_ids`
    pub async fn new(repo_ids: &[&str]) -> Self {
        let db = Database::in_memory().await.expect("Failed to create test database");
        let pool = db.pool().clone();

        let catalog = Arc::new(SqliteScopeCatalog::new(pool.clone()));
        let plexus = Plexus::new("design-tools");
        catalog.create_plexus(&plexus).await.unwrap();
        for repo_id in repo_ids {
            catalog
                .add_repository(&plexus.id, &RepoRef::new(*repo_id))
                .await
                .unwrap();
        }

        Self {
            plexus,
            catalog,
            runs: Arc::new(SqliteDiscoveryRunRepository::new(pool.clone())),
            weaves: Arc::new(SqliteWeaveRepository::new(pool.clone())),
            fragments: Arc::new(SqliteFragmentIndex::new(pool)),
            db,
        }
    }

    pub fn service(&self, oracle: Arc<dyn Oracle>) -> DiscoveryService {
        self.service_with_weaves(oracle, self.weaves.clone())
    }

    pub fn service_with_weaves(
        &self,
        oracle: Arc<dyn Oracle>,
        weaves: Arc<dyn WeaveRepository>,
    ) -> DiscoveryService {
        DiscoveryService::new(
            self.catalog.clone(),
            self.runs.clone(),
            weaves,
            oracle,
            Arc::new(StaticSource),
            Duration::from_secs(30),
        )
        .with_retriever(SimilarityRetriever::new(self.fragments.clone()))
    }
}

pub const PROFILE: &str = "profile_extraction";
pub const STANCE: &str = "philosophical_extraction";
pub const ASSESS: &str = "candidate_assessment";

pub fn component_lib_profile() -> Value {
    json!({
        "purpose": "Shared UI component library",
        "capabilities": ["generates"],
        "producesArtifacts": ["components"],
        "consumesArtifacts": [],
        "domains": ["design_systems"],
        "roles": ["producer"],
        "confidence": 0.8
    })
}

pub fn drift_detector_profile() -> Value {
    json!({
        "purpose": "Detects drift between design tokens and component code",
        "capabilities": ["analyzes", "detects_drift"],
        "producesArtifacts": ["reports"],
        "consumesArtifacts": [],
        "domains": ["design_systems"],
        "roles": ["analyzer"],
        "confidence": 0.9
    })
}

pub fn stance(antagonist: &str, level: &str) -> Value {
    json!({
        "epistemology": "empirical",
        "antagonist": antagonist,
        "cognitiveTransform": "reveals",
        "temporality": "continuous",
        "abstractionLevel": level,
        "statement": "Consistency is observed, not assumed.",
        "virtue": "vigilance",
        "confidence": 0.9
    })
}

pub fn assessment(valid: bool, confidence: f64) -> Value {
    json!({
        "isValidOpportunity": valid,
        "title": "Drift checks for the component library",
        "description": "Run the drift detector against every component release",
        "specificIntegration": "Add a CI job in component-lib",
        "valueProposition": "Catch token drift before release",
        "confidence": confidence,
        "reasoning": "Both repositories share the design system domain"
    })
}

/// Oracle scripted for the two-repository design-system plexus
pub fn design_system_oracle(assessment_reply: Value) -> ScriptedOracle {
    ScriptedOracle::new()
        .reply(PROFILE, "component-lib", component_lib_profile())
        .reply(PROFILE, "drift-detector", drift_detector_profile())
        .reply(STANCE, "component-lib", stance("Inconsistency", "component"))
        .reply(STANCE, "drift-detector", stance("Inconsistency", "system"))
        .reply(ASSESS, "drift-detector->component-lib", assessment_reply)
}
