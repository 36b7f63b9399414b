//! Discovery orchestration
//!
//! A [`DiscoveryService`] drives one run at a time over a plexus:
//!
//! 1. profile every repository
//! 2. match functional candidates, dedup, rank, take the top N
//! 3. assess the top N and persist accepted candidates as weaves
//! 4. optionally derive stances, match them and persist philosophical weaves
//!
//! Oracle failures drop the unit of work and are counted on the run. Any
//! other error fails the run, is recorded on it and returned to the caller.
//! A second, embedding-driven mode groups similar fragment pairs into
//! `semantic_similarity` weaves.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::assessor::{Assessment, Assessor};
use crate::config::Config;
use crate::domain::{
    DiscoveryEvent, DiscoveryMode, DiscoveryRun, DiscoveryRunRepository, InsertOutcome,
    PhilosophicalMatch, PhilosophicalProfile, Plexus, RelationshipCandidate, RepoProfile,
    RepoRef, RunLogEntry, ScopeCatalog, Weave, WeaveRepository, WeaveType,
};
use crate::error::{Error, Result};
use crate::infrastructure::{
    SqliteDiscoveryRunRepository, SqliteFragmentIndex, SqliteProfileCache, SqliteScopeCatalog,
    SqliteWeaveRepository,
};
use crate::matcher::{DedupScope, Matcher, PhilosophicalMatcher};
use crate::oracle::Oracle;
use crate::profiler::{FsRepoSource, PhilosophicalProfiler, ProfileCache, Profiler, RepoSource};
use crate::retrieval::{FragmentMatch, SimilarityRetriever};
use crate::storage::Database;

const STAGE_INIT: &str = "init";
const STAGE_PROFILING: &str = "profiling";
const STAGE_MATCHING: &str = "matching";
const STAGE_ASSESSMENT: &str = "assessment";
const STAGE_PHILOSOPHICAL: &str = "philosophical";
const STAGE_RETRIEVAL: &str = "retrieval";

/// File pairs listed in a semantic weave's metadata
const MAX_FILE_PAIRS: usize = 10;

/// Options a run is started with; serialized onto the run record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    pub top_n: usize,
    pub min_assessment_confidence: f64,
    pub min_philosophical_confidence: f64,
    pub max_concurrency: usize,
    pub philosophical: bool,
    pub allow_multiple_types_per_pair: bool,
    pub similarity_threshold: f32,
    pub max_results: usize,
    pub neighbors_per_fragment: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl DiscoveryOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_n: config.discovery.top_n,
            min_assessment_confidence: config.discovery.min_assessment_confidence,
            min_philosophical_confidence: config.discovery.min_philosophical_confidence,
            max_concurrency: config.discovery.max_concurrency,
            philosophical: config.discovery.philosophical,
            allow_multiple_types_per_pair: config.discovery.allow_multiple_types_per_pair,
            similarity_threshold: config.retrieval.similarity_threshold,
            max_results: config.retrieval.max_results,
            neighbors_per_fragment: config.retrieval.neighbors_per_fragment,
        }
    }

    pub fn dedup_scope(&self) -> DedupScope {
        DedupScope::from_allow_multiple(self.allow_multiple_types_per_pair)
    }

    /// Oracle calls in flight at once, at least 1
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }
}

/// Runs discovery over a plexus and persists the resulting weaves
pub struct DiscoveryService {
    catalog: Arc<dyn ScopeCatalog>,
    runs: Arc<dyn DiscoveryRunRepository>,
    weaves: Arc<dyn WeaveRepository>,
    profiler: Profiler,
    philosophical: PhilosophicalProfiler,
    assessor: Assessor,
    retriever: Option<SimilarityRetriever>,
    events: Option<UnboundedSender<DiscoveryEvent>>,
}

impl DiscoveryService {
    pub fn new(
        catalog: Arc<dyn ScopeCatalog>,
        runs: Arc<dyn DiscoveryRunRepository>,
        weaves: Arc<dyn WeaveRepository>,
        oracle: Arc<dyn Oracle>,
        source: Arc<dyn RepoSource>,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            runs,
            weaves,
            profiler: Profiler::new(Arc::clone(&oracle), source, oracle_timeout),
            philosophical: PhilosophicalProfiler::new(Arc::clone(&oracle), oracle_timeout),
            assessor: Assessor::new(oracle, oracle_timeout),
            retriever: None,
            events: None,
        }
    }

    /// Wire the SQLite stores of `db` and the local filesystem source
    pub fn from_database(db: &Database, oracle: Arc<dyn Oracle>, config: &Config) -> Self {
        let pool = db.pool().clone();
        let mut service = Self::new(
            Arc::new(SqliteScopeCatalog::new(pool.clone())),
            Arc::new(SqliteDiscoveryRunRepository::new(pool.clone())),
            Arc::new(SqliteWeaveRepository::new(pool.clone())),
            oracle,
            Arc::new(FsRepoSource::new()),
            Duration::from_secs(config.llm.timeout_secs),
        )
        .with_retriever(SimilarityRetriever::new(Arc::new(SqliteFragmentIndex::new(
            pool.clone(),
        ))));

        if config.discovery.use_profile_cache {
            service = service.with_profile_cache(Arc::new(SqliteProfileCache::new(pool)));
        }
        service
    }

    pub fn with_profile_cache(mut self, cache: Arc<dyn ProfileCache>) -> Self {
        self.profiler = self.profiler.with_cache(cache);
        self
    }

    pub fn with_retriever(mut self, retriever: SimilarityRetriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Send progress events to `events`; a closed receiver is ignored
    pub fn with_events(mut self, events: UnboundedSender<DiscoveryEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Profile-driven discovery over a plexus (by id or name)
    pub async fn run_discovery(
        &self,
        plexus: &str,
        options: &DiscoveryOptions,
        cancel: CancellationToken,
    ) -> Result<DiscoveryRun> {
        let (plexus, repos, mut run) = self
            .start_run(plexus, DiscoveryMode::Profile, options)
            .await?;

        let result = self
            .profile_pipeline(&mut run, &plexus, &repos, options, &cancel)
            .await;
        self.finish(run, result).await
    }

    /// Embedding-driven discovery over a plexus (by id or name)
    pub async fn run_embedding_discovery(
        &self,
        plexus: &str,
        options: &DiscoveryOptions,
        cancel: CancellationToken,
    ) -> Result<DiscoveryRun> {
        let retriever = self
            .retriever
            .clone()
            .ok_or_else(|| Error::RunInitialization("no fragment index configured".to_string()))?
            .with_neighbors(options.neighbors_per_fragment);

        let (plexus, repos, mut run) = self
            .start_run(plexus, DiscoveryMode::Embedding, options)
            .await?;

        let result = self
            .embedding_pipeline(&mut run, &plexus, &repos, &retriever, options, &cancel)
            .await;
        self.finish(run, result).await
    }

    // ========== Run lifecycle ==========

    async fn start_run(
        &self,
        plexus: &str,
        mode: DiscoveryMode,
        options: &DiscoveryOptions,
    ) -> Result<(Plexus, Vec<RepoRef>, DiscoveryRun)> {
        let plexus = self
            .catalog
            .find_plexus(plexus)
            .await
            .map_err(|e| Error::RunInitialization(format!("failed to load plexus: {}", e)))?
            .ok_or_else(|| Error::ScopeNotFound(plexus.to_string()))?;

        let repos = self
            .catalog
            .list_repositories(&plexus.id)
            .await
            .map_err(|e| Error::RunInitialization(format!("failed to load repositories: {}", e)))?;

        let run = DiscoveryRun::new(&plexus.id, mode, serde_json::to_value(options)?);
        self.runs
            .create(&run)
            .await
            .map_err(|e| Error::RunInitialization(format!("failed to create run: {}", e)))?;

        info!(
            run_id = %run.id,
            plexus = %plexus.name,
            mode = mode.as_str(),
            repositories = repos.len(),
            "Discovery run started"
        );
        self.emit(DiscoveryEvent::RunStarted {
            run_id: run.id.clone(),
            plexus_id: plexus.id.clone(),
            mode,
            timestamp: chrono::Utc::now(),
        });

        Ok((plexus, repos, run))
    }

    async fn finish(&self, mut run: DiscoveryRun, result: Result<()>) -> Result<DiscoveryRun> {
        let outcome = match result {
            Ok(()) => {
                run.complete();
                Ok(())
            }
            Err(Error::Cancelled) => {
                run.fail("cancelled");
                Err(Error::Cancelled)
            }
            Err(e) => {
                let stage = run.current_stage.as_deref().unwrap_or(STAGE_INIT);
                let entry = RunLogEntry::error(stage, "Run failed")
                    .with_data(json!({ "error": e.to_string() }));
                if let Err(log_err) = self.runs.append_log(&run.id, &entry).await {
                    warn!(run_id = %run.id, error = %log_err, "Failed to log run failure");
                }
                run.log.push(entry);
                run.fail(e.to_string());
                Err(e)
            }
        };

        if let Err(e) = self.runs.finalize(&run).await {
            error!(run_id = %run.id, error = %e, "Failed to finalize discovery run");
            if outcome.is_ok() {
                return Err(e);
            }
        }

        self.emit(DiscoveryEvent::RunFinished {
            run_id: run.id.clone(),
            status: run.status,
            counters: run.counters.clone(),
            timestamp: chrono::Utc::now(),
        });

        match outcome {
            Ok(()) => {
                info!(
                    run_id = %run.id,
                    weaves_saved = run.counters.weaves_saved,
                    weaves_skipped = run.counters.weaves_skipped,
                    oracle_failures = run.counters.oracle_failures,
                    "Discovery run completed"
                );
                Ok(run)
            }
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "Discovery run failed");
                Err(e)
            }
        }
    }

    // ========== Profile-driven pipeline ==========

    async fn profile_pipeline(
        &self,
        run: &mut DiscoveryRun,
        plexus: &Plexus,
        repos: &[RepoRef],
        options: &DiscoveryOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if repos.len() < 2 {
            return self
                .log(
                    run,
                    RunLogEntry::info(
                        STAGE_INIT,
                        format!("Plexus has {} repositories, nothing to match", repos.len()),
                    ),
                )
                .await;
        }

        let profiles = self.profile_repositories(run, repos, options, cancel).await?;
        if profiles.len() < 2 {
            return self
                .log(
                    run,
                    RunLogEntry::info(
                        STAGE_PROFILING,
                        format!("Only {} repositories profiled, nothing to match", profiles.len()),
                    ),
                )
                .await;
        }

        check_cancelled(cancel)?;
        self.stage(run, STAGE_MATCHING);
        let mut candidates = Matcher::new(options.dedup_scope()).find_candidates(&profiles);
        run.counters.pairs_checked = Matcher::pairs_checked(profiles.len());
        run.counters.candidates_found = candidates.len();
        candidates.truncate(options.top_n);
        self.save_counters(run).await?;
        self.log(
            run,
            RunLogEntry::info(STAGE_MATCHING, "Functional candidates ranked").with_data(json!({
                "pairs_checked": run.counters.pairs_checked,
                "candidates_found": run.counters.candidates_found,
                "assessing": candidates.len(),
            })),
        )
        .await?;

        self.assess_candidates(run, plexus, &candidates, options, cancel)
            .await?;

        if options.philosophical {
            check_cancelled(cancel)?;
            self.philosophical_stage(run, plexus, &profiles, options, cancel)
                .await?;
        }

        Ok(())
    }

    async fn profile_repositories(
        &self,
        run: &mut DiscoveryRun,
        repos: &[RepoRef],
        options: &DiscoveryOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<RepoProfile>>> {
        self.stage(run, STAGE_PROFILING);
        let profiler = &self.profiler;

        let results = stream::iter(repos)
            .map(|repo| async move { (repo, until_cancelled(cancel, profiler.profile(repo)).await) })
            .buffered(options.concurrency());
        tokio::pin!(results);

        let mut profiles = Vec::with_capacity(repos.len());
        while let Some((repo, result)) = results.next().await {
            match result {
                Ok(profile) => {
                    run.counters.profiles += 1;
                    profiles.push(Arc::new(profile));
                }
                Err(e) if e.is_oracle_failure() => {
                    self.oracle_failure(run, STAGE_PROFILING, &repo.repo_id, &e)
                        .await?;
                }
                Err(e) => return Err(e),
            }
            self.save_counters(run).await?;
        }

        Ok(profiles)
    }

    async fn assess_candidates(
        &self,
        run: &mut DiscoveryRun,
        plexus: &Plexus,
        candidates: &[RelationshipCandidate],
        options: &DiscoveryOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.stage(run, STAGE_ASSESSMENT);
        let assessor = &self.assessor;
        let min_confidence = options.min_assessment_confidence;

        let results = stream::iter(candidates)
            .map(|candidate| async move {
                let result =
                    until_cancelled(cancel, assessor.evaluate(candidate, min_confidence)).await;
                (candidate, result)
            })
            .buffered(options.concurrency());
        tokio::pin!(results);

        while let Some((candidate, result)) = results.next().await {
            match result {
                Ok(Some(assessment)) => {
                    run.counters.candidates_assessed += 1;
                    let weave = functional_weave(&plexus.id, &run.id, candidate, &assessment);
                    self.persist(run, weave).await?;
                }
                Ok(None) => {
                    run.counters.candidates_assessed += 1;
                    debug!(
                        source = %candidate.source.repo_id,
                        target = %candidate.target.repo_id,
                        weave_type = %candidate.weave_type,
                        "Candidate rejected"
                    );
                }
                Err(e) if e.is_oracle_failure() => {
                    let subject =
                        format!("{}->{}", candidate.source.repo_id, candidate.target.repo_id);
                    self.oracle_failure(run, STAGE_ASSESSMENT, &subject, &e)
                        .await?;
                }
                Err(e) => return Err(e),
            }
            self.save_counters(run).await?;
        }

        Ok(())
    }

    async fn philosophical_stage(
        &self,
        run: &mut DiscoveryRun,
        plexus: &Plexus,
        profiles: &[Arc<RepoProfile>],
        options: &DiscoveryOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.stage(run, STAGE_PHILOSOPHICAL);
        let profiler = &self.philosophical;

        let results = stream::iter(profiles)
            .map(|profile| async move {
                (profile, until_cancelled(cancel, profiler.profile(profile)).await)
            })
            .buffered(options.concurrency());
        tokio::pin!(results);

        let mut stances: Vec<Arc<PhilosophicalProfile>> = Vec::with_capacity(profiles.len());
        while let Some((profile, result)) = results.next().await {
            match result {
                Ok(stance) => {
                    run.counters.philosophical_profiles += 1;
                    stances.push(Arc::new(stance));
                }
                Err(e) if e.is_oracle_failure() => {
                    self.oracle_failure(run, STAGE_PHILOSOPHICAL, &profile.repo_id, &e)
                        .await?;
                }
                Err(e) => return Err(e),
            }
            self.save_counters(run).await?;
        }

        if stances.len() < 2 {
            return self
                .log(
                    run,
                    RunLogEntry::info(
                        STAGE_PHILOSOPHICAL,
                        format!("Only {} stances derived, nothing to match", stances.len()),
                    ),
                )
                .await;
        }

        let matches: Vec<PhilosophicalMatch> = PhilosophicalMatcher::new(options.dedup_scope())
            .find_matches(&stances)
            .into_iter()
            .filter(|m| m.confidence >= options.min_philosophical_confidence)
            .collect();
        run.counters.matches_found = matches.len();
        self.save_counters(run).await?;

        for m in &matches {
            check_cancelled(cancel)?;
            let weave = philosophical_weave(&plexus.id, &run.id, m);
            self.persist(run, weave).await?;
        }

        Ok(())
    }

    // ========== Embedding-driven pipeline ==========

    async fn embedding_pipeline(
        &self,
        run: &mut DiscoveryRun,
        plexus: &Plexus,
        repos: &[RepoRef],
        retriever: &SimilarityRetriever,
        options: &DiscoveryOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.stage(run, STAGE_RETRIEVAL);

        let repo_ids: Vec<String> = repos.iter().map(|r| r.repo_id.clone()).collect();
        let embedded = retriever.index().repos_with_embeddings(&repo_ids).await?;
        if embedded.len() < 2 {
            return self
                .log(
                    run,
                    RunLogEntry::info(
                        STAGE_RETRIEVAL,
                        format!("Only {} repositories have embeddings, nothing to match", embedded.len()),
                    ),
                )
                .await;
        }

        for (i, source) in embedded.iter().enumerate() {
            for target in &embedded[i + 1..] {
                check_cancelled(cancel)?;

                let matches = retriever
                    .find_similar(source, target, options.similarity_threshold, options.max_results)
                    .await?;
                run.counters.pairs_checked += 1;

                if matches.is_empty() {
                    let near_miss = retriever.best_matches(source, target).await?;
                    let data = match near_miss.first() {
                        Some(best) => json!({
                            "source_repo_id": source,
                            "target_repo_id": target,
                            "best_similarity": best.similarity,
                            "source_file": best.source.file_path,
                            "target_file": best.target.file_path,
                        }),
                        None => json!({ "source_repo_id": source, "target_repo_id": target }),
                    };
                    self.log(
                        run,
                        RunLogEntry::info(STAGE_RETRIEVAL, "No fragment pairs above threshold")
                            .with_data(data),
                    )
                    .await?;
                } else {
                    run.counters.candidates_found += 1;
                    let weave = semantic_weave(
                        &plexus.id,
                        &run.id,
                        source,
                        target,
                        &matches,
                        options.similarity_threshold,
                    );
                    self.persist(run, weave).await?;
                }

                self.save_counters(run).await?;
            }
        }

        Ok(())
    }

    // ========== Bookkeeping ==========

    fn emit(&self, event: DiscoveryEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn stage(&self, run: &mut DiscoveryRun, stage: &str) {
        run.current_stage = Some(stage.to_string());
        info!(run_id = %run.id, stage = %stage, "Stage started");
        self.emit(DiscoveryEvent::StageStarted {
            run_id: run.id.clone(),
            stage: stage.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    async fn log(&self, run: &mut DiscoveryRun, entry: RunLogEntry) -> Result<()> {
        self.runs.append_log(&run.id, &entry).await?;
        run.log.push(entry);
        Ok(())
    }

    async fn save_counters(&self, run: &DiscoveryRun) -> Result<()> {
        self.runs.update_counters(&run.id, &run.counters).await
    }

    async fn oracle_failure(
        &self,
        run: &mut DiscoveryRun,
        stage: &str,
        subject: &str,
        err: &Error,
    ) -> Result<()> {
        run.counters.oracle_failures += 1;
        warn!(run_id = %run.id, stage = %stage, subject = %subject, error = %err, "Oracle call failed");
        self.log(
            run,
            RunLogEntry::warn(stage, "Oracle call failed")
                .with_data(json!({ "subject": subject, "error": err.to_string() })),
        )
        .await
    }

    /// Persist a weave unless an active one covers its pair and type
    async fn persist(&self, run: &mut DiscoveryRun, weave: Weave) -> Result<()> {
        let existing = self
            .weaves
            .find_active(
                &weave.plexus_id,
                &weave.source_repo_id,
                &weave.target_repo_id,
                weave.weave_type,
            )
            .await?;

        let outcome = match existing {
            Some(existing) => {
                debug!(existing = %existing.id, weave_type = %weave.weave_type, "Active weave exists");
                InsertOutcome::Duplicate
            }
            None => self.weaves.insert(&weave).await?,
        };

        match outcome {
            InsertOutcome::Inserted => {
                run.counters.weaves_saved += 1;
                info!(
                    run_id = %run.id,
                    weave_type = %weave.weave_type,
                    source = %weave.source_repo_id,
                    target = %weave.target_repo_id,
                    score = weave.score,
                    "Weave saved"
                );
                self.emit(DiscoveryEvent::WeaveSaved {
                    run_id: run.id.clone(),
                    weave_id: weave.id.clone(),
                    weave_type: weave.weave_type,
                    source_repo_id: weave.source_repo_id.clone(),
                    target_repo_id: weave.target_repo_id.clone(),
                    score: weave.score,
                    timestamp: chrono::Utc::now(),
                });
            }
            InsertOutcome::Duplicate => {
                run.counters.weaves_skipped += 1;
                self.emit(DiscoveryEvent::WeaveSkipped {
                    run_id: run.id.clone(),
                    weave_type: weave.weave_type,
                    source_repo_id: weave.source_repo_id.clone(),
                    target_repo_id: weave.target_repo_id.clone(),
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        self.save_counters(run).await
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

async fn until_cancelled<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = work => result,
    }
}

// ========== Weave construction ==========

fn functional_weave(
    plexus_id: &str,
    run_id: &str,
    candidate: &RelationshipCandidate,
    assessment: &Assessment,
) -> Weave {
    Weave::new(
        plexus_id,
        &candidate.source.repo_id,
        &candidate.target.repo_id,
        candidate.weave_type,
        &assessment.title,
        &assessment.description,
    )
    .with_score(assessment.confidence)
    .with_run_id(run_id)
    .with_metadata(json!({
        "rule_id": candidate.rule_id,
        "matched_evidence": candidate.evidence,
        "hypothesis": candidate.hypothesis,
        "initial_confidence": candidate.confidence,
        "source_excerpts": candidate.source.excerpts,
        "target_excerpts": candidate.target.excerpts,
        "source_capabilities": candidate.source.capabilities,
        "target_capabilities": candidate.target.capabilities,
        "assessment": {
            "reasoning": assessment.reasoning,
            "specific_integration": assessment.specific_integration,
            "value_proposition": assessment.value_proposition,
            "confidence": assessment.confidence,
        },
        "run_id": run_id,
    }))
}

fn humanize(weave_type: WeaveType) -> String {
    weave_type.as_str().replace('_', " ")
}

fn philosophical_weave(plexus_id: &str, run_id: &str, m: &PhilosophicalMatch) -> Weave {
    let title = format!(
        "{} and {}: {}",
        m.source.repo_id,
        m.target.repo_id,
        humanize(m.match_type)
    );

    Weave::new(
        plexus_id,
        &m.source.repo_id,
        &m.target.repo_id,
        m.match_type,
        title,
        &m.description,
    )
    .with_score(m.confidence)
    .with_run_id(run_id)
    .with_metadata(json!({
        "match_type": m.match_type.as_str(),
        "integration_hypothesis": m.integration_hypothesis,
        "source_stance": m.source.stance,
        "target_stance": m.target.stance,
        "source_virtue": m.source.virtue,
        "target_virtue": m.target.virtue,
        "dimensions": {
            "source": m.source.dimensions(),
            "target": m.target.dimensions(),
        },
        "run_id": run_id,
    }))
}

/// Similarity statistics for one (source file, target file) group
#[derive(Debug, Clone, PartialEq)]
struct FilePairGroup {
    source_file: String,
    target_file: String,
    fragment_count: usize,
    max_similarity: f32,
    mean_similarity: f32,
}

/// Group fragment matches by file pair, best group first
fn group_by_file_pair(matches: &[FragmentMatch]) -> Vec<FilePairGroup> {
    let mut groups: BTreeMap<(&str, &str), Vec<f32>> = BTreeMap::new();
    for m in matches {
        groups
            .entry((m.source.file_path.as_str(), m.target.file_path.as_str()))
            .or_default()
            .push(m.similarity);
    }

    let mut groups: Vec<FilePairGroup> = groups
        .into_iter()
        .map(|((source_file, target_file), similarities)| {
            let max_similarity = similarities.iter().copied().fold(f32::MIN, f32::max);
            let mean_similarity = similarities.iter().sum::<f32>() / similarities.len() as f32;
            FilePairGroup {
                source_file: source_file.to_string(),
                target_file: target_file.to_string(),
                fragment_count: similarities.len(),
                max_similarity,
                mean_similarity,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        b.max_similarity
            .total_cmp(&a.max_similarity)
            .then_with(|| b.fragment_count.cmp(&a.fragment_count))
    });
    groups
}

fn semantic_weave(
    plexus_id: &str,
    run_id: &str,
    source: &str,
    target: &str,
    matches: &[FragmentMatch],
    threshold: f32,
) -> Weave {
    let groups = group_by_file_pair(matches);
    let score = groups
        .first()
        .map(|g| f64::from(g.max_similarity))
        .unwrap_or(0.0);

    let description = match groups.first() {
        Some(best) => format!(
            "{} fragment pairs across {} file pairs exceed similarity {:.2}; closest: {} ~ {}",
            matches.len(),
            groups.len(),
            threshold,
            best.source_file,
            best.target_file
        ),
        None => format!("No fragment pairs exceed similarity {:.2}", threshold),
    };

    let file_pairs: Vec<Value> = groups
        .iter()
        .take(MAX_FILE_PAIRS)
        .map(|g| {
            json!({
                "source_file": g.source_file,
                "target_file": g.target_file,
                "fragment_count": g.fragment_count,
                "max_similarity": g.max_similarity,
                "mean_similarity": g.mean_similarity,
            })
        })
        .collect();

    Weave::new(
        plexus_id,
        source,
        target,
        WeaveType::SemanticSimilarity,
        format!("{} and {} share similar content", source, target),
        description,
    )
    .with_score(score)
    .with_run_id(run_id)
    .with_metadata(json!({
        "file_pairs": file_pairs,
        "threshold": threshold,
        "fragment_matches": matches.len(),
        "run_id": run_id,
    }))
}
