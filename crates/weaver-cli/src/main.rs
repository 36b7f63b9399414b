//! Weaver CLI - relationship discovery across a plexus of repositories

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use weaver_core::config::Config;
use weaver_core::discovery::{DiscoveryOptions, DiscoveryService};
use weaver_core::domain::{
    DiscoveryEvent, DiscoveryRun, DiscoveryRunRepository, Plexus, RepoRef, ScopeCatalog, Weave,
    WeaveRepository, WeaveType,
};
use weaver_core::infrastructure::{
    SqliteDiscoveryRunRepository, SqliteFragmentIndex, SqliteScopeCatalog, SqliteWeaveRepository,
};
use weaver_core::llm::LlmClient;
use weaver_core::oracle::{LlmOracle, Oracle, OracleRequest};
use weaver_core::retrieval::{Fragment, VectorIndex};
use weaver_core::storage::Database;

#[derive(Parser)]
#[command(name = "weaver")]
#[command(author, version, about = "Discover relationships between repositories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage plexuses and their repositories
    Plexus {
        #[command(subcommand)]
        action: PlexusAction,
    },

    /// Run profile-driven discovery over a plexus
    Discover {
        /// Plexus ID or name
        plexus: String,
        /// Candidates forwarded to assessment
        #[arg(long)]
        top_n: Option<usize>,
        /// Minimum assessment confidence
        #[arg(long)]
        min_confidence: Option<f64>,
        /// Minimum philosophical match confidence
        #[arg(long)]
        min_philosophical: Option<f64>,
        /// Skip the philosophical stages
        #[arg(long)]
        no_philosophical: bool,
        /// Oracle calls in flight at once
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Run embedding-driven discovery over a plexus
    EmbedDiscover {
        /// Plexus ID or name
        plexus: String,
        /// Minimum fragment similarity
        #[arg(long)]
        threshold: Option<f32>,
        /// Maximum fragment pairs per repository pair
        #[arg(long)]
        max_results: Option<usize>,
    },

    /// Manage precomputed fragment embeddings
    Fragments {
        #[command(subcommand)]
        action: FragmentAction,
    },

    /// Inspect discovery runs
    Runs {
        #[command(subcommand)]
        action: RunAction,
    },

    /// Inspect and curate weaves
    Weaves {
        #[command(subcommand)]
        action: WeaveAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum PlexusAction {
    /// Create a plexus
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List all plexuses
    List,
    /// Add a repository checkout to a plexus
    AddRepo {
        /// Plexus ID or name
        plexus: String,
        /// Repository identifier
        repo_id: String,
        /// Local checkout path
        path: PathBuf,
        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Remove a repository from a plexus
    RemoveRepo { plexus: String, repo_id: String },
    /// List the repositories of a plexus
    Repos { plexus: String },
}

#[derive(Subcommand)]
enum FragmentAction {
    /// Import fragments from a JSON file
    Import {
        /// Repository identifier
        repo_id: String,
        /// JSON array of {file_path, content, embedding}
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum RunAction {
    /// List recent runs of a plexus
    List {
        plexus: String,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show a run with its log
    Show { id: String },
}

#[derive(Subcommand)]
enum WeaveAction {
    /// List weaves of a plexus
    List {
        plexus: String,
        /// Only this weave type
        #[arg(short = 't', long = "type")]
        weave_type: Option<String>,
        /// Include dismissed weaves
        #[arg(long)]
        all: bool,
    },
    /// Show a weave with its metadata
    Show { id: String },
    /// Dismiss a weave
    Dismiss { id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Reset to defaults
    Reset,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("weaver=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let out = Output {
        format: cli.format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Config { action } => cmd_config(action, out),
        Commands::Doctor => cmd_doctor(out).await,
        Commands::Plexus { action } => {
            let (_, db) = open_database().await?;
            cmd_plexus(&db, action, out).await
        }
        Commands::Discover {
            plexus,
            top_n,
            min_confidence,
            min_philosophical,
            no_philosophical,
            concurrency,
        } => {
            let (config, db) = open_database().await?;
            let mut options = DiscoveryOptions::from_config(&config);
            if let Some(top_n) = top_n {
                options.top_n = top_n;
            }
            if let Some(min) = min_confidence {
                options.min_assessment_confidence = min;
            }
            if let Some(min) = min_philosophical {
                options.min_philosophical_confidence = min;
            }
            if no_philosophical {
                options.philosophical = false;
            }
            if let Some(n) = concurrency {
                options.max_concurrency = n;
            }
            cmd_discover(&db, &config, &plexus, options, DiscoveryKind::Profile, out).await
        }
        Commands::EmbedDiscover {
            plexus,
            threshold,
            max_results,
        } => {
            let (config, db) = open_database().await?;
            let mut options = DiscoveryOptions::from_config(&config);
            if let Some(threshold) = threshold {
                options.similarity_threshold = threshold;
            }
            if let Some(max) = max_results {
                options.max_results = max;
            }
            cmd_discover(&db, &config, &plexus, options, DiscoveryKind::Embedding, out).await
        }
        Commands::Fragments { action } => {
            let (_, db) = open_database().await?;
            cmd_fragments(&db, action, out).await
        }
        Commands::Runs { action } => {
            let (_, db) = open_database().await?;
            cmd_runs(&db, action, out).await
        }
        Commands::Weaves { action } => {
            let (_, db) = open_database().await?;
            cmd_weaves(&db, action, out).await
        }
    }
}

/// Load the config and open (and migrate) the database it points at
async fn open_database() -> anyhow::Result<(Config, Database)> {
    let config = Config::load()?;
    let path = config.database_path()?;
    let db = Database::open(&path)
        .await
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    Ok((config, db))
}

// ============================================================================
// Output
// ============================================================================

#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Human-readable line, suppressed in quiet and json modes
    fn say(&self, line: impl AsRef<str>) {
        if !self.quiet && !self.is_json() {
            println!("{}", line.as_ref());
        }
    }

    fn json<T: serde::Serialize>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn resolve_plexus(catalog: &SqliteScopeCatalog, plexus: &str) -> anyhow::Result<Plexus> {
    catalog
        .find_plexus(plexus)
        .await?
        .ok_or_else(|| weaver_core::Error::ScopeNotFound(plexus.to_string()).into())
}

async fn cmd_plexus(db: &Database, action: PlexusAction, out: Output) -> anyhow::Result<()> {
    let catalog = SqliteScopeCatalog::new(db.pool().clone());

    match action {
        PlexusAction::Create { name, description } => {
            let mut plexus = Plexus::new(&name);
            if let Some(description) = description {
                plexus = plexus.with_description(description);
            }
            catalog.create_plexus(&plexus).await?;

            if out.is_json() {
                return out.json(&plexus);
            }
            out.say(format!("Plexus created: {}", plexus.name));
            out.say(format!("  ID: {}", plexus.id));
            out.say("\nNext: weaver plexus add-repo <plexus> <repo-id> <path>");
        }
        PlexusAction::List => {
            let plexuses = catalog.list_plexuses().await?;
            if out.is_json() {
                return out.json(&plexuses);
            }
            if plexuses.is_empty() {
                out.say("No plexuses found.");
                out.say("\nCreate one with: weaver plexus create <name>");
            }
            for plexus in plexuses {
                let repos = catalog.list_repositories(&plexus.id).await?;
                println!("{}  {}  ({} repositories)", plexus.id, plexus.name, repos.len());
            }
        }
        PlexusAction::AddRepo {
            plexus,
            repo_id,
            path,
            name,
        } => {
            let plexus = resolve_plexus(&catalog, &plexus).await?;
            let path = absolute(&path)?;
            if !path.is_dir() {
                warn!(path = %path.display(), "Repository path is not a directory");
            }

            let mut repo = RepoRef::new(&repo_id).with_local_path(path);
            if let Some(name) = name {
                repo = repo.with_name(name);
            }
            catalog.add_repository(&plexus.id, &repo).await?;

            if out.is_json() {
                return out.json(&repo);
            }
            out.say(format!("Added {} to {}", repo.repo_id, plexus.name));
        }
        PlexusAction::RemoveRepo { plexus, repo_id } => {
            let plexus = resolve_plexus(&catalog, &plexus).await?;
            if !catalog.remove_repository(&plexus.id, &repo_id).await? {
                bail!("Repository '{}' is not part of {}", repo_id, plexus.name);
            }
            out.say(format!("Removed {} from {}", repo_id, plexus.name));
        }
        PlexusAction::Repos { plexus } => {
            let plexus = resolve_plexus(&catalog, &plexus).await?;
            let repos = catalog.list_repositories(&plexus.id).await?;
            if out.is_json() {
                return out.json(&repos);
            }
            if repos.is_empty() {
                out.say(format!("{} has no repositories.", plexus.name));
            }
            for repo in repos {
                let path = repo
                    .local_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}  {}  {}", repo.repo_id, repo.name, path);
            }
        }
    }
    Ok(())
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DiscoveryKind {
    Profile,
    Embedding,
}

/// Oracle stand-in when no API key is configured; every call fails
struct OfflineOracle;

#[async_trait]
impl Oracle for OfflineOracle {
    async fn invoke(&self, request: &OracleRequest) -> weaver_core::Result<Value> {
        Err(weaver_core::Error::LLMError(format!(
            "no API key configured for '{}'",
            request.name
        )))
    }
}

fn build_oracle(config: &Config, kind: DiscoveryKind) -> anyhow::Result<Arc<dyn Oracle>> {
    match config.llm.resolved_api_key()? {
        Some(key) => {
            let client = LlmClient::new(config.llm.clone(), key)?;
            Ok(Arc::new(LlmOracle::new(Arc::new(client))))
        }
        None if kind == DiscoveryKind::Embedding => Ok(Arc::new(OfflineOracle)),
        None => Err(anyhow!(
            "No API key configured. Set WEAVER_API_KEY or OPENROUTER_API_KEY."
        )),
    }
}

async fn cmd_discover(
    db: &Database,
    config: &Config,
    plexus: &str,
    options: DiscoveryOptions,
    kind: DiscoveryKind,
    out: Output,
) -> anyhow::Result<()> {
    let oracle = build_oracle(config, kind)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let service = DiscoveryService::from_database(db, oracle, config).with_events(tx);
    let progress = tokio::spawn(print_progress(rx, out));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling discovery run");
            on_interrupt.cancel();
        }
    });

    let result = match kind {
        DiscoveryKind::Profile => service.run_discovery(plexus, &options, cancel).await,
        DiscoveryKind::Embedding => {
            service
                .run_embedding_discovery(plexus, &options, cancel)
                .await
        }
    };
    drop(service);
    let _ = progress.await;

    let run = result?;
    if out.is_json() {
        return out.json(&run);
    }
    print_run_summary(&run, out);
    Ok(())
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<DiscoveryEvent>, out: Output) {
    while let Some(event) = rx.recv().await {
        match event {
            DiscoveryEvent::RunStarted { run_id, mode, .. } => {
                out.say(format!("Discovery run {} started ({})", run_id, mode.as_str()));
            }
            DiscoveryEvent::StageStarted { stage, .. } => {
                out.say(format!("  -> {}", stage));
            }
            DiscoveryEvent::WeaveSaved {
                weave_type,
                source_repo_id,
                target_repo_id,
                score,
                ..
            } => {
                out.say(format!(
                    "     + {} {} {} ({:.2})",
                    source_repo_id, weave_type, target_repo_id, score
                ));
            }
            DiscoveryEvent::WeaveSkipped {
                weave_type,
                source_repo_id,
                target_repo_id,
                ..
            } => {
                out.say(format!(
                    "     = {} {} {} (already known)",
                    source_repo_id, weave_type, target_repo_id
                ));
            }
            DiscoveryEvent::RunFinished { status, .. } => {
                info!(status = %status, "Run finished");
            }
        }
    }
}

fn print_run_summary(run: &DiscoveryRun, out: Output) {
    let c = &run.counters;
    out.say("");
    out.say(format!("Run {}: {}", run.id, run.status));
    out.say(format!("  Profiles:          {}", c.profiles));
    if c.philosophical_profiles > 0 {
        out.say(format!("  Stances:           {}", c.philosophical_profiles));
    }
    out.say(format!("  Pairs checked:     {}", c.pairs_checked));
    out.say(format!("  Candidates:        {}", c.candidates_found));
    out.say(format!("  Assessed:          {}", c.candidates_assessed));
    out.say(format!("  Weaves saved:      {}", c.weaves_saved));
    out.say(format!("  Already known:     {}", c.weaves_skipped));
    if c.oracle_failures > 0 {
        out.say(format!("  Oracle failures:   {}", c.oracle_failures));
    }
    if let Some(duration) = run.duration() {
        out.say(format!("  Duration:          {}s", duration.num_seconds()));
    }
}

#[derive(Debug, Deserialize)]
struct FragmentRecord {
    #[serde(default)]
    id: Option<String>,
    file_path: String,
    #[serde(default)]
    content: String,
    embedding: Vec<f32>,
}

async fn cmd_fragments(db: &Database, action: FragmentAction, out: Output) -> anyhow::Result<()> {
    match action {
        FragmentAction::Import { repo_id, file } => {
            let contents = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let records: Vec<FragmentRecord> = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", file.display()))?;

            let index = SqliteFragmentIndex::new(db.pool().clone());
            for record in &records {
                if record.embedding.is_empty() {
                    bail!("Fragment for {} has an empty embedding", record.file_path);
                }
                let mut fragment = Fragment::new(
                    &repo_id,
                    &record.file_path,
                    &record.content,
                    record.embedding.clone(),
                );
                if let Some(id) = &record.id {
                    fragment = fragment.with_id(id);
                }
                index.store(&fragment).await?;
            }

            if out.is_json() {
                return out.json(&serde_json::json!({ "repo_id": repo_id, "imported": records.len() }));
            }
            out.say(format!("Imported {} fragments for {}", records.len(), repo_id));
        }
    }
    Ok(())
}

async fn cmd_runs(db: &Database, action: RunAction, out: Output) -> anyhow::Result<()> {
    let runs = SqliteDiscoveryRunRepository::new(db.pool().clone());

    match action {
        RunAction::List { plexus, limit } => {
            let catalog = SqliteScopeCatalog::new(db.pool().clone());
            let plexus = resolve_plexus(&catalog, &plexus).await?;
            let list = runs.list(&plexus.id, limit).await?;
            if out.is_json() {
                return out.json(&list);
            }
            if list.is_empty() {
                out.say(format!("No runs for {}.", plexus.name));
            }
            for run in list {
                println!(
                    "{}  {}  {:<9}  {:<9}  saved={} skipped={}",
                    run.id,
                    run.started_at.format("%Y-%m-%d %H:%M"),
                    run.mode.as_str(),
                    run.status.as_str(),
                    run.counters.weaves_saved,
                    run.counters.weaves_skipped
                );
            }
        }
        RunAction::Show { id } => {
            let run = runs
                .get(&id)
                .await?
                .ok_or_else(|| weaver_core::Error::RunNotFound(id.clone()))?;
            if out.is_json() {
                return out.json(&run);
            }
            print_run_summary(&run, Output { quiet: false, ..out });
            if let Some(error) = &run.error {
                println!("  Error:             {}", error);
            }
            if !run.log.is_empty() {
                println!("\nLog:");
                for entry in &run.log {
                    println!(
                        "  {} [{:?}] {}: {}",
                        entry.timestamp.format("%H:%M:%S"),
                        entry.level,
                        entry.stage,
                        entry.message
                    );
                }
            }
        }
    }
    Ok(())
}

async fn cmd_weaves(db: &Database, action: WeaveAction, out: Output) -> anyhow::Result<()> {
    let weaves = SqliteWeaveRepository::new(db.pool().clone());

    match action {
        WeaveAction::List {
            plexus,
            weave_type,
            all,
        } => {
            let weave_type = weave_type
                .map(|t| {
                    WeaveType::parse(&t).ok_or_else(|| anyhow!("Unknown weave type '{}'", t))
                })
                .transpose()?;
            let catalog = SqliteScopeCatalog::new(db.pool().clone());
            let plexus = resolve_plexus(&catalog, &plexus).await?;

            let list = weaves.list(&plexus.id, weave_type, all).await?;
            if out.is_json() {
                return out.json(&list);
            }
            if list.is_empty() {
                out.say(format!("No weaves in {}.", plexus.name));
                out.say("\nRun discovery with: weaver discover <plexus>");
            }
            for weave in &list {
                print_weave_line(weave);
            }
        }
        WeaveAction::Show { id } => {
            let weave = weaves
                .get(&id)
                .await?
                .ok_or_else(|| weaver_core::Error::WeaveNotFound(id.clone()))?;
            if out.is_json() {
                return out.json(&weave);
            }
            print_weave_line(&weave);
            println!("  {}", weave.description);
            println!("\n{}", serde_json::to_string_pretty(&weave.metadata)?);
        }
        WeaveAction::Dismiss { id } => {
            if !weaves.dismiss(&id).await? {
                return Err(weaver_core::Error::WeaveNotFound(id).into());
            }
            out.say(format!("Dismissed weave {}", id));
        }
    }
    Ok(())
}

fn print_weave_line(weave: &Weave) {
    let status = if weave.is_active() { "" } else { " (dismissed)" };
    println!(
        "{}  {:.2}  {} {} {}: {}{}",
        weave.id,
        weave.score,
        weave.source_repo_id,
        weave.weave_type,
        weave.target_repo_id,
        weave.title,
        status
    );
}

fn cmd_config(action: ConfigAction, out: Output) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            out.say(format!("Set {} = {}", key, value));
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            if out.is_json() {
                let map: serde_json::Map<String, Value> = items
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect();
                return out.json(&map);
            }
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            out.say("Configuration reset to defaults.");
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(out: Output) -> anyhow::Result<()> {
    out.say("Weaver Health Check");
    out.say("===================");
    out.say("");

    let mut all_ok = true;

    // Check configuration
    let config = match Config::load() {
        Ok(config) => {
            out.say("[OK] Configuration: Valid");

            match config.llm.resolved_api_key() {
                Ok(Some(_)) => {
                    let redacted = config.llm.redacted_api_key()?.unwrap_or_default();
                    out.say(format!("[OK] API Key: Configured ({})", redacted));
                }
                Ok(None) => {
                    all_ok = false;
                    warn!("API Key: Not configured");
                    out.say("[!!] API Key: Not configured");
                    out.say("     Set WEAVER_API_KEY or OPENROUTER_API_KEY environment variable");
                }
                Err(e) => {
                    all_ok = false;
                    out.say(format!("[!!] API Key: Error - {}", e));
                }
            }
            Some(config)
        }
        Err(e) => {
            all_ok = false;
            out.say(format!("[!!] Configuration: Error - {}", e));
            None
        }
    };

    // Check config file location
    match Config::config_path() {
        Ok(path) if path.exists() => out.say(format!("[OK] Config file: {}", path.display())),
        Ok(path) => out.say(format!("[--] Config file: {} (using defaults)", path.display())),
        Err(e) => out.say(format!("[!!] Config file: Error - {}", e)),
    }

    // Check database
    if let Some(config) = &config {
        match Database::open(config.database_path()?).await {
            Ok(db) => match db.health_check().await {
                Ok(()) => {
                    out.say("[OK] Database: Connected");
                    out.say(format!("     Path: {}", db.path().display()));

                    match db.migration_status().await {
                        Ok(status) if status.needs_migration => out.say(format!(
                            "[!!] Database: Migrations pending (v{} -> v{})",
                            status.current_version, status.target_version
                        )),
                        Ok(status) => {
                            out.say(format!("[OK] Database: Schema v{}", status.current_version))
                        }
                        Err(e) => out.say(format!("[!!] Database: Migration check failed - {}", e)),
                    }

                    let catalog = SqliteScopeCatalog::new(db.pool().clone());
                    let plexuses = catalog.list_plexuses().await.unwrap_or_default();
                    out.say(format!("     Plexuses: {}", plexuses.len()));
                    db.close().await;
                }
                Err(e) => {
                    all_ok = false;
                    out.say(format!("[!!] Database: Health check failed - {}", e));
                }
            },
            Err(e) => {
                all_ok = false;
                out.say(format!("[!!] Database: Failed to initialize - {}", e));
            }
        }
    }

    // Summary
    out.say("");
    if all_ok {
        out.say("All checks passed!");
    } else {
        out.say("Some checks failed. See above for details.");
    }

    if out.is_json() {
        return out.json(&serde_json::json!({ "ok": all_ok }));
    }
    Ok(())
}
