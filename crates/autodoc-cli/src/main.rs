//! autodoc - turn repository changes into documentation updates
//!
//! ## Commands
//!
//! - `run`: load, analyze, decide, generate and save for one change
//! - `analyze`: dry run that stops after the decision
//! - `webhook`: derive changes from a webhook payload and run them concurrently
//! - `config check`: validate configuration and print the effective values

use anyhow::{bail, Context, Result};
use autodoc_core::{
    init_tracing, requests_from_webhook, ChangeAnalyzer, ChangeLoader, ChangeRequest,
    ChangeSignal, Credential, Decision, DiffSource, DocumentDecider, FileDiffSource, Orchestrator,
    PipelineConfig, ProviderRegistry, RunReport, RunStage, TelemetryOptions,
};
use autodoc_providers::github::GITHUB_API_BASE;
use autodoc_providers::{registry_from_config, GitHubDiffSource};
use autodoc_state::{DocumentStore, FsDocumentStore, JsonlRunArchive, RunArchive};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "autodoc")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Turn repository changes into documentation updates", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON reports
    #[arg(long, global = true)]
    json: bool,

    /// Pipeline configuration file (TOML)
    #[arg(short, long, global = true, env = "AUTODOC_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Commands,
}

/// Command-line values that take precedence over the configuration file.
#[derive(Args, Debug, Default)]
struct ConfigOverrides {
    /// LLM provider (`primary` or `fast`)
    #[arg(long, global = true, env = "AUTODOC_PROVIDER")]
    provider: Option<String>,

    /// Relevance threshold in [0, 1]
    #[arg(long, global = true)]
    threshold: Option<f64>,

    /// Retries per stage for transient failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Timeout for each stage attempt, in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Document to update, relative to the output directory
    #[arg(long, global = true)]
    target: Option<String>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(provider) = &self.provider {
            config.llm_provider = provider.clone();
        }
        if let Some(threshold) = self.threshold {
            config.relevance_threshold = threshold;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(secs) = self.timeout_secs {
            config.per_stage_timeout_secs = secs;
        }
        if let Some(target) = &self.target {
            config.target_document = target.clone();
        }
    }
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Access token forwarded to the source-control API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Source-control API base URL
    #[arg(long, env = "AUTODOC_GITHUB_API", default_value = GITHUB_API_BASE)]
    github_api: String,
}

impl SourceArgs {
    fn credential(&self) -> Credential {
        match self.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Credential::new(token),
            _ => Credential::anonymous(),
        }
    }
}

#[derive(Args, Debug)]
struct ChangeArgs {
    /// Repository as OWNER/NAME
    #[arg(long)]
    repo: String,

    /// Commit SHA to document
    #[arg(long, conflicts_with = "pr", required_unless_present = "pr")]
    commit: Option<String>,

    /// Pull request number to document
    #[arg(long)]
    pr: Option<u64>,

    /// Only consider changed files matching this glob
    #[arg(long)]
    path_filter: Option<String>,

    /// Read the unified diff from a file instead of the API
    #[arg(long)]
    diff_file: Option<PathBuf>,

    #[command(flatten)]
    source: SourceArgs,
}

impl ChangeArgs {
    fn request(&self) -> Result<ChangeRequest> {
        let credential = self.source.credential();
        let request = match (&self.commit, self.pr) {
            (Some(sha), _) => ChangeRequest::commit(&self.repo, sha, credential),
            (None, Some(n)) => ChangeRequest::pull_request(&self.repo, n, credential),
            (None, None) => bail!("either --commit or --pr is required"),
        };
        Ok(match &self.path_filter {
            Some(filter) => request.with_path_filter(filter),
            None => request,
        })
    }

    fn diff_source(&self) -> Result<Arc<dyn DiffSource>> {
        match &self.diff_file {
            Some(path) => Ok(Arc::new(FileDiffSource::new(path))),
            None => github_source(&self.source),
        }
    }
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Directory the target document is written under
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Append finished runs to this JSON-lines file
    #[arg(long)]
    archive: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline for one commit or pull request
    Run {
        #[command(flatten)]
        change: ChangeArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Load, analyze and decide without generating anything
    Analyze {
        #[command(flatten)]
        change: ChangeArgs,
    },

    /// Run every change described by a webhook delivery
    Webhook {
        /// Event name, as sent in the X-GitHub-Event header
        #[arg(long)]
        event: String,

        /// Path to the JSON payload
        #[arg(long)]
        payload: PathBuf,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Validate configuration and print the effective values
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&TelemetryOptions::from_flags(cli.json, cli.verbose));

    let config = load_config(cli.config.as_deref(), &cli.overrides)?;

    match cli.command {
        Commands::Run { change, output } => {
            let registry =
                registry_from_config(&config).context("Failed to set up LLM providers")?;
            let report = cmd_run(config, &change, &output, registry, cli.json).await?;
            ensure_succeeded(std::slice::from_ref(&report))
        }
        Commands::Analyze { change } => cmd_analyze(&config, &change, cli.json).await.map(|_| ()),
        Commands::Webhook {
            event,
            payload,
            source,
            output,
        } => {
            let registry =
                registry_from_config(&config).context("Failed to set up LLM providers")?;
            let reports =
                cmd_webhook(config, &event, &payload, &source, &output, registry, cli.json)
                    .await?;
            ensure_succeeded(&reports)
        }
        Commands::Config {
            action: ConfigAction::Check,
        } => cmd_config_check(&config, cli.json),
    }
}

/// File values (or defaults), then command-line overrides, then validation.
fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn github_source(source: &SourceArgs) -> Result<Arc<dyn DiffSource>> {
    let github = GitHubDiffSource::with_base_url(&source.github_api)
        .context("Failed to create GitHub client")?;
    Ok(Arc::new(github))
}

fn build_orchestrator(
    config: PipelineConfig,
    source: Arc<dyn DiffSource>,
    registry: ProviderRegistry,
    output: &OutputArgs,
) -> Result<Orchestrator> {
    let store: Arc<dyn DocumentStore> = Arc::new(
        FsDocumentStore::new(&output.output_dir).with_context(|| {
            format!("Failed to open output directory {}", output.output_dir.display())
        })?,
    );

    let mut builder = Orchestrator::builder(config)
        .diff_source(source)
        .registry(registry)
        .document_store(store);

    if let Some(path) = &output.archive {
        let archive: Arc<dyn RunArchive> = Arc::new(
            JsonlRunArchive::new(path)
                .with_context(|| format!("Failed to open run archive {}", path.display()))?,
        );
        builder = builder.run_archive(archive);
    }

    builder.build().context("Failed to build pipeline")
}

async fn cmd_run(
    config: PipelineConfig,
    change: &ChangeArgs,
    output: &OutputArgs,
    registry: ProviderRegistry,
    json: bool,
) -> Result<RunReport> {
    let orchestrator = build_orchestrator(config, change.diff_source()?, registry, output)?;
    let run = orchestrator.run(change.request()?).await;
    let report = run.report();
    print_report(&report, json)?;
    Ok(report)
}

#[derive(Debug, Serialize)]
struct AnalysisReport {
    repository: String,
    reference: String,
    files_changed: usize,
    signal: ChangeSignal,
    decision: Decision,
}

async fn cmd_analyze(
    config: &PipelineConfig,
    change: &ChangeArgs,
    json: bool,
) -> Result<AnalysisReport> {
    let request = change.request()?;
    let loader = ChangeLoader::new(change.diff_source()?);
    let change_set = loader
        .load(&request)
        .await
        .with_context(|| format!("Failed to load {request}"))?;

    let analyzer = ChangeAnalyzer::from_config(config).context("Failed to build analyzer")?;
    let signal = analyzer.analyze(&change_set);
    let decision = DocumentDecider::new(config.relevance_threshold).decide(&signal);

    let report = AnalysisReport {
        repository: request.repository().to_string(),
        reference: request.reference().to_string(),
        files_changed: change_set.len(),
        signal,
        decision,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("change     {} {}", report.repository, report.reference);
        println!("files      {}", report.files_changed);
        println!("relevance  {:.2}", report.signal.relevance);
        println!(
            "topics     {}",
            report.signal.topics.iter().cloned().collect::<Vec<_>>().join(", ")
        );
        println!("action     {}", report.decision.action);
        println!("rationale  {}", report.decision.rationale);
        if !report.signal.summary.is_empty() {
            println!();
            println!("{}", report.signal.summary);
        }
    }
    Ok(report)
}

async fn cmd_webhook(
    config: PipelineConfig,
    event: &str,
    payload: &Path,
    source: &SourceArgs,
    output: &OutputArgs,
    registry: ProviderRegistry,
    json: bool,
) -> Result<Vec<RunReport>> {
    let body = std::fs::read(payload)
        .with_context(|| format!("Failed to read payload {}", payload.display()))?;
    let requests = requests_from_webhook(event, &body, &source.credential())
        .context("Failed to interpret webhook payload")?;

    if requests.is_empty() {
        info!(event, "webhook describes no change to document");
        if json {
            println!("[]");
        }
        return Ok(Vec::new());
    }

    let orchestrator = build_orchestrator(config, github_source(source)?, registry, output)?;
    let reports: Vec<RunReport> = orchestrator
        .run_many(requests)
        .await
        .iter()
        .map(|run| run.report())
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for (i, report) in reports.iter().enumerate() {
            if i > 0 {
                println!();
            }
            print_report(report, false)?;
        }
    }
    Ok(reports)
}

fn cmd_config_check(config: &PipelineConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", config.to_toml_string()?);
        eprintln!("configuration ok");
    }
    Ok(())
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("run        {}", report.run_id);
    println!("change     {} {}", report.repository, report.reference);
    println!("state      {}", report.state.as_str().to_uppercase());
    if let Some(action) = report.action {
        println!("action     {action}");
    }
    if let Some(rationale) = &report.rationale {
        println!("rationale  {rationale}");
    }
    if let Some(relevance) = report.relevance {
        println!("relevance  {relevance:.2}");
    }
    if let Some(files) = report.files_changed {
        println!("files      {files}");
    }
    if let Some(provider) = report.provider {
        println!("provider   {provider}");
    }
    if let Some(document) = &report.document {
        println!("document   {document}");
    }
    if let Some(error) = &report.error {
        println!(
            "error      {:?} in {} after {} attempt(s)",
            error.kind, error.stage, error.attempts
        );
        for cause in &error.chain {
            println!("  caused by: {cause}");
        }
    }
    println!("duration   {} ms", report.duration_ms);
    Ok(())
}

fn ensure_succeeded(reports: &[RunReport]) -> Result<()> {
    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| r.state == RunStage::Failed)
        .map(|r| r.run_id.as_str())
        .collect();
    if !failed.is_empty() {
        bail!("{} run(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}
