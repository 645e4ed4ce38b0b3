//! CLI entrypoint for tribunal
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tribunal_application::{
    EvaluationCoordinator, Evaluator, LogBackend, MessageLog, SessionStore,
};
use tribunal_domain::{AgentProfile, EvaluationRequest, OutputFormat};
use tribunal_infrastructure::{
    ConfigLoader, EvaluatorKind, FileConfig, InMemoryLogBackend, InMemorySessionStore,
    JsonFileSessionStore, JsonlLogBackend, LogBackendKind, ScriptedEvaluator, StoreBackendKind,
};
use tribunal_presentation::{Cli, ConsoleFormatter, ProgressReporter};

/// Judges used when neither the command line nor the config names any
const DEFAULT_JUDGES: [&str; 3] = ["judge-1", "judge-2", "judge-3"];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(&cli)?;

    if cli.show_config {
        ConfigLoader::print_config_sources(cli.config.as_ref());
        return Ok(());
    }

    let mut config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref())
            .map_err(|e| anyhow!("failed to load configuration: {e}"))?
    };
    apply_overrides(&mut config, &cli);
    config.validate().context("invalid configuration")?;

    if !config.output.color {
        colored::control::set_override(false);
    }
    let format = cli
        .output
        .map(OutputFormat::from)
        .or(config.output.format)
        .unwrap_or_default();

    let content = read_content(&cli)?;
    let orchestrator = config.orchestrator.to_orchestrator_config()?;
    let participants = select_participants(&config, &cli.agents);

    info!(
        "Starting tribunal with {} judges ({})",
        participants.len(),
        orchestrator.consensus_algorithm
    );

    // === Dependency Injection ===
    let mut coordinator = EvaluationCoordinator::new(
        build_evaluator(&config)?,
        MessageLog::new(build_log_backend(&config)?),
        build_store(&config).await?,
    );
    if !cli.quiet && format != OutputFormat::Json {
        coordinator = coordinator.with_progress(Arc::new(ProgressReporter::new()));
    }

    let mut request = EvaluationRequest::new(content, participants)
        .with_criteria(cli.criteria.clone())
        .with_config(orchestrator);
    if let Some(title) = &cli.title {
        request = request.with_title(title.clone());
    }

    let session_id = coordinator.start_evaluation(request).await?;
    info!("Session {} started", session_id);

    let report = tokio::select! {
        result = coordinator.wait(&session_id) => result?,
        _ = tokio::signal::ctrl_c() => {
            let phase = coordinator.cancel(&session_id).await?;
            bail!("session {} interrupted ({})", session_id, phase);
        }
    };

    let output = match format {
        OutputFormat::Full => ConsoleFormatter::format(&report),
        OutputFormat::Summary => ConsoleFormatter::format_summary(&report),
        OutputFormat::Json => ConsoleFormatter::format_json(&report),
    };
    println!("{}", output);

    if cli.transcript {
        let transcript = coordinator.get_transcript(&session_id).await?;
        let output = match format {
            OutputFormat::Json => ConsoleFormatter::format_transcript_json(&transcript),
            _ => ConsoleFormatter::format_transcript(&transcript),
        };
        println!("{}", output);
    }

    Ok(())
}

/// Initialize logging based on verbosity level; `RUST_LOG` wins when set.
fn init_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));

    match &cli.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("cannot create log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            Ok(None)
        }
    }
}

/// Command-line flags take precedence over every config source.
fn apply_overrides(config: &mut FileConfig, cli: &Cli) {
    let orchestrator = &mut config.orchestrator;
    if let Some(algorithm) = &cli.algorithm {
        orchestrator.consensus_algorithm = algorithm.clone();
    }
    if let Some(rounds) = cli.rounds {
        orchestrator.max_discussion_rounds = rounds;
    }
    if cli.no_discussion {
        orchestrator.enable_discussion = false;
    }
    if cli.outliers {
        orchestrator.outlier_detection = true;
    }
}

fn read_content(cli: &Cli) -> Result<String> {
    match (&cli.content, &cli.file) {
        (Some(content), _) => Ok(content.clone()),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display())),
        (None, None) => bail!("Content is required. Pass it inline or with --file."),
    }
}

/// Picks the judges for this run: the ids named on the command line
/// (configured profiles where available), else every configured agent,
/// else the default panel.
fn select_participants(config: &FileConfig, requested: &[String]) -> Vec<AgentProfile> {
    let profile_for = |id: &str| {
        config
            .agents
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.to_profile())
            .unwrap_or_else(|| AgentProfile::new(id, id))
    };

    if !requested.is_empty() {
        requested.iter().map(|id| profile_for(id)).collect()
    } else if !config.agents.is_empty() {
        config.agents.iter().map(|a| a.to_profile()).collect()
    } else {
        DEFAULT_JUDGES.iter().map(|id| profile_for(id)).collect()
    }
}

fn build_evaluator(config: &FileConfig) -> Result<Arc<dyn Evaluator>> {
    match config.evaluator.kind {
        EvaluatorKind::Scripted => {
            let evaluator = config
                .agents
                .iter()
                .fold(ScriptedEvaluator::new(), |evaluator, agent| {
                    evaluator.with_script(agent.id.as_str(), agent.script.clone())
                });
            Ok(Arc::new(evaluator))
        }
        EvaluatorKind::Http => build_http_evaluator(config),
    }
}

#[cfg(feature = "http")]
fn build_http_evaluator(config: &FileConfig) -> Result<Arc<dyn Evaluator>> {
    let endpoint = config
        .evaluator
        .endpoint
        .clone()
        .context("[evaluator] endpoint is required for the http evaluator")?;
    let timeout = std::time::Duration::from_secs(config.evaluator.timeout_secs);
    let evaluator = tribunal_infrastructure::HttpEvaluator::new(endpoint, timeout)?;
    Ok(Arc::new(evaluator))
}

#[cfg(not(feature = "http"))]
fn build_http_evaluator(_config: &FileConfig) -> Result<Arc<dyn Evaluator>> {
    bail!("the http evaluator requires building tribunal with the `http` feature")
}

fn build_log_backend(config: &FileConfig) -> Result<Arc<dyn LogBackend>> {
    Ok(match config.log.backend {
        LogBackendKind::Memory => Arc::new(InMemoryLogBackend::new()),
        LogBackendKind::Jsonl => {
            let dir = config
                .log
                .resolved_dir()
                .context("no directory for the JSONL log; set [log] dir")?;
            info!("Message log: {}", dir.display());
            Arc::new(JsonlLogBackend::open(&dir)?)
        }
    })
}

async fn build_store(config: &FileConfig) -> Result<Arc<dyn SessionStore>> {
    Ok(match config.store.backend {
        StoreBackendKind::Memory => Arc::new(InMemorySessionStore::new()),
        StoreBackendKind::File => {
            let dir = config
                .store
                .resolved_dir()
                .context("no directory for the session store; set [store] dir")?;
            info!("Session store: {}", dir.display());
            Arc::new(JsonFileSessionStore::open(&dir).await?)
        }
    })
}
