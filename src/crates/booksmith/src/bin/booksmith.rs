//! Booksmith CLI
//!
//! Main entry point for the booksmith command-line tool.

use anyhow::Context;
use booksmith::config::ConfigError;
use booksmith::{
    BooksmithConfig, ConfigLoader, EpubAssembler, ErrorKind, EventSink, FrontierPolicy, PipelineEvent,
    PipelineOrchestrator, PipelineSettings, RunError, RunReport, ShutdownCoordinator,
};
use checkpoint::FileCheckpointStore;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use llm::fixture::FixtureBackend;
use llm::remote::PerplexityClient;
use llm::{ChatBackend, LlmError, RetryingClient};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "booksmith")]
#[command(about = "Booksmith - turn a book idea into a generated e-book", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file applied on top of the user and project files
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging for booksmith crates
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Answer requests from stored response files in DIR instead of the remote service
    #[arg(long, global = true, value_name = "DIR")]
    dry_run: Option<PathBuf>,

    /// With --dry-run, send requests that have no stored response to the remote service
    #[arg(long, global = true, requires = "dry_run")]
    live_fallback: bool,

    /// Model to request
    #[arg(long, global = true)]
    model: Option<String>,

    /// Chapters generated at the same time
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Chapter frontier policy: strict or wave
    #[arg(long, global = true)]
    frontier: Option<FrontierPolicy>,

    /// Directory the e-book is written to
    #[arg(long, global = true, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Directory holding run checkpoints
    #[arg(long, global = true, value_name = "DIR")]
    checkpoint_dir: Option<PathBuf>,

    /// Assemble chapters that could not be refined from their raw text
    #[arg(long, global = true)]
    accept_unrefined: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new book from an idea
    New {
        /// The book idea, in a sentence or two
        idea: String,
    },

    /// Continue a stopped or failed run
    Resume {
        /// Run ID
        run_id: String,
    },

    /// Show the stored state of a run
    Status {
        /// Run ID
        run_id: String,

        /// Print the full snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored runs, most recent first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ {:#}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = booksmith::logging::init_tracing(&config.logging, cli.verbose) {
        eprintln!("warning: logging unavailable: {}", e);
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("✗ {:#}", e);
            exit_code_for(&e)
        }
    }
}

async fn load_config(cli: &Cli) -> Result<BooksmithConfig, ConfigError> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_explicit(path);
    }
    let mut config = loader.load().await?;

    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        config.scheduler.concurrency = concurrency;
    }
    if let Some(frontier) = cli.frontier {
        config.scheduler.frontier = frontier;
    }
    if let Some(dir) = &cli.output_dir {
        config.assembly.output_dir = dir.clone();
    }
    if let Some(dir) = &cli.checkpoint_dir {
        config.checkpoint.dir = dir.clone();
    }
    if cli.accept_unrefined {
        config.assembly.accept_unrefined = true;
    }

    config.validate()?;
    Ok(config)
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if let Some(run_err) = err.downcast_ref::<RunError>() {
        return match run_err.kind() {
            ErrorKind::Cancelled => ExitCode::from(130),
            ErrorKind::Config => ExitCode::from(2),
            _ => ExitCode::from(1),
        };
    }
    if err.downcast_ref::<ConfigError>().is_some() || err.downcast_ref::<LlmError>().is_some() {
        return ExitCode::from(2);
    }
    ExitCode::from(1)
}

async fn run(cli: Cli, config: BooksmithConfig) -> anyhow::Result<()> {
    let store = Arc::new(FileCheckpointStore::new(&config.checkpoint.dir));

    match cli.command {
        Commands::New { ref idea } => {
            let idea = idea.clone();
            drive(&cli, &config, store, move |orchestrator| async move { orchestrator.start(&idea).await }).await
        }
        Commands::Resume { ref run_id } => {
            let run_id = run_id.clone();
            drive(&cli, &config, store, move |orchestrator| async move { orchestrator.resume(&run_id).await }).await
        }
        Commands::Status { ref run_id, json } => {
            let checkpointer = booksmith::RunCheckpointer::new(store);
            let run = checkpointer
                .load(run_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no checkpoint for run {}", run_id))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
                return Ok(());
            }

            println!("Run:      {}", run.run_id);
            println!("State:    {}", run.state);
            if let Some(concept) = &run.concept {
                println!("Title:    {}", concept.title);
            }
            println!("Idea:     {}", run.idea);
            println!("Updated:  {}", run.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
            if let Some(artifact) = &run.artifact {
                println!("Artifact: {}", artifact.display());
            }
            if let Some(failure) = &run.failure {
                println!(
                    "Failure:  {} at {} ({}) [{}]: {}",
                    failure.at_state,
                    failure.stage,
                    failure.unit.as_deref().unwrap_or("-"),
                    failure.kind,
                    failure.detail
                );
            }
            if !run.chapters.is_empty() {
                println!();
                println!("{:<6} {:<12} {}", "No.", "Status", "Title");
                println!("{}", "-".repeat(60));
                for chapter in &run.chapters {
                    println!("{:<6} {:<12} {}", chapter.number, chapter.status, chapter.title);
                }
            }
            Ok(())
        }
        Commands::List { json } => {
            let checkpointer = booksmith::RunCheckpointer::new(store);
            let runs = checkpointer.list_runs().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
                return Ok(());
            }
            if runs.is_empty() {
                println!("No runs found in {}", config.checkpoint.dir.display());
                return Ok(());
            }
            println!("{:<38} {:<10} {}", "Run", "Saves", "Last saved");
            println!("{}", "-".repeat(72));
            for summary in runs {
                println!(
                    "{:<38} {:<10} {}",
                    summary.run_id,
                    summary.sequence,
                    summary.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            Ok(())
        }
    }
}

fn build_backend(cli: &Cli, config: &BooksmithConfig) -> anyhow::Result<Arc<dyn ChatBackend>> {
    let remote = || -> anyhow::Result<Arc<dyn ChatBackend>> {
        Ok(Arc::new(PerplexityClient::new(config.remote_llm()?)?))
    };

    let Some(dir) = &cli.dry_run else {
        return remote();
    };
    tracing::info!(
        fixtures = %dir.display(),
        live_fallback = cli.live_fallback,
        "Dry run, answering from fixtures"
    );
    let fixtures = FixtureBackend::new(dir);
    if cli.live_fallback {
        return Ok(Arc::new(fixtures.with_fallback(remote()?)));
    }
    Ok(Arc::new(fixtures))
}

/// Build an orchestrator, run `action` on it and print the outcome
async fn drive<F, Fut>(
    cli: &Cli,
    config: &BooksmithConfig,
    store: Arc<FileCheckpointStore>,
    action: F,
) -> anyhow::Result<()>
where
    F: FnOnce(PipelineOrchestrator) -> Fut,
    Fut: std::future::Future<Output = Result<RunReport, RunError>>,
{
    let backend = build_backend(cli, config).context("could not set up the text-generation backend")?;
    let client = RetryingClient::new(backend, config.rate_limiter(), config.retry_policy())
        .with_options(config.client_options());

    let shutdown = ShutdownCoordinator::new();
    let _signals = shutdown.install_signal_handlers();

    let (events, rx) = EventSink::channel();
    let progress = tokio::spawn(show_progress(rx, config.logging.json));

    let settings = PipelineSettings {
        prompts: config.prompt_settings(),
        scheduler: config.scheduler_config(),
        accept_unrefined: config.assembly.accept_unrefined,
        output_dir: config.assembly.output_dir.clone(),
        author: config.assembly.author.clone(),
    };
    let orchestrator = PipelineOrchestrator::new(client, store, Arc::new(EpubAssembler::new()))
        .with_summarizer(Arc::new(config.summarizer()))
        .with_settings(settings)
        .with_events(events)
        .with_shutdown(shutdown);

    // The orchestrator is moved into `action`; once it is dropped the event channel
    // closes and the progress task finishes.
    let outcome = action(orchestrator).await;
    let _ = progress.await;

    match outcome {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(err) => {
            if !matches!(err.kind(), ErrorKind::Config) {
                eprintln!("Resume with: booksmith resume {}", err.run_id);
            }
            Err(err.into())
        }
    }
}

fn print_report(report: &RunReport) {
    match &report.artifact {
        Some(path) => println!("✓ Book assembled: {}", path.display()),
        None => println!("✓ Run {} is {}", report.run_id, report.state),
    }
    println!("  Run:      {}", report.run_id);
    if let Some(title) = &report.title {
        println!("  Title:    {}", title);
    }
    println!(
        "  Chapters: {} ({} refined, {} unrefined)",
        report.chapters, report.refined, report.unrefined
    );
}

async fn show_progress(mut rx: mpsc::UnboundedReceiver<PipelineEvent>, hidden: bool) {
    let bar = if hidden {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{elapsed}] {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    };

    while let Some(event) = rx.recv().await {
        match &event {
            PipelineEvent::ChapterGenerated { .. }
            | PipelineEvent::ChapterRefined { .. }
            | PipelineEvent::ChapterFailed { .. }
            | PipelineEvent::StageCompleted { .. } => bar.println(event.description()),
            _ => {}
        }
        bar.set_message(event.description());
    }
    bar.finish_and_clear();
}
