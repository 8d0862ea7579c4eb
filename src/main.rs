use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smmaker::archive::ChromaArchive;
use smmaker::config::Config;
use smmaker::generator::{FusionBrainGenerator, OpenAiGenerator, YandexGenerator};
use smmaker::orchestrator::{Orchestrator, RunContext};
use smmaker::publisher::{TelegramPublisher, VkPublisher};
use smmaker::scheduler::{Scheduler, SchedulerError};
use smmaker::source::SheetsSource;

#[derive(Parser)]
#[command(
    name = "smmaker",
    version,
    about = "Spreadsheet-driven social media content pipeline",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the prompts/schedules TOML file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides SMMAKER_LOG_FORMAT
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the cron scheduler until interrupted
    ///
    /// Falls back to a single immediate run when no schedule is enabled.
    Serve,

    /// Execute one run and exit
    Run {
        /// Run as this schedule definition instead of an immediate run
        #[arg(short, long)]
        schedule: Option<String>,
    },

    /// List the configured schedule definitions
    Schedules,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Arc::new(Config::load(cli.config.as_deref())?);

    let log_format = cli
        .log_format
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;
    tracing::info!(
        channels = ?config.enabled_channels(),
        schedules = config.schedules.len(),
        "smmaker starting"
    );

    match cli.command {
        Commands::Serve => serve(config).await?,
        Commands::Run { schedule } => run_once(config, schedule).await?,
        Commands::Schedules => list_schedules(&config),
    }

    Ok(())
}

async fn serve(config: Arc<Config>) -> Result<()> {
    let orchestrator = Arc::new(build_orchestrator(Arc::clone(&config))?);
    let handler: Arc<dyn smmaker::scheduler::RunHandler> = orchestrator.clone();
    let mut scheduler = Scheduler::new(handler, config.schedules.clone());

    match scheduler.start() {
        Ok(()) => {
            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutdown signal received");
            scheduler.stop().await;
            Ok(())
        }
        Err(SchedulerError::NothingToSchedule) => {
            tracing::warn!("No enabled schedules; executing one immediate run");
            let outcome = orchestrator.run(&RunContext::immediate(&config)).await;
            report_outcome(&outcome);
            std::process::exit(outcome.exit_code());
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_once(config: Arc<Config>, schedule: Option<String>) -> Result<()> {
    let ctx = match schedule {
        Some(id) => {
            let definition = config
                .schedules
                .iter()
                .find(|d| d.id == id)
                .ok_or_else(|| anyhow::anyhow!("no schedule definition named '{id}'"))?;
            RunContext::from_schedule(definition)
        }
        None => RunContext::immediate(&config),
    };

    let orchestrator = build_orchestrator(config)?;
    let outcome = orchestrator.run(&ctx).await;
    report_outcome(&outcome);
    std::process::exit(outcome.exit_code());
}

fn list_schedules(config: &Config) {
    if config.schedules.is_empty() {
        println!("No schedule definitions configured");
        return;
    }
    for definition in &config.schedules {
        println!(
            "{}  cron='{}'  generator={}  prompt_key={}  module={}  enabled={}",
            definition.id,
            definition.cron,
            definition.generator,
            definition.prompt_key,
            definition.module.as_deref().unwrap_or("all"),
            definition.enabled,
        );
    }
}

/// Wire the configured adapters into an orchestrator.
fn build_orchestrator(config: Arc<Config>) -> Result<Orchestrator> {
    let mut builder = Orchestrator::builder()
        .config(Arc::clone(&config))
        .source(Arc::new(SheetsSource::new(config.sheets.clone())?));

    let openai = Arc::new(OpenAiGenerator::new(config.openai.clone())?);
    builder = builder.generator(openai.clone());

    if !config.yandex.api_key.is_empty() {
        builder = builder.generator(Arc::new(YandexGenerator::new(config.yandex.clone())?));
    }

    if let Some(provider) = config.image.provider.as_deref() {
        match provider {
            "openai" | "chatgpt" => {
                builder = builder.image_provider(openai, config.image.model.clone());
            }
            "fusionbrain" => {
                let fusionbrain =
                    Arc::new(FusionBrainGenerator::new(config.fusionbrain.clone())?);
                builder = builder.image_provider(fusionbrain, config.image.model.clone());
            }
            other => {
                tracing::warn!(provider = %other, "Unknown image provider; illustrations disabled");
            }
        }
    }

    if config.vk.enabled {
        builder = builder.publisher(Arc::new(VkPublisher::new(config.vk.clone())?));
    }
    if config.telegram.enabled {
        builder = builder.publisher(Arc::new(TelegramPublisher::new(config.telegram.clone())?));
    }

    if config.archive.enabled {
        builder = builder.archive(Arc::new(ChromaArchive::new(config.archive.clone())?));
    }

    builder.build()
}

fn report_outcome(outcome: &smmaker::RunOutcome) {
    println!("Run '{}': {:?}", outcome.schedule_id, outcome.status);
    if let Some(row) = outcome.row {
        println!("  row: {row}");
    }
    for publish in &outcome.outcomes {
        match (&publish.post_id, &publish.error) {
            (Some(post_id), _) => println!("  {}: {post_id}", publish.channel),
            (None, Some(error)) => println!("  {}: failed ({error})", publish.channel),
            (None, None) => println!("  {}: failed", publish.channel),
        }
    }
    for note in &outcome.degraded {
        println!("  degraded: {note}");
    }
    if let Some(error) = &outcome.error {
        println!("  error: {error}");
    }
    if let Some(error) = &outcome.finalize_error {
        println!("  finalize: {error}");
    }
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("smmaker=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new(format!("smmaker={level},warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
