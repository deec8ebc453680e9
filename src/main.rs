use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use enroll_orchestrator::clock::system_clock;
use enroll_orchestrator::config::Config;
use enroll_orchestrator::metrics;
use enroll_orchestrator::scheduler::{ProcedureEvent, ProcedureOrchestrator};
use enroll_orchestrator::store::{MemoryStore, SeedFile, Stores};

#[derive(Parser)]
#[command(
    name = "enroll-orchestrator",
    version,
    about = "Time-driven orchestration of course enrollment procedures",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configuration
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// TOML configuration file; environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load campaigns from a seed file and run the scan loop
    Run {
        /// Seed file with campaigns, procedures and events
        #[arg(short, long)]
        seed: PathBuf,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Print the Prometheus metrics before exiting
        #[arg(long)]
        print_metrics: bool,
    },

    /// Print every campaign and its current procedure
    Show {
        /// Seed file with campaigns, procedures and events
        #[arg(short, long)]
        seed: PathBuf,

        /// Instant to evaluate (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<String>,
    },

    /// Load and validate the configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    config.validate()?;

    setup_tracing(&config.logging.format, &config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Run {
            seed,
            duration_secs,
            print_metrics,
        } => {
            tracing::info!(
                seed = %seed.display(),
                duration_secs = ?duration_secs,
                "Starting run command"
            );
            run(&config, &seed, duration_secs, print_metrics).await?;
        }

        Commands::Show { seed, at } => {
            show(&seed, at.as_deref())?;
        }

        Commands::CheckConfig => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("Configuration is valid\n");
            println!("{rendered}");
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::from_env()),
    }
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("enroll_orchestrator=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("enroll_orchestrator={level},warn"))
            .context("Invalid log level")?
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

fn load_seed(path: &Path) -> Result<MemoryStore> {
    let seed = SeedFile::from_file(path)
        .with_context(|| format!("Failed to load seed file: {}", path.display()))?;
    let store = seed
        .into_store()
        .with_context(|| format!("Invalid seed data in {}", path.display()))?;
    Ok(store)
}

async fn run(
    config: &Config,
    seed: &Path,
    duration_secs: Option<u64>,
    print_metrics: bool,
) -> Result<()> {
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed: {}", e);
    }

    let store = Arc::new(load_seed(seed)?);
    let orchestrator = Arc::new(ProcedureOrchestrator::from_config(
        &config.orchestrator,
        Stores::from_memory(store.clone()),
        system_clock(),
    )?);

    let mut events = orchestrator.subscribe();
    let listener = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event listener lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    if config.orchestrator.autostart {
        orchestrator.start_timer().await?;

        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => {
                tokio::signal::ctrl_c()
                    .await
                    .context("Failed to listen for Ctrl-C")?;
                tracing::info!("Ctrl-C received, shutting down");
            }
        }

        orchestrator.stop_timer().await?;
    } else {
        tracing::info!("Autostart disabled, running a single scan");
        let report = orchestrator.scan_now().await?;
        tracing::info!(?report, "Scan finished");
    }

    println!("{}", orchestrator.status().await.display());
    println!("Registrations: {}", store.registrations()?.len());

    if print_metrics && metrics::metrics_initialized() {
        match metrics::encode_metrics() {
            Ok(text) => println!("\n{text}"),
            Err(e) => tracing::warn!("Metrics encoding failed: {}", e),
        }
    }

    listener.abort();
    Ok(())
}

fn log_event(event: &ProcedureEvent) {
    match event {
        ProcedureEvent::Activated {
            procedure_id,
            campaign_id,
            logic,
            ..
        } => tracing::info!(%procedure_id, %campaign_id, logic, "Activated"),
        ProcedureEvent::Expired { procedure_id, .. } => {
            tracing::info!(%procedure_id, "Expired");
        }
        ProcedureEvent::Reconciled { procedure_id, .. } => {
            tracing::warn!(%procedure_id, "Reconciled away");
        }
        ProcedureEvent::CallbackFailed {
            procedure_id,
            hook,
            reason,
            ..
        } => tracing::error!(%procedure_id, %hook, %reason, "Callback failed"),
    }
}

fn show(seed: &Path, at: Option<&str>) -> Result<()> {
    let at = match at {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Invalid RFC 3339 timestamp: {raw}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let store = load_seed(seed)?;
    let campaigns = store.all_campaigns()?;

    println!("Campaigns at {}", at.to_rfc3339());
    println!("{:-<60}", "");

    for campaign in campaigns {
        let visibility = if campaign.is_visible_at(at) {
            "visible"
        } else {
            "hidden"
        };
        println!("[{}] {} ({visibility})", campaign.id, campaign.name);

        match campaign.find_current_procedure(at) {
            Some(procedure) => println!(
                "    current: [{}] {} ({}, {} - {})",
                procedure.id(),
                procedure.name(),
                procedure.procedure_type(),
                procedure.start().to_rfc3339(),
                procedure.end().to_rfc3339()
            ),
            None => println!("    current: none"),
        }
        println!("    procedures: {}", campaign.procedures().len());
    }

    Ok(())
}
