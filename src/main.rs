use clap::{Parser, Subcommand};
use series_ingest::config::IngestConfig;
use series_ingest::logging;
use series_ingest::pipeline::{RunCoordinator, RunSummary, SeriesKind};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "series_ingest")]
#[command(about = "Manufacturing time-series data ingestion service")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "config/ingest.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest labeled series only
    Labeled {
        /// Maximum number of series to process (single-core mode only)
        #[arg(long)]
        max_series: Option<usize>,
    },
    /// Ingest unlabeled series only
    Unlabeled {
        /// Maximum number of series to process (single-core mode only)
        #[arg(long)]
        max_series: Option<usize>,
    },
    /// Ingest labeled then unlabeled series
    Run,
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Ingestion results for {} series:", summary.kind);
    println!("   Discovered: {}", summary.discovered);
    println!("   Accepted: {}", summary.accepted);
    println!("   Duplicated: {}", summary.duplicated);
    println!(
        "   Malformed: {} ({} saved, {} dropped)",
        summary.malformed(),
        summary.malformed_saved,
        summary.malformed_dropped
    );
    if summary.store_errors > 0 {
        println!("   ⚠️  Store errors: {}", summary.store_errors);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    logging::init_logging();

    let cli = Cli::parse();

    let conf = IngestConfig::load(&cli.config)?;
    conf.ensure_resources()?;
    info!("Configuration loaded from {}", cli.config.display());

    let coordinator = RunCoordinator::new(conf);

    match cli.command {
        Commands::Labeled { max_series } => {
            println!("🔄 Ingesting labeled series...");
            let summary = coordinator.ingest(SeriesKind::Labeled, max_series).await?;
            print_summary(&summary);
        }
        Commands::Unlabeled { max_series } => {
            println!("🔄 Ingesting unlabeled series...");
            let summary = coordinator.ingest(SeriesKind::Unlabeled, max_series).await?;
            print_summary(&summary);
        }
        Commands::Run => {
            println!("🚀 Ingesting labeled and unlabeled series...");
            let labeled = coordinator.ingest(SeriesKind::Labeled, None).await?;
            print_summary(&labeled);
            let unlabeled = coordinator.ingest(SeriesKind::Unlabeled, None).await?;
            print_summary(&unlabeled);
        }
    }

    Ok(())
}
