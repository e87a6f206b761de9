use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use newsagg_adapters::{FetchParams, SourceKind};
use newsagg_storage::PgArticleStore;
use newsagg_sync::{build_adapters, connect_aggregator, retention_cutoff, AggregateReport, AggregatorConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "news")]
#[command(about = "Fetch, store and prune articles from NewsAPI, The Guardian and the New York Times")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch articles from every configured source.
    Fetch {
        /// Only fetch from this source (newsapi, guardian, nytimes).
        #[arg(long)]
        source: Option<SourceKind>,
        /// Look back this many days.
        #[arg(long, default_value_t = 1)]
        days: u32,
        /// Sweep expired articles after fetching.
        #[arg(long)]
        cleanup: bool,
        /// Print the full run report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delete articles older than the retention window.
    Cleanup {
        #[arg(long)]
        days: Option<u32>,
    },
    /// Apply database migrations.
    Migrate,
    /// List sources with a configured API key.
    Sources,
    /// List the standard categories.
    Categories,
}

fn fetch_params(source: Option<SourceKind>, days: u32) -> FetchParams {
    let now = Utc::now();
    let params = FetchParams {
        from: retention_cutoff(now, days),
        to: Some(now),
        ..Default::default()
    };
    match source {
        Some(kind) => params.only(kind).with_sort_hints(kind),
        None => params,
    }
}

fn print_summary(report: &AggregateReport) {
    println!("fetch complete: run_id={}", report.run_id);
    println!("  total fetched:      {}", report.stats.fetched);
    println!("  total saved:        {}", report.stats.saved);
    println!("  duplicates skipped: {}", report.stats.duplicates_skipped);
    println!("  errors:             {}", report.stats.errors);
    for (source, stats) in &report.per_source {
        println!(
            "  {source}: fetched={} saved={} duplicates={} errors={}",
            stats.fetched, stats.saved, stats.duplicates_skipped, stats.errors
        );
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    let config = AggregatorConfig::from_env();

    match cli.command {
        Commands::Fetch {
            source,
            days,
            cleanup,
            json,
        } => {
            let aggregator = connect_aggregator(&config).await?;
            if let Some(kind) = source {
                if !aggregator.available_sources().contains(&kind.key()) {
                    anyhow::bail!("source {kind} has no API key configured");
                }
            }

            let report = aggregator.aggregate(&fetch_params(source, days)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&report);
            }

            if cleanup {
                let deleted = aggregator.cleanup_old_articles(config.retention_days).await?;
                println!("cleanup complete: {deleted} articles older than {} days deleted", config.retention_days);
            }
        }
        Commands::Cleanup { days } => {
            let days = days.unwrap_or(config.retention_days);
            let aggregator = connect_aggregator(&config).await?;
            let deleted = aggregator.cleanup_old_articles(days).await?;
            println!("cleanup complete: {deleted} articles older than {days} days deleted");
        }
        Commands::Migrate => {
            let store = PgArticleStore::connect(&config.database_url)
                .await
                .context("connecting article store")?;
            store.migrate().await?;
            info!("database is up to date");
        }
        Commands::Sources => {
            for adapter in build_adapters(&config) {
                println!("{}\t{}", adapter.kind().key(), adapter.source_name());
            }
        }
        Commands::Categories => {
            for category in newsagg_core::standard_categories() {
                println!("{category}");
            }
        }
    }

    Ok(())
}
