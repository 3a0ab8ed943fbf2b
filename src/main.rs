mod aggregator;
mod collector;
mod config;
mod db;
mod error;
mod guard;
mod pairs;
mod premium;
mod quote;
mod scheduler;
mod session;
mod types;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::aggregator::{AggregateError, DailyAggregator};
use crate::collector::{CollectionError, CollectionPipeline};
use crate::config::Config;
use crate::db::{PremiumStore, SqliteStore};
use crate::error::AppError;
use crate::quote::parser::QUOTE_SCHEMA_VERSION;
use crate::quote::QuoteFetcher;
use crate::scheduler::Scheduler;
use crate::session::SessionEvaluator;
use crate::types::{FxRateSample, FxSource};

#[derive(Parser)]
#[command(name = "ah-premium")]
#[command(about = "A/H share premium collector", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler: collect during sessions, aggregate after close (default)
    Run,
    /// Collect once now, ignoring the session gate
    Collect {
        /// Only this A-share code
        #[arg(long)]
        stock: Option<String>,
    },
    /// Compute daily stats
    Aggregate {
        /// Trade date, YYYY-MM-DD (defaults to today, exchange-local)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Only this A-share code
        #[arg(long)]
        stock: Option<String>,
    },
    /// Record a manual FX rate for the configured pair
    SetRate {
        rate: Decimal,
    },
    /// Register the A/H seed pairs (existing codes are left untouched)
    SeedPairs,
    /// Print daily stats as JSON: one stock's recent days, or every stock
    /// over a date range
    Stats {
        #[arg(long, required_unless_present_any = ["from", "to"])]
        stock: Option<String>,
        #[arg(long, default_value_t = 30)]
        limit: u32,
        /// First trade date of the range, YYYY-MM-DD
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last trade date of the range (defaults to today)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Compute a premium from given prices (0 for non-positive input)
    Premium {
        #[arg(long)]
        a: Decimal,
        #[arg(long)]
        h: Decimal,
        #[arg(long)]
        fx: Decimal,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    App(#[from] AppError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cli.command.unwrap_or(Commands::Run), cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, cfg: Config) -> Result<(), CliError> {
    // --- Database setup ---
    let store = SqliteStore::open(&cfg.db_path).await?;
    let sessions = SessionEvaluator::new(cfg.market_tz);

    match command {
        Commands::Run => {
            let scheduler = Scheduler::new(pipeline(&cfg, &store)?, aggregator(&store), &cfg);
            tokio::spawn(async move { scheduler.run().await });
            info!(
                "Collector running (fx_pair={}, tz={}, quote schema v{})",
                cfg.fx_pair, cfg.market_tz, QUOTE_SCHEMA_VERSION
            );

            tokio::signal::ctrl_c().await.map_err(AppError::from)?;
            info!("Shutting down");
        }
        Commands::Collect { stock } => {
            let report = pipeline(&cfg, &store)?
                .run_collection(Utc::now(), stock.as_deref())
                .await?;
            for s in &report.skipped {
                warn!("{} skipped: {}", s.a_code, s.reason);
            }
            info!(
                "Collected {}/{} pairs ({} failed) at fx {} ({})",
                report.succeeded,
                report.attempted,
                report.failed(),
                report.fx_rate,
                report.fx_source
            );
        }
        Commands::Aggregate { date, stock } => {
            let date = date.unwrap_or_else(|| sessions.local(Utc::now()).date());
            let agg = aggregator(&store);
            agg.aggregate_all(date, stock.as_deref()).await?;
        }
        Commands::SetRate { rate } => {
            let tick = sessions.tick(Utc::now());
            let sample = FxRateSample::new(&cfg.fx_pair, rate, &tick, FxSource::Manual)?;
            store.insert_fx_sample(&sample).await?;
            info!("Manual {} rate set to {}", sample.currency_pair, sample.rate);
        }
        Commands::SeedPairs => {
            let seed = pairs::load_seed(&cfg)?;
            let added = store.seed_pairs(&seed).await?;
            info!("Seeded {added} new pairs ({} in table)", seed.len());
        }
        Commands::Stats { stock, limit, from, to } => {
            let stats = match (stock, from, to) {
                (Some(stock), None, None) => store.recent_daily_stats(&stock, limit).await?,
                (stock, from, to) => {
                    let to = to.unwrap_or_else(|| sessions.local(Utc::now()).date());
                    let mut stats = store.daily_stats_between(from.unwrap_or(to), to).await?;
                    if let Some(code) = stock {
                        stats.retain(|s| s.stock_code == code);
                    }
                    stats
                }
            };
            let json = serde_json::to_string_pretty(&stats).map_err(AppError::from)?;
            println!("{json}");
        }
        Commands::Premium { a, h, fx } => {
            println!("{}", premium::premium_rate(a, h, fx));
        }
    }

    Ok(())
}

fn pipeline(cfg: &Config, store: &SqliteStore) -> Result<Arc<CollectionPipeline>, AppError> {
    let fetcher = QuoteFetcher::new(cfg)?;
    Ok(Arc::new(CollectionPipeline::new(
        Arc::new(fetcher),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        SessionEvaluator::new(cfg.market_tz),
        cfg.fx_pair.clone(),
        cfg.collect_concurrency,
    )))
}

fn aggregator(store: &SqliteStore) -> DailyAggregator {
    DailyAggregator::new(Arc::new(store.clone()), Arc::new(store.clone()))
}
