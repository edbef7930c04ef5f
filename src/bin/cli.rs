//! Collector CLI
//!
//! Local execution entry point. For AWS Lambda, use `collector-lambda`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use collector::{
    error::Result,
    models::{CommentSort, Config, Listing, TimeFilter},
    pipeline::{self, CommentJob, JobContext, PostJob, RunReport},
    services::RedditClient,
    storage,
};

/// Forum trend collector
#[derive(Parser, Debug)]
#[command(
    name = "collector",
    version,
    about = "Collects forum posts and comments into a document store"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect one listing from every tier
    Posts {
        /// Listing to fetch: new, hot, top
        #[arg(long)]
        listing: Listing,

        /// Window for the top listing: hour, day, week, month, year, all
        #[arg(long, default_value = "day")]
        time_filter: TimeFilter,

        /// Skip posts older than this many days (default from config)
        #[arg(long)]
        window_days: Option<i64>,
    },

    /// Collect comments of the most engaged stored posts
    Comments {
        /// Comment sort: confidence (best), top, new, old, qa, controversial, hot
        #[arg(long)]
        sort: CommentSort,

        /// Listing the seed posts must have been seen in (default follows sort)
        #[arg(long)]
        seed_listing: Option<Listing>,

        /// Comments scanned per post
        #[arg(long, default_value_t = 300)]
        cap: usize,

        /// Comments kept per post
        #[arg(long, default_value_t = 120)]
        limit: usize,

        /// Include replies at every level, not just top-level comments
        #[arg(long)]
        all_levels: bool,
    },

    /// Run every job in schedule order
    RunAll,

    /// Create store indexes
    Indexes,

    /// Validate configuration
    Validate,
}

/// Work resolved from the command line.
enum Plan {
    Posts(PostJob),
    Comments(CommentJob),
    All,
    Indexes,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn log_report(report: &RunReport) {
    for job in &report.jobs {
        log::info!("{}: {} | {}", job.job, job.fetched, job.upserts);
        for tier in &job.tiers {
            log::info!("    [{}] {} | {}", tier.tier, tier.fetched, tier.upserts);
        }
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Collector starting...");

    let mut config = Config::load_or_default(&cli.config)?;
    config.apply_env()?;
    log::info!("Loaded configuration from {}", cli.config.display());

    if let Err(e) = config.validate() {
        log::error!("Config validation failed: {}", e);
        return Err(e);
    }

    // Resolve jobs before any I/O.
    let plan = match cli.command {
        Command::Validate => {
            log::info!(
                "✓ Config OK ({} tiers, {} communities, storage={:?})",
                config.tiers.len(),
                config.tiers.iter().map(|t| t.subreddits.len()).sum::<usize>(),
                config.storage.backend
            );
            match config.require_credentials() {
                Ok(()) => log::info!("✓ API credentials present"),
                Err(e) => log::warn!("{}", e),
            }
            return Ok(());
        }

        Command::Posts {
            listing,
            time_filter,
            window_days,
        } => {
            let mut job = PostJob::new(listing, &config);
            job.time_filter = time_filter;
            if let Some(days) = window_days {
                job.window_days = days;
            }
            job.validate()?;
            Plan::Posts(job)
        }

        Command::Comments {
            sort,
            seed_listing,
            cap,
            limit,
            all_levels,
        } => {
            let mut job = CommentJob::new(sort);
            if let Some(listing) = seed_listing {
                job.seed_listing = listing;
            }
            job.cap = cap;
            job.limit = limit;
            job.top_level_only = !all_levels;
            Plan::Comments(job)
        }

        Command::RunAll => Plan::All,
        Command::Indexes => Plan::Indexes,
    };

    let store = storage::open(&config.storage).await?;
    store.ensure_indexes().await?;

    if let Plan::Indexes = plan {
        log::info!("Indexes ready");
        return Ok(());
    }

    config.require_credentials()?;
    let api = RedditClient::new(&config.reddit)?;
    let ctx = JobContext::new(&config, store.as_ref(), &api);

    let report: RunReport = match plan {
        Plan::Posts(job) => pipeline::run_post_job(&ctx, &job).await?.into(),
        Plan::Comments(job) => pipeline::run_comment_job(&ctx, &job).await?.into(),
        Plan::All => pipeline::run_all(&ctx).await?,
        Plan::Indexes => RunReport::default(),
    };

    log_report(&report);
    log::info!("Done!");

    Ok(())
}
