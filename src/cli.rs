//! Command-line surface.
//!
//! Four subcommands mirror the system's lifecycle: `init` prepares the
//! database, `harvest` discovers links, `process` drains the queue, and
//! `status` reports on both.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use crate::browser::BrowserSession;
use crate::config::Settings;
use crate::extract::SelectorExtractor;
use crate::models::TaskStatus;
use crate::repository::{SqlitePool, TaskRepository};
use crate::services::{HarvestOutcome, Harvester, Processor};

#[derive(Parser)]
#[command(name = "threadharvest")]
#[command(about = "Threads search harvester and post content collector")]
#[command(version)]
pub struct Cli {
    /// Data directory holding the database and config file
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Scroll a search feed and store discovered post links
    Harvest {
        /// Search keyword (falls back to the configured one)
        keyword: Option<String>,
        /// Stop once this many links are stored for the keyword
        #[arg(short, long)]
        target: Option<u64>,
        /// Links buffered before each database flush
        #[arg(short, long)]
        batch_size: Option<usize>,
        /// Zero-growth flushes before the feed counts as exhausted
        #[arg(short, long)]
        stability: Option<u32>,
        /// Explicit feed URL instead of the keyword search page
        #[arg(long)]
        feed_url: Option<String>,
    },

    /// Fetch pending posts and extract their content
    Process {
        /// Failed attempts before a task is abandoned
        #[arg(short, long)]
        max_retries: Option<u32>,
        /// Limit number of tasks to attempt (0 = drain the queue)
        #[arg(short, long, default_value = "0")]
        limit: u64,
    },

    /// Show queue status
    Status,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref(), cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Init => cmd_init(&settings).await,
        Commands::Harvest {
            keyword,
            target,
            batch_size,
            stability,
            feed_url,
        } => cmd_harvest(settings, keyword, target, batch_size, stability, feed_url).await,
        Commands::Process { max_retries, limit } => cmd_process(settings, max_retries, limit).await,
        Commands::Status => cmd_status(&settings).await,
    }
}

/// Open the task repository, creating the database file and schema as needed.
async fn open_repository(settings: &Settings) -> anyhow::Result<TaskRepository> {
    let db_path = settings.database_path();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let repo = TaskRepository::new(SqlitePool::from_path(&db_path));
    repo.initialize().await?;
    Ok(repo)
}

async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    open_repository(settings).await?;
    println!(
        "{} Initialized database at {}",
        style("✓").green(),
        settings.database_path().display()
    );
    Ok(())
}

async fn cmd_harvest(
    mut settings: Settings,
    keyword: Option<String>,
    target: Option<u64>,
    batch_size: Option<usize>,
    stability: Option<u32>,
    feed_url: Option<String>,
) -> anyhow::Result<()> {
    if let Some(target) = target {
        settings.harvest.target_count = target;
    }
    if let Some(batch_size) = batch_size {
        settings.harvest.batch_size = batch_size.max(1);
    }
    if let Some(stability) = stability {
        settings.harvest.stability_threshold = stability.max(1);
    }
    if feed_url.is_some() {
        settings.harvest.feed_url = feed_url;
    }

    let keyword = keyword
        .or_else(|| settings.harvest.keyword.clone())
        .ok_or_else(|| {
            anyhow::anyhow!("no keyword given; pass one or set harvest.keyword in the config file")
        })?;

    let repo = open_repository(&settings).await?;
    let session = BrowserSession::launch(&settings.browser).await?;

    let harvester = Harvester::new(&repo, &session, settings.harvest.clone(), &keyword);
    let report = harvester.run().await?;

    match report.outcome {
        HarvestOutcome::AlreadySatisfied => println!(
            "{} \"{}\" already has {} links stored (target {})",
            style("✓").green(),
            keyword,
            report.total,
            settings.harvest.target_count
        ),
        HarvestOutcome::TargetReached => println!(
            "{} Target reached: {} links stored for \"{}\" ({} new)",
            style("✓").green(),
            report.total,
            keyword,
            report.newly_stored
        ),
        HarvestOutcome::FeedExhausted => println!(
            "{} Feed exhausted at {} links for \"{}\" ({} new)",
            style("!").yellow(),
            report.total,
            keyword,
            report.newly_stored
        ),
    }
    Ok(())
}

async fn cmd_process(
    mut settings: Settings,
    max_retries: Option<u32>,
    limit: u64,
) -> anyhow::Result<()> {
    if let Some(max_retries) = max_retries {
        settings.process.max_retries = max_retries.max(1);
    }

    let repo = open_repository(&settings).await?;
    let session = BrowserSession::launch(&settings.browser).await?;
    let extractor = SelectorExtractor::new(
        &settings.process.content_selector,
        &settings.process.content_span_class,
    )?;

    let processor = Processor::new(&repo, &session, &extractor, settings.process.clone());
    let limit = (limit > 0).then_some(limit);
    let summary = processor.run(limit).await?;

    println!(
        "{} Processed {} tasks: {} succeeded, {} returned for retry, {} abandoned",
        style("✓").green(),
        summary.attempted,
        summary.succeeded,
        summary.retried,
        summary.exhausted
    );
    Ok(())
}

async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let repo = open_repository(settings).await?;

    let stats = repo.stats_by_status().await?;
    let count = |status: TaskStatus| stats.get(&status).copied().unwrap_or(0);
    let total: u64 = stats.values().sum();

    println!("{}", style("Task queue").bold());
    println!("  Pending:   {}", count(TaskStatus::Pending));
    println!(
        "  Succeeded: {}",
        style(count(TaskStatus::Success)).green()
    );
    println!(
        "  Failed:    {}",
        style(count(TaskStatus::PermanentFailure)).red()
    );
    println!("  Total:     {total}");

    let keywords = repo.counts_by_keyword().await?;
    if !keywords.is_empty() {
        println!();
        println!("{}", style("Links per keyword").bold());
        for (keyword, count) in keywords {
            println!("  {keyword}: {count}");
        }
    }
    Ok(())
}
