use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use releasetag_reminder::config::LoggingConfig;
use releasetag_reminder::schedule::{parse_interval, run_periodically};
use releasetag_reminder::{
    Config, GitCli, LogNotifier, Notifier, ReleaseChecker, RepoOutcome, RunSummary, SlackWebhook,
};

#[derive(Parser)]
#[command(name = "releasetag-reminder")]
#[command(about = "Posts a reminder when a repository has commits newer than its latest release tag")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "conf", alias = "config")]
    conf: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Check repositories but only log the notifications
    #[arg(long)]
    dry_run: bool,

    /// Re-run on this interval (e.g. "30m", "1h") instead of exiting after one run
    #[arg(long)]
    interval: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configuration decides the log format, so it is loaded before logging exists
    let config = Config::load(&cli.conf)?;
    init_logging(&config.logging, cli.verbose)?;
    info!("Starting releasetag-reminder v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Loaded configuration from {} ({} repositories)",
        cli.conf.display(),
        config.repositories.len()
    );

    let interval = match cli.interval.as_deref().or(config.schedule.interval.as_deref()) {
        Some(raw) => Some(parse_interval(raw)?),
        None => None,
    };

    let git = GitCli::new(config.git.clone());
    let version = git.ensure_available().await?;
    info!("Using {}", version);

    let notifier: Arc<dyn Notifier> = if cli.dry_run {
        println!("🔍 Dry run mode - notifications will only be logged");
        Arc::new(LogNotifier)
    } else {
        Arc::new(SlackWebhook::new())
    };

    let checker = ReleaseChecker::new(&config, Arc::new(git), notifier);

    match interval {
        Some(every) => {
            run_periodically(&checker, every, print_summary).await?;
            Ok(())
        }
        None => {
            let summary = checker.run().await?;
            print_summary(&summary);
            if summary.has_failures() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Initialize logging; `RUST_LOG` wins, then `--verbose`, then the config level
fn init_logging(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let layer = fmt::layer().with_ansi(logging.color);
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format.as_str() {
        "pretty" => registry.with(layer.pretty()).init(),
        "full" => registry.with(layer).init(),
        _ => registry.with(layer.compact()).init(),
    }

    Ok(())
}

/// Print the end-of-run report to stdout
fn print_summary(summary: &RunSummary) {
    println!("\n🏷️  Release check complete ({})", summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("   📊 Repositories checked: {}", summary.total_repositories);
    println!("   📥 Cloned: {}, pulled: {}", summary.cloned, summary.pulled);
    println!("   ✅ Up to date: {}", summary.up_to_date);
    println!("   📣 Notified: {} ({} messages)", summary.notified, summary.notices_sent);
    println!("   ❌ Failed: {}", summary.failed);
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

    for result in &summary.results {
        if let RepoOutcome::Notified { name, notices, .. } = result {
            for notice in notices {
                println!("   📣 {}: {}", name, notice.title());
            }
        }
    }

    if summary.has_failures() {
        println!("\n🔍 Failed repositories:");
        for (name, error) in summary.failures() {
            println!("   ❌ {}: {}", name, error);
        }
    }
}
