mod commands;
mod render;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hearthcal_core::config::HearthcalConfig;
use hearthcal_core::{LocalStore, MemberId, ProxyFetcher, SourceId, Synchronizer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub type AppSynchronizer = Synchronizer<ProxyFetcher, LocalStore>;

#[derive(Parser)]
#[command(name = "hearthcal")]
#[command(about = "Preview, subscribe to and sync iCal feeds into the household calendar")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a feed and show its events without saving anything
    Preview {
        url: String,

        /// Show at most this many events
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Subscribe a household member to an iCal feed
    Add {
        url: String,

        #[arg(short, long)]
        member: MemberId,
    },
    /// Unsubscribe and delete the feed's events
    Remove { source_id: SourceId },
    /// List calendar subscriptions
    Sources,
    /// Refresh subscriptions now
    Sync {
        /// Only refresh this source
        #[arg(short, long)]
        source: Option<SourceId>,
    },
    /// List stored events
    Events {
        /// Only events from this source
        #[arg(short, long)]
        source: Option<SourceId>,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Sync at startup and then periodically until interrupted
    Run {
        /// Overrides sync_interval from the config (e.g. "10m")
        #[arg(short, long)]
        interval: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hearthcal=info,hearthcal_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = HearthcalConfig::load()?;
    let synchronizer = build_synchronizer(&config)?;

    match cli.command {
        Commands::Preview { url, limit } => commands::preview::run(&synchronizer, &url, limit).await,
        Commands::Add { url, member } => commands::add::run(&synchronizer, &url, member).await,
        Commands::Remove { source_id } => commands::remove::run(&synchronizer, source_id),
        Commands::Sources => commands::sources::run(&synchronizer),
        Commands::Sync { source } => commands::sync::run(&synchronizer, source).await,
        Commands::Events { source, limit } => commands::events::run(&synchronizer, source, limit),
        Commands::Run { interval } => {
            let interval = match interval {
                Some(value) => humantime::parse_duration(&value)
                    .map_err(|e| anyhow::anyhow!("Invalid interval '{}': {}", value, e))?,
                None => config.sync_interval()?,
            };
            commands::run::run(Arc::new(synchronizer), interval).await
        }
    }
}

fn build_synchronizer(config: &HearthcalConfig) -> Result<AppSynchronizer> {
    let fetcher = ProxyFetcher::new(&config.proxy_url, config.request_timeout()?)?;
    let store = LocalStore::open(config.database_path()?)?;

    Ok(Synchronizer::new(fetcher, Arc::new(store)).with_floating_timezone(config.timezone()?))
}
