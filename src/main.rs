use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use allevents_crawl::{http_crawler, CrawlConfig, EventRecord, Store};

#[derive(Parser)]
#[command(name = "allevents-crawl")]
#[command(about = "Crawl upcoming city events from allevents.in")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the listing and store every event inside the date window
    Crawl(CrawlArgs),
    /// List stored events that have coordinates
    Events,
    /// Show one stored event
    Event {
        id: i64,
    },
}

#[derive(clap::Args)]
struct CrawlArgs {
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    max_pages: Option<usize>,
    #[arg(long)]
    max_days_ahead: Option<i64>,
    #[arg(long)]
    max_in_flight: Option<usize>,
    #[arg(long)]
    delay_ms: Option<u64>,
    /// Print emitted records as JSON lines
    #[arg(long)]
    json: bool,
    /// Skip writing to the local database
    #[arg(long)]
    no_store: bool,
}

impl CrawlArgs {
    fn apply(&self, config: &mut CrawlConfig) {
        if let Some(city) = &self.city {
            config.city = city.clone();
        }
        if let Some(value) = self.max_pages {
            config.max_pages = value;
        }
        if let Some(value) = self.max_days_ahead {
            config.max_days_ahead = value;
        }
        if let Some(value) = self.max_in_flight {
            config.max_in_flight = value;
        }
        if let Some(value) = self.delay_ms {
            config.request_delay_ms = value;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("allevents_crawl=info".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Crawl(args) => crawl(args).await,
        Commands::Events => {
            let store = Store::open_default().context("unable to open database")?;
            let pins = store.list_mappable()?;
            println!("{}", serde_json::to_string_pretty(&pins)?);
            Ok(())
        }
        Commands::Event { id } => {
            let store = Store::open_default().context("unable to open database")?;
            match store.event_detail(id)? {
                Some(detail) => println!("{}", serde_json::to_string_pretty(&detail)?),
                None => anyhow::bail!("no servable event with id {id}"),
            }
            Ok(())
        }
    }
}

async fn crawl(args: CrawlArgs) -> Result<()> {
    let mut config = CrawlConfig::load()?;
    args.apply(&mut config);

    let store = if args.no_store {
        None
    } else {
        Some(Store::open_default().context("unable to open database")?)
    };
    let crawler = http_crawler(&config)?;

    let (tx, mut rx) = mpsc::channel::<EventRecord>(64);
    let consume = async {
        let mut stored = 0usize;
        while let Some(record) = rx.recv().await {
            if args.json {
                println!("{}", serde_json::to_string(&record)?);
            }
            if let Some(store) = &store {
                store
                    .upsert_event(&record)
                    .with_context(|| format!("failed to persist event {}", record.event_key))?;
                stored += 1;
            }
            tracing::debug!(key = %record.event_key, title = %record.title(), "event accepted");
        }
        Ok::<usize, anyhow::Error>(stored)
    };
    let (stats, stored) = tokio::join!(crawler.run(tx), consume);
    let stored = stored?;

    tracing::info!(
        emitted = stats.emitted,
        stored,
        dropped = stats.dropped,
        failed = stats.failed,
        stopped_at_cutoff = stats.stopped_at_cutoff,
        "crawl complete"
    );
    Ok(())
}
