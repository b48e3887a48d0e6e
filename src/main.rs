use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use tao_watcher::catalog;
use tao_watcher::config::{AppConfig, DEFAULT_CONFIG_FILE};
use tao_watcher::harvest::CookieHarvester;
use tao_watcher::job_store::{ClaimLog, CsvJobStore};
use tao_watcher::plugins::notifiers::WxPusherNotifier;
use tao_watcher::price_history::PriceHistoryStore;
use tao_watcher::product_manager::{expected_pacing, PriceMonitor};
use tao_watcher::report::SimplePushReporter;
use tao_watcher::scheduler::RewardClaimer;
use tao_watcher::scraper::ChromeSession;

#[derive(Parser)]
#[command(name = "tao-watcher", version, about = "Taobao price watcher and reward helper")]
struct Cli {
    /// Path of the JSON config file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract product links from a saved search or favourites page
    Extract {
        html_file: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check every product once and record price changes
    Monitor {
        /// Product CSV; defaults to the newest extracted list
        #[arg(long)]
        products: Option<PathBuf>,
        /// Push the report when the pass is done
        #[arg(long)]
        push: bool,
        #[arg(long)]
        spt: Option<String>,
    },
    /// Push the current price history without monitoring
    Report {
        #[arg(long)]
        spt: Option<String>,
    },
    /// Log in through a browser window and store the session cookies of the next job
    Harvest,
    /// Claim the reward of the next harvested job at every top of the hour
    Claim,
}

fn init_tracing(log_dir: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, "tao-watcher.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tao_watcher=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_dir = cli
        .config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("logs");
    let _guard = init_tracing(&log_dir);

    let config = AppConfig::load_or_init(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    info!("Starting Tao Watcher...");

    match cli.command {
        // the harvester reacts to Ctrl-C itself so the job row is always closed
        Command::Harvest => run(Command::Harvest, &config).await?,
        command => tokio::select! {
            result = run(command, &config) => result?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down...");
            }
        },
    }

    Ok(())
}

async fn run(command: Command, config: &AppConfig) -> Result<()> {
    match command {
        Command::Extract { html_file, output } => {
            let output = output.unwrap_or_else(|| catalog::default_output_path(config.data_dir()));
            let products = catalog::extract_product_file(&html_file, &output)
                .with_context(|| format!("Failed to extract products from {}", html_file.display()))?;
            info!(count = products.len(), output = %output.display(), "Products extracted");
        }
        Command::Monitor { products, push, spt } => {
            let products_file = match products {
                Some(path) => path,
                None => catalog::latest_product_file(&config.data_dir().join(catalog::EXTRACTED_DIR))
                    .context("No product list given and none extracted yet")?,
            };
            let products = catalog::read_products(&products_file)
                .with_context(|| format!("Failed to read products from {}", products_file.display()))?;
            info!(
                count = products.len(),
                file = %products_file.display(),
                "Loaded products, pauses add up to at most {}s",
                expected_pacing(&config.monitor, products.len()).as_secs()
            );

            let session = ChromeSession::launch(
                &config.browser,
                Some(&config.directories.browser_data_dir),
                None,
            )
            .context("Failed to start the browser")?;

            let notifier = WxPusherNotifier::new(config.wx_push.api_url.clone());
            let mut monitor = PriceMonitor::from_config(config)
                .with_reporter(SimplePushReporter::from_config(config, Box::new(notifier)));

            let summary = monitor
                .monitor_prices(&session, &products, push, spt.as_deref())
                .await;
            info!(
                checked = summary.results.len(),
                recorded = summary.recorded(),
                new_items = summary.new_items(),
                changes = summary.changes.len(),
                "Monitoring pass finished"
            );
        }
        Command::Report { spt } => {
            let history = PriceHistoryStore::in_dir(config.data_dir());
            let notifier = WxPusherNotifier::new(config.wx_push.api_url.clone());
            let reporter = SimplePushReporter::from_config(config, Box::new(notifier));
            if !reporter.send_price_report(spt.as_deref(), &history, &[]).await {
                anyhow::bail!("Report was not delivered");
            }
        }
        Command::Harvest => {
            let store = CsvJobStore::in_dir(&config.directories.records_dir);
            store.ensure_exists().context("Failed to prepare the record file")?;

            // The user has to log in by hand, so the window must be visible.
            let session = ChromeSession::launch(&config.browser, None, Some(false))
                .context("Failed to start the browser")?;
            let harvester = CookieHarvester::new(config.harvest.clone(), Box::new(store));
            match harvester.harvest_next(&session).await? {
                Some(report) => info!(row = report.row + 2, state = %report.state1, "Harvest finished"),
                None => info!("Nothing to harvest"),
            }
        }
        Command::Claim => {
            let store = CsvJobStore::in_dir(&config.directories.records_dir);
            store.ensure_exists().context("Failed to prepare the record file")?;

            let session = ChromeSession::launch(&config.browser, None, None)
                .context("Failed to start the browser")?;
            let claimer = RewardClaimer::new(
                config.claim.clone(),
                config.harvest.key_cookies.clone(),
                Box::new(store),
                ClaimLog::in_dir(&config.directories.records_dir),
            );
            claimer.run(&session).await?;
        }
    }

    Ok(())
}
