use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use rate_sheet_sync::config::{AppConfig, Credentials};
use rate_sheet_sync::scraper::{BrowserDriver, ExportEngine};
use rate_sheet_sync::sheets::{GoogleSheetsClient, SheetSyncer, SyncMode, SyncTarget};
use rate_sheet_sync::watcher::{ExportJob, WatchRules};

#[derive(Parser)]
#[command(name = "rate-sheet-sync", version, about = "Export rate tables and mirror them into a spreadsheet")]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true, env = "RATE_SYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in, export every configured period and sync each to its tab
    Run {
        /// Only run periods whose tab title matches
        #[arg(long = "tab")]
        tabs: Vec<String>,
        /// Date the lookback periods are computed from (YYYY-MM-DD)
        #[arg(long)]
        today: Option<NaiveDate>,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },
    /// Wait for a new download to finish in a directory and print its path
    Watch {
        dir: PathBuf,
        #[arg(long, default_value = ".xlsx")]
        suffix: String,
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },
    /// Sync a local spreadsheet or CSV file into a tab
    Sync {
        file: PathBuf,
        #[arg(long)]
        tab: String,
        /// Overrides document_id from the config
        #[arg(long)]
        document: Option<String>,
        #[arg(long, value_enum)]
        mode: Option<SyncMode>,
    },
    /// Write a config file with default values
    InitConfig,
    /// Validate the config file
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => AppConfig::config_path()?,
    };

    match cli.command {
        Command::InitConfig => {
            if config_path.exists() {
                anyhow::bail!("Config already exists at {:?}", config_path);
            }
            AppConfig::default().save_to(&config_path)?;
            println!("{}", config_path.display());
        }
        Command::CheckConfig => {
            let config = AppConfig::load_or_default(&config_path)?;
            let errors = config.validate();
            if !errors.is_empty() {
                for error in &errors {
                    tracing::error!("{}", error);
                }
                anyhow::bail!("{} configuration error(s)", errors.len());
            }
            tracing::info!(path = %config_path.display(), "Config is valid");
        }
        Command::Watch {
            dir,
            suffix,
            timeout_secs,
        } => {
            let job = ExportJob::begin(dir, WatchRules::new(suffix), Duration::from_secs(timeout_secs))?;
            let path = job.await_new_file().await?;
            println!("{}", path.display());
        }
        Command::Sync {
            file,
            tab,
            document,
            mode,
        } => {
            let config = AppConfig::load_or_default(&config_path)?;
            let document_id = document.unwrap_or_else(|| config.document_id.clone());
            if document_id.is_empty() {
                anyhow::bail!("No document id: pass --document or set document_id");
            }
            let syncer = SheetSyncer::new(GoogleSheetsClient::new(config.service_account_key()?));
            let report = syncer
                .sync_file(
                    &file,
                    &SyncTarget::new(document_id, tab),
                    mode.unwrap_or(config.default_mode),
                )
                .await?;
            tracing::info!(?report, "Sync complete");
        }
        Command::Run { tabs, today, headed } => {
            let mut config = AppConfig::load_or_default(&config_path)?;
            if headed {
                config.headless_mode = false;
            }
            if !tabs.is_empty() {
                config.periods.retain(|p| tabs.contains(&p.tab_title));
            }

            let errors = config.validate();
            if !errors.is_empty() {
                anyhow::bail!("Invalid configuration: {}", errors.join("; "));
            }

            let credentials = Credentials::from_env()?;
            let syncer = SheetSyncer::new(GoogleSheetsClient::new(config.service_account_key()?));
            let browser = BrowserDriver::new(&config.webdriver_url, config.headless_mode, &config.download_dir).await?;

            let today = today.unwrap_or_else(|| chrono::Local::now().date_naive());
            let engine = ExportEngine::new(browser, syncer, config);
            let summary = engine.run(&credentials, today).await?;

            for outcome in &summary.outcomes {
                match &outcome.result {
                    Ok((path, report)) => println!(
                        "ok    {:<24} {} rows from {}",
                        outcome.tab_title,
                        report.rows_written,
                        path.display()
                    ),
                    Err(e) => println!("FAIL  {:<24} {:#}", outcome.tab_title, e),
                }
            }
            if summary.failed() > 0 {
                anyhow::bail!("{} of {} period(s) failed", summary.failed(), summary.outcomes.len());
            }
        }
    }

    Ok(())
}
