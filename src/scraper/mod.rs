pub mod browser;
pub mod lookback;
pub mod session;

pub use browser::BrowserDriver;
pub use lookback::Lookback;
pub use session::{BrowserSession, Locator, Strategy};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::PathBuf;

use crate::config::{AppConfig, Credentials, PeriodConfig};
use crate::sheets::{SheetSyncer, SpreadsheetService, SyncReport};
use crate::watcher::ExportJob;

/// Result of exporting and syncing one period.
#[derive(Debug)]
pub struct PeriodOutcome {
    pub tab_title: String,
    pub lookback_day: Option<NaiveDate>,
    pub result: Result<(PathBuf, SyncReport)>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<PeriodOutcome>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.len() - self.failed()
    }
}

/// Logs in once, then exports and syncs every configured period in turn.
pub struct ExportEngine<B, S> {
    browser: B,
    syncer: SheetSyncer<S>,
    config: AppConfig,
}

impl<B: BrowserSession, S: SpreadsheetService> ExportEngine<B, S> {
    pub fn new(browser: B, syncer: SheetSyncer<S>, config: AppConfig) -> Self {
        Self {
            browser,
            syncer,
            config,
        }
    }

    pub fn syncer(&self) -> &SheetSyncer<S> {
        &self.syncer
    }

    /// Runs every period. A failing period does not stop the others; a failed
    /// login stops the run. The browser session is always closed.
    pub async fn run(&self, credentials: &Credentials, today: NaiveDate) -> Result<RunSummary> {
        let result = self.run_inner(credentials, today).await;
        if let Err(e) = self.browser.quit().await {
            tracing::warn!(error = %e, "Failed to close browser session");
        }
        result
    }

    async fn run_inner(&self, credentials: &Credentials, today: NaiveDate) -> Result<RunSummary> {
        let total = self.config.periods.len();
        tracing::info!(periods = total, "Starting export run");

        std::fs::create_dir_all(&self.config.download_dir)
            .with_context(|| format!("Failed to create download directory {:?}", self.config.download_dir))?;

        self.login(credentials).await.context("Login failed")?;

        let mut summary = RunSummary::default();
        for (i, period) in self.config.periods.iter().enumerate() {
            tracing::info!(step = i + 1, of = total, tab = %period.tab_title, months_back = ?period.months_back, "Exporting period");

            let lookback_day = period.lookback().day(today)?;
            let result = self.export_period(period, lookback_day).await;
            match &result {
                Ok((path, report)) => tracing::info!(
                    tab = %period.tab_title,
                    file = %path.display(),
                    rows = report.rows_written,
                    "Period synced"
                ),
                Err(e) => tracing::error!(tab = %period.tab_title, error = %format!("{:#}", e), "Period failed"),
            }
            summary.outcomes.push(PeriodOutcome {
                tab_title: period.tab_title.clone(),
                lookback_day,
                result,
            });
        }

        tracing::info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "Export run finished"
        );
        Ok(summary)
    }

    async fn login(&self, credentials: &Credentials) -> Result<()> {
        let selectors = &self.config.selectors;
        let timeout = self.config.element_timeout();

        self.browser.navigate(&self.config.login_url).await?;
        self.browser
            .fill_first(&selectors.username, &credentials.username, timeout)
            .await
            .context("Username field")?;
        self.browser
            .click_first(&selectors.username_submit, timeout)
            .await
            .context("Username submit")?;
        self.browser
            .fill_first(&selectors.password, &credentials.password, timeout)
            .await
            .context("Password field")?;
        self.browser
            .click_first(&selectors.password_submit, timeout)
            .await
            .context("Password submit")?;

        tracing::info!("Login completed");
        Ok(())
    }

    async fn export_period(&self, period: &PeriodConfig, lookback_day: Option<NaiveDate>) -> Result<(PathBuf, SyncReport)> {
        let url = lookback::build_url(&self.config.report_url, &self.config.report_params, lookback_day)?;
        self.browser.navigate(url.as_str()).await?;

        let export_button = &self.config.selectors.export_button;
        self.browser
            .find_clickable(export_button, self.config.element_timeout())
            .await
            .context("Report page did not load")?;

        let job = ExportJob::begin(
            &self.config.download_dir,
            self.config.watch_rules()?,
            self.config.download_timeout(),
        )?
        .with_poll_interval(self.config.poll_interval())
        .require_unambiguous(self.config.require_unambiguous);

        self.browser
            .click_first(export_button, self.config.element_timeout())
            .await
            .context("Export button")?;

        let path = job.await_new_file().await?;

        let report = self
            .syncer
            .sync_file(&path, &self.config.target_for(period), self.config.mode_for(period))
            .await?;
        Ok((path, report))
    }
}
