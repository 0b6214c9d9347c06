use async_trait::async_trait;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thirtyfour::prelude::*;
use tokio::time::sleep;

use super::session::{BrowserSession, Locator};
use crate::error::SessionError;

const CONNECT_ATTEMPTS: u32 = 3;
const FIND_INTERVAL: Duration = Duration::from_millis(500);

/// Chrome driven through a WebDriver server.
pub struct BrowserDriver {
    driver: WebDriver,
}

impl BrowserDriver {
    pub async fn new(webdriver_url: &str, headless: bool, download_dir: &Path) -> Result<Self, SessionError> {
        tracing::info!(webdriver_url, headless, download_dir = %download_dir.display(), "Starting browser session");

        let mut caps = DesiredCapabilities::chrome();

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let profile_dir = std::env::temp_dir().join(format!("rate-sheet-sync-profile-{}", stamp));

        let mut chrome_args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--window-size=1920,1080".to_string(),
            format!("--user-data-dir={}", profile_dir.display()),
        ];
        if headless {
            chrome_args.push("--headless=new".to_string());
        }
        for arg in &chrome_args {
            caps.add_arg(arg)?;
        }

        caps.add_experimental_option(
            "prefs",
            serde_json::json!({
                "download.default_directory": download_dir.display().to_string(),
                "download.prompt_for_download": false,
                "download.directory_upgrade": true,
                "safebrowsing.enabled": true,
            }),
        )?;

        let mut last_error = String::new();
        for attempt in 1..=CONNECT_ATTEMPTS {
            match WebDriver::new(webdriver_url, caps.clone()).await {
                Ok(driver) => {
                    tracing::info!("Connected to WebDriver");
                    return Ok(Self { driver });
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "WebDriver connection attempt failed");
                    last_error = e.to_string();
                    if attempt < CONNECT_ATTEMPTS {
                        sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        Err(SessionError::Connect {
            url: webdriver_url.to_string(),
            reason: last_error,
        })
    }

    /// Polls `any_of` in order until one element is displayed and enabled.
    async fn locate(&self, any_of: &[Locator], timeout: Duration) -> Result<(usize, WebElement), SessionError> {
        let start = Instant::now();
        loop {
            for (index, locator) in any_of.iter().enumerate() {
                tracing::debug!(locator = %locator, "Looking for element");
                let Ok(element) = self.driver.find(locator.to_by()).await else {
                    continue;
                };
                if element.is_displayed().await.unwrap_or(false) && element.is_enabled().await.unwrap_or(false) {
                    tracing::debug!(locator = %locator, "Element found");
                    return Ok((index, element));
                }
            }

            if start.elapsed() >= timeout {
                return Err(SessionError::NotFound {
                    tried: any_of.iter().map(|l| l.name.clone()).collect(),
                    timeout,
                });
            }
            sleep(FIND_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BrowserSession for BrowserDriver {
    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        tracing::info!(url, "Navigating");
        self.driver.goto(url).await?;
        Ok(())
    }

    async fn find_clickable(&self, any_of: &[Locator], timeout: Duration) -> Result<usize, SessionError> {
        let (index, _) = self.locate(any_of, timeout).await?;
        Ok(index)
    }

    async fn click_first(&self, any_of: &[Locator], timeout: Duration) -> Result<usize, SessionError> {
        let (index, element) = self.locate(any_of, timeout).await?;

        // Overlays can intercept native clicks; fall back to a script click
        if let Err(e) = element.click().await {
            tracing::debug!(error = %e, "Native click failed, using script click");
            self.driver
                .execute("arguments[0].click();", vec![serde_json::json!(element)])
                .await?;
        }
        tracing::info!(locator = %any_of[index], "Clicked");
        Ok(index)
    }

    async fn fill_first(&self, any_of: &[Locator], text: &str, timeout: Duration) -> Result<usize, SessionError> {
        let (index, element) = self.locate(any_of, timeout).await?;
        element.clear().await?;
        element.send_keys(text).await?;
        Ok(index)
    }

    async fn quit(&self) -> Result<(), SessionError> {
        self.driver.clone().quit().await?;
        tracing::info!("Browser session closed");
        Ok(())
    }
}
