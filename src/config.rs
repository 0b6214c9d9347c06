use anyhow::{Context, Result};
use directories::ProjectDirs;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scraper::lookback::Lookback;
use crate::scraper::Locator;
use crate::sheets::auth::ServiceAccountKey;
use crate::sheets::{SyncMode, SyncTarget};
use crate::watcher::WatchRules;

pub const USERNAME_ENV: &str = "RATE_SYNC_USERNAME";
pub const PASSWORD_ENV: &str = "RATE_SYNC_PASSWORD";
pub const SERVICE_ACCOUNT_ENV: &str = "GCP_SA_KEY";

/// One lookback period and the tab its rows go to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodConfig {
    pub tab_title: String,
    /// `None` exports the current period.
    #[serde(default)]
    pub months_back: Option<u32>,
    #[serde(default)]
    pub mode: Option<SyncMode>,
}

impl PeriodConfig {
    pub fn lookback(&self) -> Lookback {
        Lookback::from(self.months_back)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selectors {
    pub username: Vec<Locator>,
    pub username_submit: Vec<Locator>,
    pub password: Vec<Locator>,
    pub password_submit: Vec<Locator>,
    pub export_button: Vec<Locator>,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            username: vec![Locator::css("username field", "#username")],
            username_submit: vec![
                Locator::css("identifier continue", "button[name=\"action\"]._button-login-id"),
                Locator::css("any submit", "button[type=\"submit\"]"),
            ],
            password: vec![Locator::css("password field", "#password")],
            password_submit: vec![
                Locator::css("password continue", "button[name=\"action\"]._button-login-password"),
                Locator::css("any submit", "button[type=\"submit\"]"),
            ],
            export_button: vec![
                Locator::css("data-qa-id", "button[data-qa-id=\"excel-export-button\"]"),
                Locator::xpath("header button", "//*[@id=\"root\"]/div/div[1]/div/header/div[2]/div/button[1]"),
                Locator::xpath("text contains Excel", "//button[contains(., 'Excel')]"),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub login_url: String,
    pub report_url: String,
    pub report_params: BTreeMap<String, String>,
    pub webdriver_url: String,
    pub headless_mode: bool,
    pub element_timeout_secs: u64,
    pub download_dir: PathBuf,
    pub download_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub file_suffix: String,
    pub partial_suffixes: Vec<String>,
    pub file_name_pattern: Option<String>,
    pub require_unambiguous: bool,
    pub document_id: String,
    pub default_mode: SyncMode,
    pub periods: Vec<PeriodConfig>,
    pub service_account_file: Option<PathBuf>,
    pub selectors: Selectors,
}

impl Default for AppConfig {
    fn default() -> Self {
        let report_params = [
            ("market_metric", "mean"),
            ("market_filter_length", "short"),
            ("company_filter_length", "all"),
            ("thc_meth", "user"),
            ("bump_level_max", "100"),
            ("selectedTable", "all"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            login_url: "https://auth.xeneta.com/login".to_string(),
            report_url: "https://app.xeneta.com/ocean/analyze/rate".to_string(),
            report_params,
            webdriver_url: "http://localhost:9515".to_string(),
            headless_mode: true,
            element_timeout_secs: 90,
            download_dir: std::env::temp_dir().join("rate-sheet-sync"),
            download_timeout_secs: 120,
            poll_interval_ms: 1000,
            file_suffix: ".xlsx".to_string(),
            partial_suffixes: crate::watcher::DEFAULT_PARTIAL_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            file_name_pattern: None,
            require_unambiguous: false,
            document_id: String::new(),
            default_mode: SyncMode::Replace,
            periods: vec![PeriodConfig {
                tab_title: "Data".to_string(),
                months_back: None,
                mode: None,
            }],
            service_account_file: None,
            selectors: Selectors::default(),
        }
    }
}

impl AppConfig {
    /// Loads `path`, or the defaults when the file does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            tracing::warn!(path = %path.display(), "No config file found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read config {:?}", path))?;
        let config: Self =
            serde_json::from_str(&content).with_context(|| format!("Failed to parse config {:?}", path))?;
        tracing::debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write config {:?}", path))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "ratesync", "rate-sheet-sync")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(proj_dirs.config_dir().join("config.json"))
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn watch_rules(&self) -> Result<WatchRules> {
        let mut rules = WatchRules::new(&self.file_suffix).with_partial_suffixes(self.partial_suffixes.clone());
        if let Some(pattern) = &self.file_name_pattern {
            let re = Regex::new(pattern).with_context(|| format!("Invalid file_name_pattern '{}'", pattern))?;
            rules = rules.with_name_pattern(re);
        }
        Ok(rules)
    }

    pub fn target_for(&self, period: &PeriodConfig) -> SyncTarget {
        SyncTarget::new(&self.document_id, &period.tab_title)
    }

    pub fn mode_for(&self, period: &PeriodConfig) -> SyncMode {
        period.mode.unwrap_or(self.default_mode)
    }

    /// Service account key from `GCP_SA_KEY` (JSON or base64) or the configured file.
    pub fn service_account_key(&self) -> Result<ServiceAccountKey> {
        if let Ok(raw) = std::env::var(SERVICE_ACCOUNT_ENV) {
            if !raw.trim().is_empty() {
                return ServiceAccountKey::parse(&raw).with_context(|| format!("Invalid {}", SERVICE_ACCOUNT_ENV));
            }
        }
        match &self.service_account_file {
            Some(path) => ServiceAccountKey::from_file(path),
            None => anyhow::bail!(
                "No service account key: set {} or service_account_file",
                SERVICE_ACCOUNT_ENV
            ),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.document_id.trim().is_empty() {
            errors.push("document_id is required".to_string());
        }

        if self.periods.is_empty() {
            errors.push("At least one period must be configured".to_string());
        }

        for (i, period) in self.periods.iter().enumerate() {
            if period.tab_title.trim().is_empty() {
                errors.push(format!("periods[{}].tab_title is required", i));
            }
        }

        if !self.file_suffix.starts_with('.') {
            errors.push("file_suffix must start with '.'".to_string());
        }

        if self.download_timeout_secs == 0 {
            errors.push("download_timeout_secs must be greater than zero".to_string());
        }

        if self.poll_interval_ms == 0 {
            errors.push("poll_interval_ms must be greater than zero".to_string());
        }

        if let Some(pattern) = &self.file_name_pattern {
            if let Err(e) = Regex::new(pattern) {
                errors.push(format!("file_name_pattern is invalid: {}", e));
            }
        }

        if self.selectors.export_button.is_empty() {
            errors.push("At least one export_button selector is required".to_string());
        }

        errors
    }
}

/// Login credentials, read from the environment only.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .with_context(|| format!("{} is not set", name))
        };
        Ok(Self {
            username: read(USERNAME_ENV)?,
            password: read(PASSWORD_ENV)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_need_a_document_id() {
        let errors = AppConfig::default().validate();
        assert_eq!(errors, vec!["document_id is required".to_string()]);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "document_id": "sheet-123",
                "default_mode": "append-dedupe",
                "periods": [
                    {"tab_title": "Data"},
                    {"tab_title": "1-Month-Back Data", "months_back": 1, "mode": "replace"}
                ]
            }"#,
        )
        .unwrap();

        assert!(config.validate().is_empty());
        assert_eq!(config.download_timeout(), Duration::from_secs(120));
        assert_eq!(config.mode_for(&config.periods[0]), SyncMode::AppendDedupe);
        assert_eq!(config.mode_for(&config.periods[1]), SyncMode::Replace);
        assert_eq!(config.target_for(&config.periods[1]), SyncTarget::new("sheet-123", "1-Month-Back Data"));
    }

    #[test]
    fn invalid_values_are_reported() {
        let config = AppConfig {
            document_id: "x".into(),
            file_suffix: "xlsx".into(),
            file_name_pattern: Some("(".into()),
            periods: Vec::new(),
            ..AppConfig::default()
        };

        let errors = config.validate();
        assert_eq!(errors.len(), 3);
        assert!(config.watch_rules().is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = AppConfig {
            document_id: "sheet-123".into(),
            file_name_pattern: Some("^rate_all_".into()),
            ..AppConfig::default()
        };

        config.save_to(&path).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();

        assert_eq!(loaded.document_id, "sheet-123");
        assert_eq!(loaded.selectors, Selectors::default());
        assert!(loaded.watch_rules().unwrap().is_complete("rate_all_1.xlsx"));
    }
}
