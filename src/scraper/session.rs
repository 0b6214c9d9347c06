use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thirtyfour::By;

use crate::error::SessionError;

/// One way of finding an element. Lists of locators are tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub name: String,
    #[serde(flatten)]
    pub strategy: Strategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Css(String),
    Xpath(String),
}

impl Locator {
    pub fn css(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategy: Strategy::Css(selector.into()),
        }
    }

    pub fn xpath(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategy: Strategy::Xpath(expr.into()),
        }
    }

    pub fn to_by(&self) -> By {
        match &self.strategy {
            Strategy::Css(s) => By::Css(s.clone()),
            Strategy::Xpath(x) => By::XPath(x.clone()),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// What the export pipeline needs from a browser.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), SessionError>;

    /// Waits until one of `any_of` is displayed and enabled and returns the
    /// index of the first such locator. Nothing is clicked.
    async fn find_clickable(&self, any_of: &[Locator], timeout: Duration) -> Result<usize, SessionError>;

    /// Clicks the first of `any_of` that becomes clickable within `timeout`
    /// and returns its index.
    async fn click_first(&self, any_of: &[Locator], timeout: Duration) -> Result<usize, SessionError>;

    /// Types `text` into the first of `any_of` that becomes usable.
    async fn fill_first(&self, any_of: &[Locator], text: &str, timeout: Duration) -> Result<usize, SessionError>;

    async fn quit(&self) -> Result<(), SessionError>;
}
