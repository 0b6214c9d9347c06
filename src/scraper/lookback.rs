use anyhow::{Context, Result};
use chrono::{Months, NaiveDate};
use reqwest::Url;
use std::collections::BTreeMap;

/// Query parameter carrying the lookback date.
pub const LOOKBACK_PARAM: &str = "lookback_day";

/// Which reporting period an export covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lookback {
    #[default]
    Current,
    MonthsBack(u32),
}

impl Lookback {
    /// The `lookback_day` to request, or `None` for the current period.
    pub fn day(self, today: NaiveDate) -> Result<Option<NaiveDate>> {
        match self {
            Self::Current => Ok(None),
            Self::MonthsBack(n) => target_date(today, n).map(Some),
        }
    }
}

impl From<Option<u32>> for Lookback {
    fn from(months_back: Option<u32>) -> Self {
        months_back.map_or(Self::Current, Self::MonthsBack)
    }
}

/// `today` moved back by whole calendar months, clamped to the month's end.
pub fn target_date(today: NaiveDate, months_back: u32) -> Result<NaiveDate> {
    today
        .checked_sub_months(Months::new(months_back))
        .with_context(|| format!("Cannot go back {} months from {}", months_back, today))
}

/// Report URL with the fixed parameters and, when given, the lookback day.
pub fn build_url(base: &str, params: &BTreeMap<String, String>, lookback: Option<NaiveDate>) -> Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("Invalid report URL '{}'", base))?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in params.iter().filter(|(k, _)| k.as_str() != LOOKBACK_PARAM) {
            query.append_pair(key, value);
        }
        if let Some(date) = lookback {
            query.append_pair(LOOKBACK_PARAM, &date.format("%Y-%m-%d").to_string());
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(url)
}
