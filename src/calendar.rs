use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// A calendar date in `YYYY-MM-DD` form.
///
/// Ordering follows the calendar, which matches lexical order of the ISO string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn parse(raw: &str) -> Result<Self> {
        NaiveDate::parse_from_str(raw.trim(), DATE_KEY_FORMAT)
            .map(Self)
            .with_context(|| format!("invalid date key '{raw}', expected YYYY-MM-DD"))
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_KEY_FORMAT))
    }
}

impl FromStr for DateKey {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        Self::parse(raw)
    }
}

impl TryFrom<String> for DateKey {
    type Error = anyhow::Error;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<DateKey> for String {
    fn from(key: DateKey) -> Self {
        key.to_string()
    }
}
