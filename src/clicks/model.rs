use std::fmt;

use serde::{Deserialize, Serialize};

use crate::calendar::DateKey;
use crate::hours::HrNumber;
use crate::topics::{TopicKey, TopicKeyResolver};

/// Canonical identity of a click. At most one record exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickKey {
    pub topic: TopicKey,
    pub date_key: DateKey,
    pub number: u32,
    pub hr: HrNumber,
}

impl fmt::Display for ClickKey {
    /// `D-3 Set-1_2025-06-05_7_HR1`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.topic, self.date_key, self.number, self.hr
        )
    }
}

/// One user interaction with a number box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickRecord {
    pub topic: TopicKey,
    pub date_key: DateKey,
    pub number: u32,
    pub hr: HrNumber,
    pub is_clicked: bool,
    pub is_present: bool,
}

impl ClickRecord {
    /// A freshly clicked box.
    pub fn clicked(topic: TopicKey, date_key: DateKey, number: u32, hr: HrNumber) -> Self {
        Self {
            topic,
            date_key,
            number,
            hr,
            is_clicked: true,
            is_present: false,
        }
    }

    pub fn with_presence(mut self, is_present: bool) -> Self {
        self.is_present = is_present;
        self
    }

    pub fn key(&self) -> ClickKey {
        ClickKey {
            topic: self.topic,
            date_key: self.date_key,
            number: self.number,
            hr: self.hr,
        }
    }

    /// Row for the remote store, labelled with the clean topic name.
    pub fn to_remote_row(&self, user_id: &str) -> RemoteClickRow {
        RemoteClickRow {
            user_id: user_id.to_string(),
            set_name: self.topic.display_name(),
            date_key: self.date_key.to_string(),
            number_value: i64::from(self.number),
            hr_number: self.hr.key_fragment(),
            is_clicked: self.is_clicked,
            is_present: self.is_present,
        }
    }

    /// Normalize a remote row; the topic label and hour arrive un-normalized.
    pub fn from_remote(
        row: &RemoteClickRow,
        resolver: &TopicKeyResolver,
    ) -> Result<Self, RejectedRow> {
        let topic = resolver
            .canonicalize(&row.set_name)
            .ok_or_else(|| RejectedRow::UnrecognizedTopic(row.set_name.clone()))?;
        let date_key = DateKey::parse(&row.date_key)
            .map_err(|_| RejectedRow::InvalidDate(row.date_key.clone()))?;
        let hr = HrNumber::parse(&row.hr_number)
            .map_err(|_| RejectedRow::InvalidHour(row.hr_number.clone()))?;
        let number = u32::try_from(row.number_value)
            .map_err(|_| RejectedRow::InvalidNumber(row.number_value))?;

        Ok(Self {
            topic,
            date_key,
            number,
            hr,
            is_clicked: row.is_clicked,
            is_present: row.is_present,
        })
    }
}

/// Shape exchanged with the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteClickRow {
    pub user_id: String,
    /// Raw, possibly annotated topic label
    pub set_name: String,
    pub date_key: String,
    pub number_value: i64,
    /// `HR1`, `hr 1` or `1`
    pub hr_number: String,
    pub is_clicked: bool,
    pub is_present: bool,
}

/// Why a remote row was skipped during reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectedRow {
    UnrecognizedTopic(String),
    InvalidDate(String),
    InvalidHour(String),
    InvalidNumber(i64),
}

impl fmt::Display for RejectedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectedRow::UnrecognizedTopic(label) => write!(f, "unrecognized topic {label:?}"),
            RejectedRow::InvalidDate(raw) => write!(f, "invalid date key {raw:?}"),
            RejectedRow::InvalidHour(raw) => write!(f, "invalid hour {raw:?}"),
            RejectedRow::InvalidNumber(value) => write!(f, "invalid number {value}"),
        }
    }
}
