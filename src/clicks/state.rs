use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::calendar::DateKey;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ReloadStatus {
    Idle,
    Loading,
    Applying,
    Failed,
}

impl Default for ReloadStatus {
    fn default() -> Self {
        ReloadStatus::Idle
    }
}

/// Reload state machine: `Idle -> Loading -> (Applying | Failed) -> Idle`.
///
/// Every `begin` hands out a fresh token; only the holder of the latest token
/// may apply its response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadState {
    pub status: ReloadStatus,
    pub date_key: Option<DateKey>,
    pub token: u64,
    pub last_error: Option<String>,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl Default for ReloadState {
    fn default() -> Self {
        Self {
            status: ReloadStatus::Idle,
            date_key: None,
            token: 0,
            last_error: None,
            last_completed_at: None,
        }
    }
}

impl ReloadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, date_key: DateKey) -> u64 {
        self.token += 1;
        self.status = ReloadStatus::Loading;
        self.date_key = Some(date_key);
        self.last_error = None;
        self.token
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.token == token && self.status == ReloadStatus::Loading
    }

    pub fn start_applying(&mut self, token: u64) -> bool {
        if !self.is_current(token) {
            return false;
        }
        self.status = ReloadStatus::Applying;
        true
    }

    pub fn finish(&mut self, token: u64) {
        if self.token == token {
            self.status = ReloadStatus::Idle;
            self.last_completed_at = Some(Utc::now());
        }
    }

    pub fn fail(&mut self, token: u64, error: String) {
        if self.token == token {
            self.status = ReloadStatus::Failed;
            self.last_error = Some(error);
        }
    }

    /// `Failed -> Idle` once the failure has been reported.
    pub fn settle(&mut self, token: u64) {
        if self.token == token && self.status == ReloadStatus::Failed {
            self.status = ReloadStatus::Idle;
        }
    }

    /// Retire any outstanding token so its response is dropped.
    pub fn invalidate(&mut self) {
        self.token += 1;
        self.status = ReloadStatus::Idle;
    }
}
