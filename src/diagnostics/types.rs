use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticKind {
    UnrecognizedTopic,
    TopicCollision,
    MalformedCell,
    MissingHourSelection,
    RejectedClickRow,
    LoadCoalesced,
    LoadSuperseded,
    LoadFailed,
    SaveFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: DiagnosticKind,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataQualityCounters {
    pub missing_cells: u64,
    pub malformed_cells: u64,
    pub unrecognized_topics: u64,
    pub topic_collisions: u64,
    pub missing_hour_selections: u64,
    pub rejected_click_rows: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReloadCounters {
    pub loads_applied: u64,
    pub loads_coalesced: u64,
    pub loads_superseded: u64,
    pub loads_failed: u64,
    pub saves_failed: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub data_quality: DataQualityCounters,
    pub reloads: ReloadCounters,
    pub recent_events: Vec<DiagnosticEvent>,
}
