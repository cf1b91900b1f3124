use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clicks::RemoteClickRow;

/// A `topic_clicks` row with its bookkeeping columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredClick {
    pub id: String,
    pub row: RemoteClickRow,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-user totals across every stored click.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClickStatistics {
    pub total_clicks: u64,
    pub clicked_count: u64,
    pub present_count: u64,
    pub date_count: u64,
    pub hr_count: u64,
}
