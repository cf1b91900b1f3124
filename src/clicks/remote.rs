use anyhow::Result;
use async_trait::async_trait;

use super::model::RemoteClickRow;

/// Persistent click storage shared across devices.
///
/// Rows come back with raw topic labels; the store canonicalizes them.
/// Implementations must treat `(user_id, canonical topic, date_key,
/// hr_number, number_value)` as unique so an upsert never duplicates.
#[async_trait]
pub trait ClickRemote: Send + Sync {
    async fn get_all_clicks_for_user_date(
        &self,
        user_id: &str,
        date_key: &str,
    ) -> Result<Vec<RemoteClickRow>>;

    async fn upsert_click(&self, row: &RemoteClickRow) -> Result<()>;

    async fn clear_for_date(&self, user_id: &str, date_key: &str) -> Result<()>;
}
