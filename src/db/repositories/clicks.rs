use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::clicks::{ClickRemote, RemoteClickRow};
use crate::db::{
    connection::Database,
    helpers::{hr_column, parse_datetime, topic_key_column},
    models::{ClickStatistics, StoredClick},
};

fn row_to_click(row: &Row) -> Result<RemoteClickRow> {
    Ok(RemoteClickRow {
        user_id: row.get("user_id")?,
        set_name: row.get("set_name")?,
        date_key: row.get("date_key")?,
        number_value: row.get("number_value")?,
        hr_number: row.get("hr_number")?,
        is_clicked: row.get("is_clicked")?,
        is_present: row.get("is_present")?,
    })
}

fn row_to_stored(row: &Row) -> Result<StoredClick> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(StoredClick {
        id: row.get("id")?,
        row: row_to_click(row)?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Clicks for one user and date, in insertion order.
    pub async fn fetch_clicks(&self, user_id: &str, date_key: &str) -> Result<Vec<StoredClick>> {
        let user_id = user_id.to_string();
        let date_key = date_key.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, set_name, date_key, number_value, hr_number,
                        is_clicked, is_present, created_at, updated_at
                 FROM topic_clicks
                 WHERE user_id = ?1 AND date_key = ?2
                 ORDER BY created_at ASC, rowid ASC",
            )?;

            let mut rows = stmt.query(params![user_id, date_key])?;
            let mut clicks = Vec::new();
            while let Some(row) = rows.next()? {
                clicks.push(row_to_stored(row)?);
            }
            Ok(clicks)
        })
        .await
        .context("failed to fetch clicks")
    }

    /// Insert or update on the canonical key; annotated and clean labels of
    /// the same topic share one row.
    pub async fn upsert_click_row(&self, click: &RemoteClickRow) -> Result<()> {
        let click = click.clone();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO topic_clicks (id, user_id, set_name, topic_key, date_key, number_value,
                                           hr_number, is_clicked, is_present, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                 ON CONFLICT (user_id, topic_key, date_key, hr_number, number_value) DO UPDATE SET
                     set_name = excluded.set_name,
                     is_clicked = excluded.is_clicked,
                     is_present = excluded.is_present,
                     updated_at = excluded.updated_at",
                params![
                    Uuid::new_v4().to_string(),
                    click.user_id,
                    click.set_name,
                    topic_key_column(&click.set_name),
                    click.date_key,
                    click.number_value,
                    hr_column(&click.hr_number),
                    click.is_clicked,
                    click.is_present,
                    now,
                ],
            )
            .with_context(|| format!("failed to upsert click for {}", click.set_name))?;
            Ok(())
        })
        .await
    }

    /// Returns the number of rows removed.
    pub async fn delete_clicks_for_date(&self, user_id: &str, date_key: &str) -> Result<usize> {
        let user_id = user_id.to_string();
        let date_key = date_key.to_string();
        self.execute(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM topic_clicks WHERE user_id = ?1 AND date_key = ?2",
                    params![user_id, date_key],
                )
                .context("failed to delete clicks")?;
            Ok(removed)
        })
        .await
    }

    pub async fn click_statistics(&self, user_id: &str) -> Result<ClickStatistics> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let stats = conn
                .query_row(
                    "SELECT COUNT(*),
                            COALESCE(SUM(is_clicked), 0),
                            COALESCE(SUM(is_present), 0),
                            COUNT(DISTINCT date_key),
                            COUNT(DISTINCT hr_number)
                     FROM topic_clicks
                     WHERE user_id = ?1",
                    params![user_id],
                    |row| {
                        Ok(ClickStatistics {
                            total_clicks: row.get::<_, i64>(0)?.max(0) as u64,
                            clicked_count: row.get::<_, i64>(1)?.max(0) as u64,
                            present_count: row.get::<_, i64>(2)?.max(0) as u64,
                            date_count: row.get::<_, i64>(3)?.max(0) as u64,
                            hr_count: row.get::<_, i64>(4)?.max(0) as u64,
                        })
                    },
                )
                .context("failed to compute click statistics")?;
            Ok(stats)
        })
        .await
    }
}

#[async_trait]
impl ClickRemote for Database {
    async fn get_all_clicks_for_user_date(
        &self,
        user_id: &str,
        date_key: &str,
    ) -> Result<Vec<RemoteClickRow>> {
        let stored = self.fetch_clicks(user_id, date_key).await?;
        Ok(stored.into_iter().map(|click| click.row).collect())
    }

    async fn upsert_click(&self, row: &RemoteClickRow) -> Result<()> {
        self.upsert_click_row(row).await
    }

    async fn clear_for_date(&self, user_id: &str, date_key: &str) -> Result<()> {
        self.delete_clicks_for_date(user_id, date_key).await.map(|_| ())
    }
}
