use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::hours::HrNumber;
use crate::topics::TopicKeyResolver;

use super::model::RemoteClickRow;
use super::remote::ClickRemote;

/// Process-local [`ClickRemote`] for tests and offline use.
///
/// Rows are unique on the canonical key, like the SQLite remote. Failures can
/// be injected, and loads can be gated so a test decides when a response
/// "arrives".
pub struct InMemoryClickRemote {
    rows: Mutex<Vec<RemoteClickRow>>,
    resolver: TopicKeyResolver,
    load_gate: Option<Semaphore>,
    failing_loads: AtomicUsize,
    failing_saves: AtomicUsize,
    load_calls: AtomicUsize,
    save_calls: AtomicUsize,
}

impl Default for InMemoryClickRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryClickRemote {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            resolver: TopicKeyResolver::default(),
            load_gate: None,
            failing_loads: AtomicUsize::new(0),
            failing_saves: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
            save_calls: AtomicUsize::new(0),
        }
    }

    /// Loads snapshot their rows on entry, then wait for [`release_loads`].
    ///
    /// [`release_loads`]: Self::release_loads
    pub fn gated() -> Self {
        Self {
            load_gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn release_loads(&self, count: usize) {
        if let Some(gate) = &self.load_gate {
            gate.add_permits(count);
        }
    }

    /// Append a row as-is, without de-duplication.
    pub fn seed(&self, row: RemoteClickRow) {
        self.rows().push(row);
    }

    pub fn fail_next_loads(&self, count: usize) {
        self.failing_loads.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn row_count(&self) -> usize {
        self.rows().len()
    }

    fn rows(&self) -> MutexGuard<'_, Vec<RemoteClickRow>> {
        match self.rows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn same_key(&self, left: &RemoteClickRow, right: &RemoteClickRow) -> bool {
        left.user_id == right.user_id
            && left.date_key == right.date_key
            && left.number_value == right.number_value
            && self.topic_of(left) == self.topic_of(right)
            && hour_of(left) == hour_of(right)
    }

    fn topic_of(&self, row: &RemoteClickRow) -> String {
        self.resolver
            .canonicalize(&row.set_name)
            .map(|key| key.short_name())
            .unwrap_or_else(|| row.set_name.clone())
    }
}

fn hour_of(row: &RemoteClickRow) -> String {
    HrNumber::parse(&row.hr_number)
        .map(HrNumber::key_fragment)
        .unwrap_or_else(|_| row.hr_number.clone())
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ClickRemote for InMemoryClickRemote {
    async fn get_all_clicks_for_user_date(
        &self,
        user_id: &str,
        date_key: &str,
    ) -> Result<Vec<RemoteClickRow>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);

        let snapshot: Vec<RemoteClickRow> = self
            .rows()
            .iter()
            .filter(|row| row.user_id == user_id && row.date_key == date_key)
            .cloned()
            .collect();

        if let Some(gate) = &self.load_gate {
            gate.acquire()
                .await
                .context("load gate closed")?
                .forget();
        }

        if take_failure(&self.failing_loads) {
            bail!("simulated load failure for {user_id} on {date_key}");
        }

        Ok(snapshot)
    }

    async fn upsert_click(&self, row: &RemoteClickRow) -> Result<()> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);

        if take_failure(&self.failing_saves) {
            bail!("simulated save failure for {}", row.set_name);
        }

        let mut rows = self.rows();
        match rows.iter().position(|existing| self.same_key(existing, row)) {
            Some(index) => rows[index] = row.clone(),
            None => rows.push(row.clone()),
        }
        Ok(())
    }

    async fn clear_for_date(&self, user_id: &str, date_key: &str) -> Result<()> {
        self.rows()
            .retain(|row| !(row.user_id == user_id && row.date_key == date_key));
        Ok(())
    }
}
