use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::calendar::DateKey;
use crate::diagnostics::{DiagnosticKind, DiagnosticsCollector};
use crate::hours::HrNumber;
use crate::topics::{TopicKey, TopicKeyResolver};

use super::model::{ClickKey, ClickRecord, RemoteClickRow};
use super::remote::ClickRemote;
use super::state::ReloadState;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const DEFAULT_SAVE_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickStoreConfig {
    /// Remote upsert attempts per save, including the first
    pub save_attempts: u32,
    /// Delay before the first retry; doubles on each further retry
    pub retry_base_delay: Duration,
}

impl Default for ClickStoreConfig {
    fn default() -> Self {
        Self {
            save_attempts: DEFAULT_SAVE_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSummary {
    pub date_key: DateKey,
    pub token: u64,
    /// Records held for the date after the load
    pub records: usize,
    /// Rows dropped because they could not be normalized
    pub skipped: usize,
    /// Rows that normalized onto a key already seen in the same response
    pub duplicates: usize,
    /// Local records kept over the response (pending or newer saves)
    pub kept_local: usize,
}

/// How a `load` ended. Concurrent reloads are never errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum LoadOutcome {
    Applied(LoadSummary),
    /// Joined a load for the same date that was already in flight.
    Coalesced(LoadSummary),
    /// Retired by a newer load or a clear; nothing was applied.
    Superseded { token: u64 },
}

impl LoadOutcome {
    pub fn summary(&self) -> Option<&LoadSummary> {
        match self {
            LoadOutcome::Applied(summary) | LoadOutcome::Coalesced(summary) => Some(summary),
            LoadOutcome::Superseded { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickStoreSnapshot {
    pub user_id: String,
    pub record_count: usize,
    pub pending: Vec<ClickKey>,
    pub reload: ReloadState,
}

type SharedOutcome = Result<LoadOutcome, String>;

enum Push {
    Stored,
    /// A newer save or a clear owns the key now
    Overtaken,
}

struct InflightLoad {
    token: u64,
    date_key: DateKey,
    cancel: CancellationToken,
    done: watch::Receiver<Option<SharedOutcome>>,
}

#[derive(Default)]
struct StoreInner {
    clicks: HashMap<ClickKey, ClickRecord>,
    reload: ReloadState,
    inflight: Option<InflightLoad>,
    /// Keys whose latest local value the remote has not confirmed
    pending: HashSet<ClickKey>,
    /// Bumped on every local write and every remote confirmation
    write_seq: u64,
    written_at: HashMap<ClickKey, u64>,
    /// Sequence of the write that owns each key; older pushes give way to it
    generations: HashMap<ClickKey, u64>,
}

impl StoreInner {
    fn write_local(&mut self, record: ClickRecord) -> u64 {
        self.write_seq += 1;
        let key = record.key();
        self.written_at.insert(key, self.write_seq);
        self.generations.insert(key, self.write_seq);
        self.pending.insert(key);
        self.clicks.insert(key, record);
        self.write_seq
    }

    fn owns(&self, key: &ClickKey, generation: u64) -> bool {
        self.generations.get(key) == Some(&generation)
    }

    /// Returns false when a newer write or a clear took the key over.
    fn confirm(&mut self, key: ClickKey, generation: u64) -> bool {
        if !self.owns(&key, generation) {
            return false;
        }
        self.pending.remove(&key);
        self.write_seq += 1;
        self.written_at.insert(key, self.write_seq);
        true
    }

    fn is_protected(&self, key: &ClickKey, started_seq: u64) -> bool {
        self.pending.contains(key)
            || self
                .written_at
                .get(key)
                .is_some_and(|seq| *seq > started_seq)
    }

    fn take_inflight(&mut self, token: u64) -> Option<InflightLoad> {
        if self.inflight.as_ref().is_some_and(|load| load.token == token) {
            self.inflight.take()
        } else {
            None
        }
    }
}

/// In-memory click state for one user, mirrored to a [`ClickRemote`].
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct ClickStateStore {
    user_id: Arc<str>,
    remote: Arc<dyn ClickRemote>,
    resolver: Arc<TopicKeyResolver>,
    config: ClickStoreConfig,
    diagnostics: DiagnosticsCollector,
    inner: Arc<Mutex<StoreInner>>,
    /// Serializes remote writes so an older push never lands after a newer one
    write_gate: Arc<Mutex<()>>,
}

impl ClickStateStore {
    pub fn new(user_id: impl Into<String>, remote: Arc<dyn ClickRemote>) -> Self {
        Self {
            user_id: Arc::from(user_id.into()),
            remote,
            resolver: Arc::new(TopicKeyResolver::default()),
            config: ClickStoreConfig::default(),
            diagnostics: DiagnosticsCollector::new(),
            inner: Arc::new(Mutex::new(StoreInner::default())),
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_config(mut self, config: ClickStoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<TopicKeyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsCollector) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn config(&self) -> ClickStoreConfig {
        self.config
    }

    /// Replace memory for `date_key` with the remote's view.
    ///
    /// A load for a date already in flight joins it instead of issuing a second
    /// request. A load for another date supersedes the in-flight one. Local
    /// records that are pending or were written after this load started are
    /// kept over the response. On error memory is left untouched.
    pub async fn load(&self, date_key: DateKey) -> Result<LoadOutcome> {
        loop {
            let (token, cancel, done_tx, started_seq) = {
                let mut inner = self.inner.lock().await;

                let joined = inner
                    .inflight
                    .as_ref()
                    .filter(|load| load.date_key == date_key)
                    .map(|load| (load.token, load.done.clone()));
                if let Some((token, done)) = joined {
                    drop(inner);
                    self.diagnostics
                        .record(DiagnosticKind::LoadCoalesced, format!("load {date_key}"));
                    log_debug!("joining in-flight load #{token} for {date_key}");
                    match self.join_inflight(date_key, token, done).await? {
                        Some(outcome) => return Ok(outcome),
                        None => continue,
                    }
                }

                if let Some(previous) = inner.inflight.take() {
                    previous.cancel.cancel();
                    self.diagnostics.record(
                        DiagnosticKind::LoadSuperseded,
                        format!("load {} superseded by {date_key}", previous.date_key),
                    );
                    log_info!(
                        "load #{} for {} superseded by {date_key}",
                        previous.token,
                        previous.date_key
                    );
                }

                let token = inner.reload.begin(date_key);
                let cancel = CancellationToken::new();
                let (done_tx, done_rx) = watch::channel(None);
                inner.inflight = Some(InflightLoad {
                    token,
                    date_key,
                    cancel: cancel.clone(),
                    done: done_rx,
                });
                (token, cancel, done_tx, inner.write_seq)
            };

            let outcome = self.run_load(date_key, token, &cancel, started_seq).await;

            let shared = match &outcome {
                Ok(value) => Ok(value.clone()),
                Err(err) => Err(format!("{err:#}")),
            };
            done_tx.send_replace(Some(shared));

            return outcome;
        }
    }

    /// Waits for the leading load. `None` means the leader was dropped before
    /// it published anything and the caller has to start over.
    async fn join_inflight(
        &self,
        date_key: DateKey,
        token: u64,
        mut done: watch::Receiver<Option<SharedOutcome>>,
    ) -> Result<Option<LoadOutcome>> {
        let published = done
            .wait_for(Option::is_some)
            .await
            .map(|value| (*value).clone());

        match published {
            Ok(Some(Ok(LoadOutcome::Applied(summary)))) => {
                Ok(Some(LoadOutcome::Coalesced(summary)))
            }
            Ok(Some(Ok(other))) => Ok(Some(other)),
            Ok(Some(Err(message))) => Err(anyhow!(message))
                .with_context(|| format!("joined load for {date_key} failed")),
            Ok(None) | Err(_) => {
                let mut inner = self.inner.lock().await;
                if inner.take_inflight(token).is_some() {
                    inner.reload.invalidate();
                }
                log_warn!("load #{token} for {date_key} was abandoned; starting a new one");
                Ok(None)
            }
        }
    }

    async fn run_load(
        &self,
        date_key: DateKey,
        token: u64,
        cancel: &CancellationToken,
        started_seq: u64,
    ) -> Result<LoadOutcome> {
        let date = date_key.to_string();
        let fetched = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.remote.get_all_clicks_for_user_date(&self.user_id, &date) => Some(result),
        };

        let mut inner = self.inner.lock().await;
        inner.take_inflight(token);

        let Some(result) = fetched else {
            log_debug!("load #{token} for {date_key} cancelled");
            return Ok(LoadOutcome::Superseded { token });
        };

        let rows = match result {
            Ok(rows) => rows,
            Err(err) if inner.reload.is_current(token) => {
                let message = format!("{err:#}");
                inner.reload.fail(token, message.clone());
                inner.reload.settle(token);
                self.diagnostics
                    .record(DiagnosticKind::LoadFailed, format!("{date_key}: {message}"));
                log_error!("failed to load clicks for {date_key}: {message}");
                return Err(err).with_context(|| format!("failed to load clicks for {date_key}"));
            }
            Err(err) => {
                log_debug!("stale load #{token} for {date_key} failed: {err:#}");
                return Ok(LoadOutcome::Superseded { token });
            }
        };

        if !inner.reload.start_applying(token) {
            log_debug!("discarding stale response #{token} for {date_key}");
            return Ok(LoadOutcome::Superseded { token });
        }

        let summary = self.apply_rows(&mut inner, date_key, token, rows, started_seq);
        inner.reload.finish(token);
        self.diagnostics.record_load_applied();
        log_info!(
            "loaded {} click(s) for {date_key} ({} skipped, {} kept local)",
            summary.records,
            summary.skipped,
            summary.kept_local
        );

        Ok(LoadOutcome::Applied(summary))
    }

    fn apply_rows(
        &self,
        inner: &mut StoreInner,
        date_key: DateKey,
        token: u64,
        rows: Vec<RemoteClickRow>,
        started_seq: u64,
    ) -> LoadSummary {
        let mut fresh: HashMap<ClickKey, ClickRecord> = HashMap::with_capacity(rows.len());
        let mut skipped = 0;
        let mut duplicates = 0;

        for row in &rows {
            match ClickRecord::from_remote(row, &self.resolver) {
                Ok(record) if record.date_key != date_key => {
                    skipped += 1;
                    log_warn!(
                        "click row for {} returned by load of {date_key}",
                        record.date_key
                    );
                }
                Ok(record) => {
                    let key = record.key();
                    if fresh.contains_key(&key) {
                        duplicates += 1;
                        log_debug!("duplicate click row for {key}; keeping the first");
                    } else {
                        fresh.insert(key, record);
                    }
                }
                Err(reason) => {
                    skipped += 1;
                    log_warn!("skipping click row {:?}: {reason}", row.set_name);
                    self.diagnostics
                        .record(DiagnosticKind::RejectedClickRow, reason.to_string());
                }
            }
        }

        let protected: Vec<ClickRecord> = inner
            .clicks
            .iter()
            .filter(|(key, _)| key.date_key == date_key && inner.is_protected(key, started_seq))
            .map(|(_, record)| record.clone())
            .collect();
        let kept_local = protected.len();
        for record in protected {
            fresh.insert(record.key(), record);
        }

        inner.clicks.retain(|key, _| key.date_key != date_key);
        inner
            .written_at
            .retain(|key, seq| key.date_key != date_key || *seq > started_seq);
        let records = fresh.len();
        inner.clicks.extend(fresh);

        LoadSummary {
            date_key,
            token,
            records,
            skipped,
            duplicates,
            kept_local,
        }
    }

    /// Record a click locally, then upsert it remotely.
    ///
    /// The local map reflects `record` immediately. If every remote attempt
    /// fails the record stays local, is marked pending and the error is
    /// returned.
    ///
    /// A later save or clear of the same key takes precedence: this save stops
    /// retrying and returns `Ok` once it has been overtaken.
    pub async fn save(&self, record: ClickRecord) -> Result<()> {
        let generation = self.inner.lock().await.write_local(record.clone());
        self.push_remote(&record, generation).await
    }

    /// Flip `is_clicked` for a box, keeping its presence flag.
    pub async fn toggle(
        &self,
        topic: TopicKey,
        date_key: DateKey,
        number: u32,
        hr: HrNumber,
    ) -> Result<ClickRecord> {
        self.toggle_inner(topic, date_key, number, hr, None).await
    }

    /// Flip `is_clicked` and set whether the number is present in the data.
    pub async fn toggle_with_presence(
        &self,
        topic: TopicKey,
        date_key: DateKey,
        number: u32,
        hr: HrNumber,
        is_present: bool,
    ) -> Result<ClickRecord> {
        self.toggle_inner(topic, date_key, number, hr, Some(is_present))
            .await
    }

    async fn toggle_inner(
        &self,
        topic: TopicKey,
        date_key: DateKey,
        number: u32,
        hr: HrNumber,
        is_present: Option<bool>,
    ) -> Result<ClickRecord> {
        let (record, generation) = {
            let mut inner = self.inner.lock().await;
            let key = ClickKey {
                topic,
                date_key,
                number,
                hr,
            };
            let record = match inner.clicks.get(&key) {
                Some(existing) => ClickRecord {
                    is_clicked: !existing.is_clicked,
                    is_present: is_present.unwrap_or(existing.is_present),
                    ..existing.clone()
                },
                None => ClickRecord::clicked(topic, date_key, number, hr)
                    .with_presence(is_present.unwrap_or(false)),
            };
            let generation = inner.write_local(record.clone());
            (record, generation)
        };

        self.push_remote(&record, generation).await?;
        Ok(record)
    }

    /// Remove every click for `date_key`, remotely first.
    ///
    /// A load for the same date that is still in flight is discarded.
    pub async fn clear(&self, date_key: DateKey) -> Result<()> {
        let date = date_key.to_string();
        let _gate = self.write_gate.lock().await;
        self.remote
            .clear_for_date(&self.user_id, &date)
            .await
            .with_context(|| format!("failed to clear clicks for {date_key}"))?;

        let mut inner = self.inner.lock().await;
        let same_date = inner
            .inflight
            .as_ref()
            .is_some_and(|load| load.date_key == date_key);
        if same_date {
            if let Some(load) = inner.inflight.take() {
                load.cancel.cancel();
                self.diagnostics.record(
                    DiagnosticKind::LoadSuperseded,
                    format!("load {date_key} discarded by clear"),
                );
            }
            inner.reload.invalidate();
        }

        inner.write_seq += 1;
        inner.clicks.retain(|key, _| key.date_key != date_key);
        inner.pending.retain(|key| key.date_key != date_key);
        inner.written_at.retain(|key, _| key.date_key != date_key);
        inner.generations.retain(|key, _| key.date_key != date_key);
        log_info!("cleared clicks for {date_key}");
        Ok(())
    }

    /// Retry every pending save. Returns how many reached the remote.
    pub async fn flush_pending(&self) -> Result<usize> {
        let writes: Vec<(ClickRecord, u64)> = {
            let inner = self.inner.lock().await;
            inner
                .pending
                .iter()
                .filter_map(|key| {
                    let record = inner.clicks.get(key)?.clone();
                    let generation = *inner.generations.get(key)?;
                    Some((record, generation))
                })
                .collect()
        };

        let mut flushed = 0;
        let mut first_error = None;
        for (record, generation) in writes {
            match self.push_remote(&record, generation).await {
                Ok(()) => flushed += 1,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err.context(format!("{flushed} pending click(s) flushed before failure"))),
            None => Ok(flushed),
        }
    }

    async fn push_remote(&self, record: &ClickRecord, generation: u64) -> Result<()> {
        let key = record.key();
        let row = record.to_remote_row(&self.user_id);

        match self.upsert_with_retry(key, generation, &row).await {
            Ok(Push::Stored) => {
                let mut inner = self.inner.lock().await;
                if !inner.confirm(key, generation) {
                    log_debug!("click {key} changed while its save was in flight");
                }
                Ok(())
            }
            Ok(Push::Overtaken) => {
                log_debug!("save of {key} overtaken by a newer write");
                Ok(())
            }
            Err(err) => {
                self.diagnostics
                    .record(DiagnosticKind::SaveFailed, key.to_string());
                log_error!("click {key} kept locally, remote save failed: {err:#}");
                Err(err).with_context(|| format!("failed to save click {key}"))
            }
        }
    }

    /// Each attempt holds the write gate and only goes out while `generation`
    /// still owns the key.
    async fn upsert_with_retry(
        &self,
        key: ClickKey,
        generation: u64,
        row: &RemoteClickRow,
    ) -> Result<Push> {
        let attempts = self.config.save_attempts.max(1);
        let mut delay = self.config.retry_base_delay;
        let mut attempt = 1;

        loop {
            let result = {
                let _gate = self.write_gate.lock().await;
                if !self.inner.lock().await.owns(&key, generation) {
                    return Ok(Push::Overtaken);
                }
                self.remote.upsert_click(row).await
            };

            match result {
                Ok(()) => return Ok(Push::Stored),
                Err(err) if attempt >= attempts => return Err(err),
                Err(err) => {
                    log_warn!(
                        "save attempt {attempt}/{attempts} for {} failed: {err:#}; retrying in {delay:?}",
                        row.set_name
                    );
                    time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }

    pub async fn get(&self, key: &ClickKey) -> Option<ClickRecord> {
        self.inner.lock().await.clicks.get(key).cloned()
    }

    pub async fn is_clicked(&self, key: &ClickKey) -> bool {
        self.inner
            .lock()
            .await
            .clicks
            .get(key)
            .is_some_and(|record| record.is_clicked)
    }

    /// Records for one date, ordered by key.
    pub async fn records_for_date(&self, date_key: DateKey) -> Vec<ClickRecord> {
        let inner = self.inner.lock().await;
        let mut records: Vec<ClickRecord> = inner
            .clicks
            .values()
            .filter(|record| record.date_key == date_key)
            .cloned()
            .collect();
        records.sort_by_key(ClickRecord::key);
        records
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn reload_state(&self) -> ReloadState {
        self.inner.lock().await.reload.clone()
    }

    pub async fn snapshot(&self) -> ClickStoreSnapshot {
        let inner = self.inner.lock().await;
        let mut pending: Vec<ClickKey> = inner.pending.iter().copied().collect();
        pending.sort();
        ClickStoreSnapshot {
            user_id: self.user_id.to_string(),
            record_count: inner.clicks.len(),
            pending,
            reload: inner.reload.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clicks::memory::InMemoryClickRemote;
    use crate::clicks::state::ReloadStatus;

    const USER: &str = "user-1";

    fn date(raw: &str) -> DateKey {
        DateKey::parse(raw).unwrap()
    }

    fn hr(value: u32) -> HrNumber {
        HrNumber::new(value).unwrap()
    }

    fn fast_config(save_attempts: u32) -> ClickStoreConfig {
        ClickStoreConfig {
            save_attempts,
            retry_base_delay: Duration::from_millis(1),
        }
    }

    fn store_with(remote: &Arc<InMemoryClickRemote>) -> ClickStateStore {
        ClickStateStore::new(USER, remote.clone()).with_config(fast_config(2))
    }

    fn record(number: u32) -> ClickRecord {
        ClickRecord::clicked(TopicKey::new(3, 1), date("2025-06-05"), number, hr(1))
    }

    fn remote_row(set_name: &str, date_key: &str, number: i64, is_present: bool) -> RemoteClickRow {
        RemoteClickRow {
            user_id: USER.into(),
            set_name: set_name.into(),
            date_key: date_key.into(),
            number_value: number,
            hr_number: "HR1".into(),
            is_clicked: true,
            is_present,
        }
    }

    async fn wait_for_load_calls(remote: &InMemoryClickRemote, calls: usize) {
        while remote.load_calls() < calls {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let remote = Arc::new(InMemoryClickRemote::new());
        let writer = store_with(&remote);
        let saved = record(7).with_presence(true);
        writer.save(saved.clone()).await.unwrap();

        let reader = store_with(&remote);
        let outcome = reader.load(date("2025-06-05")).await.unwrap();
        assert_eq!(outcome.summary().map(|s| s.records), Some(1));
        assert_eq!(reader.get(&saved.key()).await, Some(saved));
    }

    #[tokio::test]
    async fn saving_twice_is_the_same_as_once() {
        let remote = Arc::new(InMemoryClickRemote::new());
        let store = store_with(&remote);
        store.save(record(7)).await.unwrap();
        store.save(record(7)).await.unwrap();

        assert_eq!(remote.row_count(), 1);
        assert_eq!(store.records_for_date(date("2025-06-05")).await.len(), 1);
    }

    #[tokio::test]
    async fn load_normalizes_labels_and_keeps_first_duplicate() {
        let remote = Arc::new(InMemoryClickRemote::new());
        remote.seed(remote_row("D-3 (trd) Set-1 Matrix", "2025-06-05", 7, true));
        remote.seed(remote_row("D-3 Set-1 Matrix", "2025-06-05", 7, false));
        remote.seed(remote_row("Summary", "2025-06-05", 9, false));

        let store = store_with(&remote);
        let outcome = store.load(date("2025-06-05")).await.unwrap();
        let summary = outcome.summary().cloned().unwrap();
        assert_eq!(summary.records, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.skipped, 1);

        let kept = store.get(&record(7).key()).await.unwrap();
        assert!(kept.is_present);
        assert_eq!(
            store.diagnostics.snapshot().data_quality.rejected_click_rows,
            1
        );
    }

    #[tokio::test]
    async fn concurrent_loads_for_one_date_share_a_request() {
        let remote = Arc::new(InMemoryClickRemote::gated());
        remote.seed(remote_row("D-3 Set-1 Matrix", "2025-06-05", 7, false));
        let store = store_with(&remote);

        let first = tokio::spawn({
            let store = store.clone();
            async move { store.load(date("2025-06-05")).await }
        });
        wait_for_load_calls(&remote, 1).await;

        let second = tokio::spawn({
            let store = store.clone();
            async move { store.load(date("2025-06-05")).await }
        });
        while store.diagnostics.snapshot().reloads.loads_coalesced == 0 {
            tokio::task::yield_now().await;
        }

        remote.release_loads(1);
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert!(matches!(first, LoadOutcome::Applied(_)));
        assert!(matches!(second, LoadOutcome::Coalesced(_)));
        assert_eq!(first.summary(), second.summary());
        assert_eq!(remote.load_calls(), 1);
    }

    #[tokio::test]
    async fn newer_load_supersedes_an_older_date() {
        let remote = Arc::new(InMemoryClickRemote::gated());
        remote.seed(remote_row("D-3 Set-1 Matrix", "2025-06-04", 3, false));
        remote.seed(remote_row("D-3 Set-1 Matrix", "2025-06-05", 7, false));
        let store = store_with(&remote);

        let older = tokio::spawn({
            let store = store.clone();
            async move { store.load(date("2025-06-04")).await }
        });
        wait_for_load_calls(&remote, 1).await;

        let newer = tokio::spawn({
            let store = store.clone();
            async move { store.load(date("2025-06-05")).await }
        });
        wait_for_load_calls(&remote, 2).await;
        remote.release_loads(2);

        let older = older.await.unwrap().unwrap();
        let newer = newer.await.unwrap().unwrap();
        assert!(matches!(older, LoadOutcome::Superseded { .. }));
        assert!(matches!(newer, LoadOutcome::Applied(_)));

        assert!(store.records_for_date(date("2025-06-04")).await.is_empty());
        assert_eq!(store.records_for_date(date("2025-06-05")).await.len(), 1);
        assert_eq!(store.diagnostics.snapshot().reloads.loads_superseded, 1);
    }

    #[tokio::test]
    async fn failed_load_leaves_memory_untouched() {
        let remote = Arc::new(InMemoryClickRemote::new());
        let store = store_with(&remote);
        store.save(record(7)).await.unwrap();

        remote.fail_next_loads(1);
        assert!(store.load(date("2025-06-05")).await.is_err());

        assert_eq!(store.get(&record(7).key()).await, Some(record(7)));
        let reload = store.reload_state().await;
        assert_eq!(reload.status, ReloadStatus::Idle);
        assert!(reload.last_error.is_some());
        assert_eq!(store.diagnostics.snapshot().reloads.loads_failed, 1);
    }

    #[tokio::test]
    async fn failed_save_stays_local_until_flushed() {
        let remote = Arc::new(InMemoryClickRemote::new());
        let store = store_with(&remote);

        remote.fail_next_saves(2);
        assert!(store.save(record(7)).await.is_err());
        assert_eq!(remote.save_calls(), 2);
        assert_eq!(store.get(&record(7).key()).await, Some(record(7)));
        assert_eq!(store.pending_count().await, 1);

        // a reload with an empty remote must not revert the pending click
        let outcome = store.load(date("2025-06-05")).await.unwrap();
        assert_eq!(outcome.summary().map(|s| s.kept_local), Some(1));
        assert!(store.is_clicked(&record(7).key()).await);

        assert_eq!(store.flush_pending().await.unwrap(), 1);
        assert_eq!(store.pending_count().await, 0);
        assert_eq!(remote.row_count(), 1);
    }

    #[tokio::test]
    async fn save_during_a_load_wins_over_the_older_snapshot() {
        let remote = Arc::new(InMemoryClickRemote::gated());
        remote.seed(remote_row("D-3 Set-1 Matrix", "2025-06-05", 7, false));
        let store = store_with(&remote);

        let load = tokio::spawn({
            let store = store.clone();
            async move { store.load(date("2025-06-05")).await }
        });
        wait_for_load_calls(&remote, 1).await;

        store.save(record(7).with_presence(true)).await.unwrap();
        remote.release_loads(1);

        let outcome = load.await.unwrap().unwrap();
        assert_eq!(outcome.summary().map(|s| s.kept_local), Some(1));
        assert!(store.get(&record(7).key()).await.unwrap().is_present);
    }

    #[tokio::test]
    async fn toggle_flips_and_persists() {
        let remote = Arc::new(InMemoryClickRemote::new());
        let store = store_with(&remote);
        let topic = TopicKey::new(3, 1);
        let day = date("2025-06-05");

        let first = store.toggle(topic, day, 7, hr(1)).await.unwrap();
        assert!(first.is_clicked);
        let second = store.toggle_with_presence(topic, day, 7, hr(1), true).await.unwrap();
        assert!(!second.is_clicked);
        assert!(second.is_present);

        let rows = remote
            .get_all_clicks_for_user_date(USER, "2025-06-05")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].is_clicked);
    }

    #[tokio::test]
    async fn clear_removes_one_date_everywhere() {
        let remote = Arc::new(InMemoryClickRemote::new());
        let store = store_with(&remote);
        store.save(record(7)).await.unwrap();
        store.save(record(8)).await.unwrap();
        let other_day = ClickRecord::clicked(TopicKey::new(3, 1), date("2025-06-06"), 7, hr(1));
        store.save(other_day.clone()).await.unwrap();

        store.clear(date("2025-06-05")).await.unwrap();

        assert!(store.records_for_date(date("2025-06-05")).await.is_empty());
        assert_eq!(store.records_for_date(date("2025-06-06")).await, vec![other_day]);
        assert_eq!(remote.row_count(), 1);
    }

    #[tokio::test]
    async fn clear_discards_an_in_flight_load_for_the_date() {
        let remote = Arc::new(InMemoryClickRemote::gated());
        remote.seed(remote_row("D-3 Set-1 Matrix", "2025-06-05", 7, false));
        let store = store_with(&remote);

        let load = tokio::spawn({
            let store = store.clone();
            async move { store.load(date("2025-06-05")).await }
        });
        wait_for_load_calls(&remote, 1).await;

        store.clear(date("2025-06-05")).await.unwrap();
        remote.release_loads(1);

        assert!(matches!(
            load.await.unwrap().unwrap(),
            LoadOutcome::Superseded { .. }
        ));
        assert!(store.records_for_date(date("2025-06-05")).await.is_empty());
    }

    #[tokio::test]
    async fn joined_loads_share_the_leaders_failure() {
        let remote = Arc::new(InMemoryClickRemote::gated());
        let store = store_with(&remote);
        remote.release_loads(1);
        store.load(date("2025-06-05")).await.unwrap();
        store.save(record(7)).await.unwrap();
        remote.fail_next_loads(1);

        let first = tokio::spawn({
            let store = store.clone();
            async move { store.load(date("2025-06-05")).await }
        });
        wait_for_load_calls(&remote, 2).await;

        let second = tokio::spawn({
            let store = store.clone();
            async move { store.load(date("2025-06-05")).await }
        });
        while store.diagnostics.snapshot().reloads.loads_coalesced == 0 {
            tokio::task::yield_now().await;
        }

        remote.release_loads(1);
        assert!(first.await.unwrap().is_err());
        let joined = second.await.unwrap().unwrap_err();
        assert!(format!("{joined:#}").contains("joined load for 2025-06-05 failed"));

        assert_eq!(remote.load_calls(), 2);
        assert_eq!(store.get(&record(7).key()).await, Some(record(7)));
        assert_eq!(store.diagnostics.snapshot().reloads.loads_failed, 1);
        assert_eq!(store.reload_state().await.status, ReloadStatus::Idle);
    }

    #[tokio::test]
    async fn dropped_load_does_not_fail_the_next_one() {
        let remote = Arc::new(InMemoryClickRemote::gated());
        remote.seed(remote_row("D-3 Set-1 Matrix", "2025-06-05", 7, false));
        let store = store_with(&remote);

        let dropped = time::timeout(Duration::from_millis(20), store.load(date("2025-06-05"))).await;
        assert!(dropped.is_err());

        remote.release_loads(1);
        let outcome = store.load(date("2025-06-05")).await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Applied(_)));
        assert!(store.is_clicked(&record(7).key()).await);
        assert_eq!(store.reload_state().await.status, ReloadStatus::Idle);
    }

    #[tokio::test]
    async fn waiting_load_takes_over_when_its_leader_is_aborted() {
        let remote = Arc::new(InMemoryClickRemote::gated());
        remote.seed(remote_row("D-3 Set-1 Matrix", "2025-06-05", 7, false));
        let store = store_with(&remote);

        let leader = tokio::spawn({
            let store = store.clone();
            async move { store.load(date("2025-06-05")).await }
        });
        wait_for_load_calls(&remote, 1).await;

        let follower = tokio::spawn({
            let store = store.clone();
            async move { store.load(date("2025-06-05")).await }
        });
        while store.diagnostics.snapshot().reloads.loads_coalesced == 0 {
            tokio::task::yield_now().await;
        }

        leader.abort();
        assert!(leader.await.unwrap_err().is_cancelled());
        wait_for_load_calls(&remote, 2).await;
        remote.release_loads(1);

        let outcome = follower.await.unwrap().unwrap();
        assert!(matches!(outcome, LoadOutcome::Applied(_)));
        assert!(store.is_clicked(&record(7).key()).await);
    }

    fn slow_retry_store(remote: &Arc<InMemoryClickRemote>) -> ClickStateStore {
        ClickStateStore::new(USER, remote.clone()).with_config(ClickStoreConfig {
            save_attempts: 2,
            retry_base_delay: Duration::from_millis(50),
        })
    }

    async fn wait_for_save_calls(remote: &InMemoryClickRemote, calls: usize) {
        while remote.save_calls() < calls {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn retried_save_never_overwrites_a_newer_one() {
        let remote = Arc::new(InMemoryClickRemote::new());
        let store = slow_retry_store(&remote);

        remote.fail_next_saves(1);
        let first = tokio::spawn({
            let store = store.clone();
            async move { store.save(record(7)).await }
        });
        wait_for_save_calls(&remote, 1).await;

        let unclicked = ClickRecord {
            is_clicked: false,
            ..record(7)
        };
        store.save(unclicked.clone()).await.unwrap();
        first.await.unwrap().unwrap();

        // the retry saw the newer write and never went out
        assert_eq!(remote.save_calls(), 2);
        assert_eq!(store.pending_count().await, 0);
        assert_eq!(store.get(&unclicked.key()).await, Some(unclicked.clone()));

        let reader = store_with(&remote);
        reader.load(date("2025-06-05")).await.unwrap();
        assert_eq!(reader.get(&unclicked.key()).await, Some(unclicked));
    }

    #[tokio::test]
    async fn clear_stops_a_retrying_save_from_restoring_the_click() {
        let remote = Arc::new(InMemoryClickRemote::new());
        let store = slow_retry_store(&remote);

        remote.fail_next_saves(1);
        let save = tokio::spawn({
            let store = store.clone();
            async move { store.save(record(7)).await }
        });
        wait_for_save_calls(&remote, 1).await;

        store.clear(date("2025-06-05")).await.unwrap();
        save.await.unwrap().unwrap();

        assert_eq!(remote.save_calls(), 1);
        assert_eq!(remote.row_count(), 0);
        assert_eq!(store.pending_count().await, 0);
        assert!(store.records_for_date(date("2025-06-05")).await.is_empty());
    }

    #[tokio::test]
    async fn load_keeps_a_save_that_is_still_in_flight() {
        let remote = Arc::new(InMemoryClickRemote::new());
        remote.seed(remote_row("D-3 Set-1 Matrix", "2025-06-05", 7, false));
        let store = slow_retry_store(&remote);

        remote.fail_next_saves(1);
        let save = tokio::spawn({
            let store = store.clone();
            async move { store.save(record(7).with_presence(true)).await }
        });
        wait_for_save_calls(&remote, 1).await;

        let outcome = store.load(date("2025-06-05")).await.unwrap();
        assert_eq!(outcome.summary().map(|s| s.kept_local), Some(1));
        assert!(store.get(&record(7).key()).await.unwrap().is_present);

        save.await.unwrap().unwrap();
        assert_eq!(store.pending_count().await, 0);
    }
}
