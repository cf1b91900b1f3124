mod types;

pub use types::{
    DataQualityCounters, DiagnosticEvent, DiagnosticKind, DiagnosticsSnapshot, ReloadCounters,
};

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

const MAX_RECENT_EVENTS: usize = 50;

/// Shared sink for data-quality and reload events.
///
/// Cloning is cheap; every clone feeds the same counters. Injected into the
/// analysis engine and the click store so callers can introspect both
/// through one `snapshot()`.
pub struct DiagnosticsCollector {
    inner: Arc<Mutex<DiagnosticsState>>,
}

#[derive(Default)]
struct DiagnosticsState {
    data_quality: DataQualityCounters,
    reloads: ReloadCounters,
    recent_events: Vec<DiagnosticEvent>,
}

impl Default for DiagnosticsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(DiagnosticsState {
                recent_events: Vec::with_capacity(MAX_RECENT_EVENTS),
                ..DiagnosticsState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, DiagnosticsState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Count one event of `kind` and keep it in the recent-events ring.
    pub fn record(&self, kind: DiagnosticKind, detail: impl Into<String>) {
        let mut state = self.state();
        match kind {
            DiagnosticKind::UnrecognizedTopic => state.data_quality.unrecognized_topics += 1,
            DiagnosticKind::TopicCollision => state.data_quality.topic_collisions += 1,
            DiagnosticKind::MalformedCell => state.data_quality.malformed_cells += 1,
            DiagnosticKind::MissingHourSelection => {
                state.data_quality.missing_hour_selections += 1
            }
            DiagnosticKind::RejectedClickRow => state.data_quality.rejected_click_rows += 1,
            DiagnosticKind::LoadCoalesced => state.reloads.loads_coalesced += 1,
            DiagnosticKind::LoadSuperseded => state.reloads.loads_superseded += 1,
            DiagnosticKind::LoadFailed => state.reloads.loads_failed += 1,
            DiagnosticKind::SaveFailed => state.reloads.saves_failed += 1,
        }
        push_event(&mut state, kind, detail.into());
    }

    /// Tally skipped cells from one extraction pass.
    ///
    /// Missing cells are routine (sparse matrices) and only counted; malformed
    /// ones also leave an event.
    pub fn record_cells(&self, missing: usize, malformed: usize, context: &str) {
        if missing == 0 && malformed == 0 {
            return;
        }
        let mut state = self.state();
        state.data_quality.missing_cells += missing as u64;
        state.data_quality.malformed_cells += malformed as u64;
        if malformed > 0 {
            push_event(
                &mut state,
                DiagnosticKind::MalformedCell,
                format!("{malformed} malformed cell(s) in {context}"),
            );
        }
    }

    pub fn record_load_applied(&self) {
        self.state().reloads.loads_applied += 1;
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let state = self.state();
        DiagnosticsSnapshot {
            data_quality: state.data_quality.clone(),
            reloads: state.reloads.clone(),
            recent_events: state.recent_events.clone(),
        }
    }

    pub fn reset(&self) {
        let mut state = self.state();
        state.data_quality = DataQualityCounters::default();
        state.reloads = ReloadCounters::default();
        state.recent_events.clear();
    }
}

fn push_event(state: &mut DiagnosticsState, kind: DiagnosticKind, detail: String) {
    state.recent_events.push(DiagnosticEvent {
        timestamp: Utc::now(),
        kind,
        detail,
    });

    if state.recent_events.len() > MAX_RECENT_EVENTS {
        state.recent_events.remove(0);
    }
}

impl Clone for DiagnosticsCollector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_counters() {
        let collector = DiagnosticsCollector::new();
        let other = collector.clone();

        other.record(DiagnosticKind::TopicCollision, "D-3 Set-1");
        collector.record_cells(2, 1, "D-3 Set-1 on 2025-06-01");
        collector.record_load_applied();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.data_quality.topic_collisions, 1);
        assert_eq!(snapshot.data_quality.missing_cells, 2);
        assert_eq!(snapshot.data_quality.malformed_cells, 1);
        assert_eq!(snapshot.reloads.loads_applied, 1);
        assert_eq!(snapshot.recent_events.len(), 2);
    }

    #[test]
    fn recent_events_are_bounded_and_resettable() {
        let collector = DiagnosticsCollector::new();
        for i in 0..(MAX_RECENT_EVENTS + 5) {
            collector.record(DiagnosticKind::UnrecognizedTopic, format!("label {i}"));
        }
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent_events.len(), MAX_RECENT_EVENTS);
        assert_eq!(snapshot.recent_events[0].detail, "label 5");
        assert_eq!(
            snapshot.data_quality.unrecognized_topics,
            (MAX_RECENT_EVENTS + 5) as u64
        );

        collector.reset();
        let cleared = collector.snapshot();
        assert_eq!(cleared.data_quality, DataQualityCounters::default());
        assert!(cleared.recent_events.is_empty());
    }
}
