use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use crate::calendar::DateKey;
use crate::diagnostics::{DiagnosticKind, DiagnosticsCollector, DiagnosticsSnapshot};
use crate::hours::{HourSelection, HrNumber};
use crate::topics::{TopicKey, TopicKeyResolver, TopicMatcher};

use super::classify::{classify_detailed, DetailedClassification};
use super::config::AnalysisConfig;
use super::extract::{extract_with_report, TopicMatrix};
use super::window::{select_window, DayLabel, DayWindow, InsufficientHistory, WindowSelection};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Everything uploaded for one date: topic matrices under their raw storage
/// labels plus that date's hour selections.
#[derive(Debug, Clone, Default)]
pub struct DayData {
    pub topics: BTreeMap<String, TopicMatrix>,
    pub hours: HourSelection,
}

impl DayData {
    pub fn new(hours: HourSelection) -> Self {
        Self {
            topics: BTreeMap::new(),
            hours,
        }
    }

    pub fn with_topic(mut self, raw_label: impl Into<String>, matrix: TopicMatrix) -> Self {
        self.topics.insert(raw_label.into(), matrix);
        self
    }

    pub fn labels(&self) -> Vec<&str> {
        self.topics.keys().map(String::as_str).collect()
    }
}

/// A user's uploads keyed by date.
#[derive(Debug, Clone, Default)]
pub struct AnalysisDataset {
    days: BTreeMap<DateKey, DayData>,
}

impl AnalysisDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_day(&mut self, date: DateKey, day: DayData) {
        self.days.insert(date, day);
    }

    pub fn with_day(mut self, date: DateKey, day: DayData) -> Self {
        self.insert_day(date, day);
        self
    }

    pub fn day(&self, date: &str) -> Option<&DayData> {
        let key = DateKey::parse(date).ok()?;
        self.days.get(&key)
    }

    /// Available dates, ascending.
    pub fn sorted_dates(&self) -> Vec<String> {
        self.days.keys().map(DateKey::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Per-day numbers that fed one classification.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DaySets {
    pub a: BTreeSet<u32>,
    pub b: BTreeSet<u32>,
    pub c: BTreeSet<u32>,
    pub d: BTreeSet<u32>,
}

impl DaySets {
    fn slot(&mut self, label: DayLabel) -> &mut BTreeSet<u32> {
        match label {
            DayLabel::A => &mut self.a,
            DayLabel::B => &mut self.b,
            DayLabel::C => &mut self.c,
            DayLabel::D => &mut self.d,
        }
    }

    fn absorb(&mut self, other: &DaySets) {
        self.a.extend(&other.a);
        self.b.extend(&other.b);
        self.c.extend(&other.c);
        self.d.extend(&other.d);
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionNotes {
    pub missing_cells: usize,
    pub malformed_cells: usize,
    /// Days where the topic was absent from the upload
    pub days_without_topic: Vec<DayLabel>,
    /// Days with no planet chosen for the hour
    pub days_without_planet: Vec<DayLabel>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicAnalysis {
    pub topic: TopicKey,
    pub display_name: String,
    /// Raw label the D-day data was stored under
    pub source_label: String,
    pub day_sets: DaySets,
    pub classification: DetailedClassification,
    pub notes: ExtractionNotes,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowAnalysis {
    pub window: DayWindow,
    pub hr: HrNumber,
    pub topics: Vec<TopicAnalysis>,
    /// Per-day union of every analyzed topic's numbers
    pub combined: DaySets,
    /// The same rule applied to `combined`
    pub overall: DetailedClassification,
    /// Hours with a planet chosen on D-day, ascending
    pub available_hours: Vec<HrNumber>,
    /// Expected topics with no D-day data
    pub missing_topics: Vec<TopicKey>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum AnalysisOutcome {
    Ready(WindowAnalysis),
    Insufficient(InsufficientHistory),
}

/// Service object wiring window selection, topic resolution, extraction and
/// classification together.
///
/// Pure apart from the diagnostics it feeds; safe to share across threads.
#[derive(Clone)]
pub struct AnalysisEngine {
    config: AnalysisConfig,
    resolver: Arc<TopicKeyResolver>,
    diagnostics: DiagnosticsCollector,
}

impl AnalysisEngine {
    pub fn new(config: AnalysisConfig, diagnostics: DiagnosticsCollector) -> Self {
        Self::with_resolver(config, Arc::new(TopicKeyResolver::default()), diagnostics)
    }

    pub fn with_resolver(
        config: AnalysisConfig,
        resolver: Arc<TopicKeyResolver>,
        diagnostics: DiagnosticsCollector,
    ) -> Self {
        Self {
            config,
            resolver,
            diagnostics,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<TopicKeyResolver> {
        &self.resolver
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn select_window(&self, dataset: &AnalysisDataset, trigger_date: &str) -> WindowSelection {
        select_window(
            &dataset.sorted_dates(),
            trigger_date,
            self.config.window_convention,
        )
    }

    /// Classify every expected topic present on D-day for one hour.
    pub fn analyze(
        &self,
        dataset: &AnalysisDataset,
        trigger_date: &str,
        hr: HrNumber,
    ) -> AnalysisOutcome {
        let window = match self.select_window(dataset, trigger_date) {
            WindowSelection::Ready(window) => window,
            WindowSelection::Insufficient(info) => {
                log_info!("analysis for {trigger_date} skipped: {}", info.reason());
                return AnalysisOutcome::Insufficient(info);
            }
        };

        let matchers: Vec<(DayLabel, Option<&DayData>, TopicMatcher)> = DayLabel::ALL
            .iter()
            .map(|label| {
                let day = dataset.day(window.date(*label));
                let matcher = self.match_day(*label, &window, day);
                (*label, day, matcher)
            })
            .collect();

        let (_, d_day, d_matcher) = &matchers[3];
        let missing_topics = d_matcher.missing().to_vec();
        let mut topics = Vec::with_capacity(d_matcher.len());
        let mut combined = DaySets::default();

        for (topic, source_label) in d_matcher.matched() {
            let mut day_sets = DaySets::default();
            let mut notes = ExtractionNotes::default();

            for (label, day, matcher) in &matchers {
                let date = window.date(*label);
                let Some(day) = day else {
                    notes.days_without_topic.push(*label);
                    continue;
                };
                let Some(matrix) = matcher.raw_label(topic).and_then(|raw| day.topics.get(raw))
                else {
                    notes.days_without_topic.push(*label);
                    continue;
                };
                let Some(planet) = day.hours.planet_for(hr) else {
                    log_debug!("no planet selected for {hr} on {date}");
                    notes.days_without_planet.push(*label);
                    continue;
                };

                let extraction = extract_with_report(matrix, planet);
                notes.missing_cells += extraction.missing;
                notes.malformed_cells += extraction.malformed;
                self.diagnostics.record_cells(
                    extraction.missing,
                    extraction.malformed,
                    &format!("{topic} {hr} on {date}"),
                );
                *day_sets.slot(*label) = extraction.numbers;
            }

            if !notes.days_without_planet.is_empty() {
                self.diagnostics.record(
                    DiagnosticKind::MissingHourSelection,
                    format!("{topic} {hr}: no planet on {:?}", notes.days_without_planet),
                );
            }

            let classification = classify_detailed(&day_sets.a, &day_sets.b, &day_sets.c, &day_sets.d);
            combined.absorb(&day_sets);
            topics.push(TopicAnalysis {
                topic: *topic,
                display_name: topic.display_name(),
                source_label: source_label.to_string(),
                day_sets,
                classification,
                notes,
            });
        }

        let overall = classify_detailed(&combined.a, &combined.b, &combined.c, &combined.d);
        let available_hours: Vec<HrNumber> = d_day
            .map(|day| day.hours.hours().collect())
            .unwrap_or_default();

        log_info!(
            "analyzed {} topic(s) for {hr}, window {}..{} ({} missing): {} ABCD, {} BCD overall",
            topics.len(),
            window.a,
            window.d,
            missing_topics.len(),
            overall.result.abcd_numbers.len(),
            overall.result.bcd_numbers.len()
        );

        AnalysisOutcome::Ready(WindowAnalysis {
            window,
            hr,
            topics,
            combined,
            overall,
            available_hours,
            missing_topics,
        })
    }

    fn match_day(&self, label: DayLabel, window: &DayWindow, day: Option<&DayData>) -> TopicMatcher {
        let Some(day) = day else {
            return TopicMatcher::default();
        };
        let matcher = self
            .resolver
            .build_matcher(&self.config.expected_topics, &day.labels());

        let date = window.date(label);
        for collision in matcher.collisions() {
            self.diagnostics.record(
                DiagnosticKind::TopicCollision,
                format!(
                    "{date}: {:?} ignored in favour of {:?}",
                    collision.ignored, collision.kept
                ),
            );
        }
        for raw in matcher.unrecognized() {
            log_warn!("{date}: unrecognized topic label {raw:?}");
            self.diagnostics
                .record(DiagnosticKind::UnrecognizedTopic, format!("{date}: {raw}"));
        }
        matcher
    }
}
