//! ABCD/BCD number classification over uploaded topic matrices, plus the
//! per-user click state that marks numbers on the analysis grid.

pub mod analysis;
pub mod calendar;
pub mod clicks;
pub mod db;
pub mod diagnostics;
pub mod hours;
pub mod settings;
pub mod topics;
pub mod utils;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

pub use analysis::{
    classify, classify_detailed, extract, select_window, AnalysisConfig, AnalysisDataset,
    AnalysisEngine, AnalysisOutcome, ClassificationResult, DayData, DayWindow, TopicMatrix,
    WindowConvention, WindowSelection,
};
pub use calendar::DateKey;
pub use clicks::{ClickKey, ClickRecord, ClickRemote, ClickStateStore, LoadOutcome};
pub use db::Database;
pub use diagnostics::{DiagnosticsCollector, DiagnosticsSnapshot};
pub use hours::{HourSelection, HrNumber};
pub use settings::{EngineSettings, SettingsStore};
pub use topics::{canonicalize, TopicKey, TopicKeyResolver};

const DATABASE_FILE: &str = "abcd.sqlite3";
const SETTINGS_FILE: &str = "settings.json";

/// Wired services for one user: analysis engine, click store and the
/// diagnostics they share.
pub struct AppServices {
    pub analysis: AnalysisEngine,
    pub clicks: ClickStateStore,
    pub settings: Arc<SettingsStore>,
    pub db: Database,
    diagnostics: DiagnosticsCollector,
}

impl AppServices {
    /// Open (or create) the SQLite database and settings under `data_dir`.
    pub fn open(data_dir: &Path, user_id: &str) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let settings = Arc::new(
            SettingsStore::new(data_dir.join(SETTINGS_FILE))
                .context("failed to load settings")?,
        );
        let db = Database::new(data_dir.join(DATABASE_FILE))
            .context("failed to initialise click database")?;

        let services = Self::with_remote(settings, db.clone(), Arc::new(db), user_id);
        info!(
            "services ready for user {user_id} ({} convention)",
            services.analysis.config().window_convention.as_str()
        );
        Ok(services)
    }

    /// Wire the services over any click remote; `db` is kept for statistics.
    pub fn with_remote(
        settings: Arc<SettingsStore>,
        db: Database,
        remote: Arc<dyn ClickRemote>,
        user_id: &str,
    ) -> Self {
        let effective = settings.settings();
        let resolver = Arc::new(TopicKeyResolver::default());
        let diagnostics = DiagnosticsCollector::new();

        let analysis = AnalysisEngine::with_resolver(
            effective.analysis_config(&resolver),
            Arc::clone(&resolver),
            diagnostics.clone(),
        );
        let clicks = ClickStateStore::new(user_id, remote)
            .with_config(effective.click_store_config())
            .with_resolver(resolver)
            .with_diagnostics(diagnostics.clone());

        Self {
            analysis,
            clicks,
            settings,
            db,
            diagnostics,
        }
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn reset_diagnostics(&self) {
        self.diagnostics.reset();
    }

    pub async fn click_statistics(&self) -> Result<db::ClickStatistics> {
        self.db.click_statistics(self.clicks.user_id()).await
    }
}
