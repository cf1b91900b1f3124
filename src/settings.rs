use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::analysis::{AnalysisConfig, WindowConvention};
use crate::clicks::ClickStoreConfig;
use crate::topics::{expected_topics, TopicKeyResolver};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const WINDOW_CONVENTION_ENV: &str = "ABCD_WINDOW_CONVENTION";
pub const SAVE_RETRIES_ENV: &str = "ABCD_SAVE_RETRIES";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    pub window_convention: WindowConvention,
    pub save_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// Topic labels in display order; annotated forms are accepted
    pub expected_topics: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let store = ClickStoreConfig::default();
        Self {
            window_convention: WindowConvention::default(),
            save_attempts: store.save_attempts,
            retry_base_delay_ms: store.retry_base_delay.as_millis() as u64,
            expected_topics: expected_topics()
                .iter()
                .map(|topic| topic.display_name())
                .collect(),
        }
    }
}

impl EngineSettings {
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(WINDOW_CONVENTION_ENV) {
            match WindowConvention::parse(&raw) {
                Some(convention) => self.window_convention = convention,
                None => log_warn!("ignoring {WINDOW_CONVENTION_ENV}={raw:?}"),
            }
        }

        if let Some(raw) = lookup(SAVE_RETRIES_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(attempts) if attempts > 0 => self.save_attempts = attempts,
                _ => log_warn!("ignoring {SAVE_RETRIES_ENV}={raw:?}"),
            }
        }
    }

    /// Unrecognized topic labels are skipped; duplicates keep their first position.
    pub fn analysis_config(&self, resolver: &TopicKeyResolver) -> AnalysisConfig {
        let mut topics = Vec::with_capacity(self.expected_topics.len());
        for label in &self.expected_topics {
            match resolver.canonicalize(label) {
                Some(key) if !topics.contains(&key) => topics.push(key),
                Some(_) => {}
                None => log_warn!("ignoring unrecognized expected topic {label:?}"),
            }
        }

        AnalysisConfig {
            window_convention: self.window_convention,
            expected_topics: topics,
        }
    }

    pub fn click_store_config(&self) -> ClickStoreConfig {
        ClickStoreConfig {
            save_attempts: self.save_attempts.max(1),
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }
}

/// JSON-file backed settings. Environment overrides apply on top of the file
/// and are never written back.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<EngineSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!("settings at {} are invalid ({err}); using defaults", path.display());
                EngineSettings::default()
            })
        } else {
            EngineSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Effective settings: the file plus environment overrides.
    pub fn settings(&self) -> EngineSettings {
        let mut settings = self.stored();
        settings.apply_env_overrides();
        settings
    }

    /// Settings as persisted, without overrides.
    pub fn stored(&self) -> EngineSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: EngineSettings) -> Result<()> {
        let mut guard = self.write();
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &EngineSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: EngineSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", self.path.display()))?;
        *self.write() = data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::TopicKey;
    use tempfile::TempDir;

    #[test]
    fn defaults_cover_the_full_catalogue() {
        let settings = EngineSettings::default();
        assert_eq!(settings.expected_topics.len(), 30);
        assert_eq!(settings.save_attempts, 3);

        let config = settings.analysis_config(&TopicKeyResolver::default());
        assert_eq!(config.expected_topics, expected_topics());
        assert_eq!(config.window_convention, WindowConvention::TriggerIsD);
    }

    #[test]
    fn overrides_apply_and_bad_values_are_ignored() {
        let mut settings = EngineSettings::default();
        settings.apply_overrides(|name| match name {
            WINDOW_CONVENTION_ENV => Some("trigger-after-d".into()),
            SAVE_RETRIES_ENV => Some("0".into()),
            _ => None,
        });
        assert_eq!(settings.window_convention, WindowConvention::TriggerAfterD);
        assert_eq!(settings.save_attempts, 3);
    }

    #[test]
    fn expected_topics_accept_annotated_labels() {
        let settings = EngineSettings {
            expected_topics: vec![
                "D-3 (trd) Set-1 Matrix".into(),
                "D-3 Set-1".into(),
                "Summary".into(),
                "D-144 Set-2 Matrix".into(),
            ],
            ..EngineSettings::default()
        };
        let config = settings.analysis_config(&TopicKeyResolver::default());
        assert_eq!(
            config.expected_topics,
            vec![TopicKey::new(3, 1), TopicKey::new(144, 2)]
        );
    }

    #[test]
    fn store_persists_and_recovers_from_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        let mut updated = store.stored();
        updated.retry_base_delay_ms = 250;
        store.update(updated.clone()).unwrap();

        let reopened = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(reopened.stored(), updated);
        assert_eq!(
            reopened.stored().click_store_config().retry_base_delay,
            Duration::from_millis(250)
        );

        fs::write(&path, "{not json").unwrap();
        let corrupt = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(corrupt.stored(), EngineSettings::default());
        assert!(corrupt.reload().is_err());
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"windowConvention":"trigger-after-d"}"#).unwrap();

        let store = SettingsStore::new(path).unwrap();
        let stored = store.stored();
        assert_eq!(stored.window_convention, WindowConvention::TriggerAfterD);
        assert_eq!(stored.expected_topics.len(), 30);
    }
}
