use serde::{Deserialize, Serialize};

use crate::topics::{expected_topics, TopicKey};

/// Which end of the four-day window the user's clicked date sits on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WindowConvention {
    /// The clicked date is D; the window is `[idx-3, idx]`.
    TriggerIsD,
    /// The clicked date is the day after D; the window is `[idx-4, idx-1]`.
    TriggerAfterD,
}

impl Default for WindowConvention {
    fn default() -> Self {
        WindowConvention::TriggerIsD
    }
}

impl WindowConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowConvention::TriggerIsD => "trigger-is-d",
            WindowConvention::TriggerAfterD => "trigger-after-d",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trigger-is-d" | "trigger_is_d" | "d" => Some(WindowConvention::TriggerIsD),
            "trigger-after-d" | "trigger_after_d" | "after-d" => {
                Some(WindowConvention::TriggerAfterD)
            }
            _ => None,
        }
    }
}

/// Tunables for the analysis pipeline.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub window_convention: WindowConvention,

    /// Topics to analyze, in display order
    pub expected_topics: Vec<TopicKey>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_convention: WindowConvention::default(),
            expected_topics: expected_topics(),
        }
    }
}
