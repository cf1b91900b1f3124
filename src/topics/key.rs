use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `D-<division>` optionally followed by a parenthesized annotation, then `Set-<set>`.
static PARENTHESIZED_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"D-(\d+)(?:\s*\([^)]*\))?\s+Set-(\d+)").expect("topic label pattern compiles")
});

/// Canonical identity of a topic matrix. Annotations never take part in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicKey {
    pub division_number: u32,
    pub set_number: u32,
}

impl TopicKey {
    pub fn new(division_number: u32, set_number: u32) -> Self {
        Self {
            division_number,
            set_number,
        }
    }

    /// `D-3 Set-1`, the form used inside persistence keys.
    pub fn short_name(&self) -> String {
        format!("D-{} Set-{}", self.division_number, self.set_number)
    }

    /// `D-3 Set-1 Matrix`, the clean label shown to users.
    pub fn display_name(&self) -> String {
        format!("{} Matrix", self.short_name())
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D-{} Set-{}", self.division_number, self.set_number)
    }
}

impl FromStr for TopicKey {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        canonicalize(raw).ok_or_else(|| anyhow!("unrecognized topic label '{raw}'"))
    }
}

/// One way of reading a topic key out of a free-form label.
///
/// New annotation formats get their own pattern instead of widening the
/// default regex.
pub trait LabelPattern: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, raw: &str) -> Option<TopicKey>;
}

/// Handles `D-3 Set-1 Matrix` and `D-3 (trd) Set-1 Matrix`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParenthesizedAnnotation;

impl LabelPattern for ParenthesizedAnnotation {
    fn name(&self) -> &'static str {
        "parenthesized-annotation"
    }

    fn parse(&self, raw: &str) -> Option<TopicKey> {
        let captures = PARENTHESIZED_LABEL.captures(raw)?;
        let division_number = captures.get(1)?.as_str().parse::<u32>().ok()?;
        let set_number = captures.get(2)?.as_str().parse::<u32>().ok()?;
        if division_number == 0 || set_number == 0 {
            return None;
        }
        Some(TopicKey::new(division_number, set_number))
    }
}

/// Canonicalize with the default pattern only.
///
/// `None` means "unrecognized topic"; callers skip the label.
pub fn canonicalize(raw_label: &str) -> Option<TopicKey> {
    ParenthesizedAnnotation.parse(raw_label)
}

/// Ordered set of label patterns; the first one that recognizes a label wins.
pub struct TopicKeyResolver {
    patterns: Vec<Box<dyn LabelPattern>>,
}

impl Default for TopicKeyResolver {
    fn default() -> Self {
        Self {
            patterns: vec![Box::new(ParenthesizedAnnotation)],
        }
    }
}

impl fmt::Debug for TopicKeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.patterns.iter().map(|p| p.name()).collect();
        f.debug_struct("TopicKeyResolver")
            .field("patterns", &names)
            .finish()
    }
}

impl TopicKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pattern(mut self, pattern: impl LabelPattern + 'static) -> Self {
        self.patterns.push(Box::new(pattern));
        self
    }

    pub fn canonicalize(&self, raw_label: &str) -> Option<TopicKey> {
        self.patterns
            .iter()
            .find_map(|pattern| pattern.parse(raw_label))
    }

    /// Clean display name for a stored label, if it is recognizable.
    pub fn display_name(&self, raw_label: &str) -> Option<String> {
        self.canonicalize(raw_label).map(|key| key.display_name())
    }
}
