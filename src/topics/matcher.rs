use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::Serialize;

use super::key::{TopicKey, TopicKeyResolver};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Two distinct observed labels that canonicalize to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicCollision {
    pub key: TopicKey,
    pub kept: String,
    pub ignored: String,
}

/// Alignment between the expected topic list and the labels actually seen
/// in storage.
#[derive(Debug, Clone, Default)]
pub struct TopicMatcher {
    /// Expected topics that were found, in expected order, with their raw label.
    forward: Vec<(TopicKey, String)>,
    /// Every recognizable observed label, to its canonical key.
    reverse: HashMap<String, TopicKey>,
    missing: Vec<TopicKey>,
    collisions: Vec<TopicCollision>,
    unrecognized: Vec<String>,
}

impl TopicMatcher {
    /// Raw storage label to read data for `key` from.
    pub fn raw_label(&self, key: &TopicKey) -> Option<&str> {
        self.forward
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, raw)| raw.as_str())
    }

    pub fn key_for_label(&self, raw_label: &str) -> Option<TopicKey> {
        self.reverse.get(raw_label).copied()
    }

    /// Rewrites a stored (possibly annotated) label into its clean display name.
    pub fn display_name(&self, raw_label: &str) -> Option<String> {
        self.key_for_label(raw_label).map(|key| key.display_name())
    }

    /// Matched topics in expected order.
    pub fn matched(&self) -> impl Iterator<Item = (&TopicKey, &str)> {
        self.forward.iter().map(|(key, raw)| (key, raw.as_str()))
    }

    pub fn missing(&self) -> &[TopicKey] {
        &self.missing
    }

    pub fn collisions(&self) -> &[TopicCollision] {
        &self.collisions
    }

    pub fn unrecognized(&self) -> &[String] {
        &self.unrecognized
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

impl TopicKeyResolver {
    /// Align every expected topic with the first observed label sharing its key.
    ///
    /// Collisions keep the first-seen label; unrecognized labels are skipped.
    pub fn build_matcher<S: AsRef<str>>(
        &self,
        expected_topics: &[TopicKey],
        observed_labels: &[S],
    ) -> TopicMatcher {
        let mut matcher = TopicMatcher::default();
        let mut first_seen: HashMap<TopicKey, String> = HashMap::new();

        for label in observed_labels {
            let label = label.as_ref();
            let Some(key) = self.canonicalize(label) else {
                log_debug!("skipping unrecognized topic label {label:?}");
                if !matcher.unrecognized.iter().any(|seen| seen == label) {
                    matcher.unrecognized.push(label.to_string());
                }
                continue;
            };

            matcher.reverse.insert(label.to_string(), key);

            match first_seen.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(label.to_string());
                }
                Entry::Occupied(slot) => {
                    if slot.get() != label
                        && !matcher
                            .collisions
                            .iter()
                            .any(|c| c.key == key && c.ignored == label)
                    {
                        log_warn!(
                            "topic labels {:?} and {label:?} both resolve to {key}; keeping the first",
                            slot.get()
                        );
                        matcher.collisions.push(TopicCollision {
                            key,
                            kept: slot.get().clone(),
                            ignored: label.to_string(),
                        });
                    }
                }
            }
        }

        for key in expected_topics {
            match first_seen.get(key) {
                Some(raw) => matcher.forward.push((*key, raw.clone())),
                None => matcher.missing.push(*key),
            }
        }

        matcher
    }
}

/// Convenience wrapper over the default resolver.
pub fn build_matcher<S: AsRef<str>>(
    expected_topics: &[TopicKey],
    observed_labels: &[S],
) -> TopicMatcher {
    TopicKeyResolver::default().build_matcher(expected_topics, observed_labels)
}
