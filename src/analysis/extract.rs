use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// `element -> planet code -> cell value` for one topic on one date.
pub type TopicMatrix = BTreeMap<String, BTreeMap<String, String>>;

/// Leading number after the element code, e.g. `as-7/su-(07 Sc 34)` -> 7.
static CELL_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]+-(\d+)[/-]").expect("cell number pattern compiles"));

/// Numbers read from one matrix plus a tally of what had to be skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub numbers: BTreeSet<u32>,
    /// Cells that matched the grammar (duplicates included)
    pub cells_read: usize,
    /// Elements without a value for the selected planet
    pub missing: usize,
    /// Values that did not match the grammar
    pub malformed: usize,
}

pub fn parse_cell_number(value: &str) -> Option<u32> {
    CELL_NUMBER
        .captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse::<u32>().ok())
}

/// Distinct numbers present for `selected_planet` across every element.
pub fn extract(topic_matrix: &TopicMatrix, selected_planet: &str) -> BTreeSet<u32> {
    extract_with_report(topic_matrix, selected_planet).numbers
}

/// Same as [`extract`], keeping counts of missing and malformed cells.
///
/// Skipped cells never fail the extraction.
pub fn extract_with_report(topic_matrix: &TopicMatrix, selected_planet: &str) -> Extraction {
    let mut extraction = Extraction::default();

    for planets in topic_matrix.values() {
        let Some(value) = planets.get(selected_planet) else {
            extraction.missing += 1;
            continue;
        };

        match parse_cell_number(value) {
            Some(number) => {
                extraction.numbers.insert(number);
                extraction.cells_read += 1;
            }
            None => extraction.malformed += 1,
        }
    }

    extraction
}
