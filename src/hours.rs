use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// A user-selected hour slot, `1..=12`.
///
/// Every spelling (`"HR1"`, `"hr 1"`, `"1"`, `1`) normalizes to the same value,
/// rendered as `HR1` in persistence keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct HrNumber(u8);

impl HrNumber {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 12;

    pub fn new(value: u32) -> Result<Self> {
        if value < u32::from(Self::MIN) || value > u32::from(Self::MAX) {
            bail!(
                "hour {value} is outside {}..={}",
                Self::MIN,
                Self::MAX
            );
        }
        Ok(Self(value as u8))
    }

    /// Parse `HR1`, `hr 1`, `HR-1` or a bare `1`.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let digits = match trimmed.get(..2) {
            Some(prefix) if prefix.eq_ignore_ascii_case("hr") => &trimmed[2..],
            _ => trimmed,
        };
        let digits = digits.trim_start_matches(|c: char| c.is_whitespace() || c == '-' || c == '_');
        let value = digits
            .parse::<u32>()
            .map_err(|_| anyhow!("unrecognized hour '{raw}'"))?;
        Self::new(value)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// `HR{n}`.
    pub fn key_fragment(self) -> String {
        format!("HR{}", self.0)
    }

    pub fn all() -> impl Iterator<Item = HrNumber> {
        (Self::MIN..=Self::MAX).map(HrNumber)
    }
}

impl fmt::Display for HrNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HR{}", self.0)
    }
}

impl FromStr for HrNumber {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        Self::parse(raw)
    }
}

impl TryFrom<u8> for HrNumber {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(u32::from(value))
    }
}

impl TryFrom<u32> for HrNumber {
    type Error = anyhow::Error;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<HrNumber> for u8 {
    fn from(hr: HrNumber) -> Self {
        hr.0
    }
}

/// Short planet code for a planet or lagna name; codes map to themselves.
pub fn planet_code(name: &str) -> Option<&'static str> {
    let code = match name.trim() {
        "Sun" | "Su" | "Body" => "Su",
        "Moon" | "Mo" => "Mo",
        "Mars" | "Ma" => "Ma",
        "Mercury" | "Me" => "Me",
        "Jupiter" | "Ju" => "Ju",
        "Venus" | "Ve" => "Ve",
        "Saturn" | "Sa" => "Sa",
        "Rahu" | "Ra" => "Ra",
        "Ketu" | "Ke" => "Ke",
        "Lagna" | "Lg" => "Lg",
        "Bhava Lagna" | "BL" => "BL",
        "Hora Lagna" | "HL" => "HL",
        "Ghati Lagna" | "GL" => "GL",
        "Vighati Lagna" | "VL" => "VL",
        "Varnada Lagna" | "VaL" => "VaL",
        "Sree Lagna" | "SL" => "SL",
        "Pranapada Lagna" | "PL" => "PL",
        "Indu Lagna" | "IL" => "IL",
        _ => return None,
    };
    Some(code)
}

/// Per-date choice of which planet column each hour reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourSelection {
    planets: BTreeMap<HrNumber, String>,
}

impl HourSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from loosely-typed entries such as `{"1": "Su", "HR2": "Moon"}`.
    ///
    /// Entries with an unreadable hour are skipped.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut selection = Self::new();
        for (hour, planet) in entries {
            match HrNumber::parse(hour.as_ref()) {
                Ok(hr) => selection.insert(hr, planet.as_ref()),
                Err(err) => log_warn!("ignoring hour selection entry: {err}"),
            }
        }
        selection
    }

    pub fn with(mut self, hr: HrNumber, planet: &str) -> Self {
        self.insert(hr, planet);
        self
    }

    /// Known planet names are stored as their code; anything else verbatim.
    pub fn insert(&mut self, hr: HrNumber, planet: &str) {
        let planet = planet_code(planet)
            .map(str::to_string)
            .unwrap_or_else(|| planet.trim().to_string());
        self.planets.insert(hr, planet);
    }

    pub fn planet_for(&self, hr: HrNumber) -> Option<&str> {
        self.planets.get(&hr).map(String::as_str)
    }

    pub fn hours(&self) -> impl Iterator<Item = HrNumber> + '_ {
        self.planets.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.planets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spellings_normalize_to_one_key() {
        let expected = HrNumber::new(1).unwrap();
        assert_eq!(HrNumber::parse("HR1").unwrap(), expected);
        assert_eq!(HrNumber::parse("hr 1").unwrap(), expected);
        assert_eq!(HrNumber::parse(" Hr-1 ").unwrap(), expected);
        assert_eq!(HrNumber::parse("1").unwrap(), expected);
        assert_eq!(HrNumber::try_from(1u8).unwrap(), expected);
        assert_eq!(expected.key_fragment(), "HR1");
        assert_eq!(expected.to_string(), "HR1");
    }

    #[test]
    fn out_of_range_and_garbage_are_rejected() {
        assert!(HrNumber::new(0).is_err());
        assert!(HrNumber::new(13).is_err());
        assert!(HrNumber::parse("HR").is_err());
        assert!(HrNumber::parse("hour one").is_err());
        assert_eq!(HrNumber::all().count(), 12);
    }

    #[test]
    fn serde_uses_plain_integers() {
        let hr = HrNumber::new(7).unwrap();
        assert_eq!(serde_json::to_string(&hr).unwrap(), "7");
        assert_eq!(serde_json::from_str::<HrNumber>("7").unwrap(), hr);
        assert!(serde_json::from_str::<HrNumber>("13").is_err());
    }

    #[test]
    fn selection_normalizes_planet_names() {
        let selection = HourSelection::from_entries([("1", "Sun"), ("HR2", "Mo"), ("bogus", "Ma")]);
        assert_eq!(selection.planet_for(HrNumber::new(1).unwrap()), Some("Su"));
        assert_eq!(selection.planet_for(HrNumber::new(2).unwrap()), Some("Mo"));
        assert_eq!(selection.hours().count(), 2);

        let custom = HourSelection::new().with(HrNumber::new(3).unwrap(), "Xx");
        assert_eq!(custom.planet_for(HrNumber::new(3).unwrap()), Some("Xx"));
    }
}
