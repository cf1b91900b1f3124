use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::hours::HrNumber;
use crate::topics::canonicalize;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

/// Uniqueness column for a raw topic label: `D-3 Set-1`, or the trimmed label
/// when it does not resolve.
pub fn topic_key_column(set_name: &str) -> String {
    canonicalize(set_name)
        .map(|key| key.short_name())
        .unwrap_or_else(|| set_name.trim().to_string())
}

/// `HR{n}` when the hour parses, the raw value otherwise.
pub fn hr_column(hr_number: &str) -> String {
    HrNumber::parse(hr_number)
        .map(HrNumber::key_fragment)
        .unwrap_or_else(|_| hr_number.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_collapse_label_and_hour_variants() {
        assert_eq!(topic_key_column("D-3 (trd) Set-1 Matrix"), "D-3 Set-1");
        assert_eq!(topic_key_column(" Summary "), "Summary");
        assert_eq!(hr_column("hr 4"), "HR4");
        assert_eq!(hr_column("HR99"), "HR99");
    }
}
