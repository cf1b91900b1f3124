use std::collections::BTreeSet;

use serde::Serialize;

use super::window::DayLabel;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NumberClass {
    Abcd,
    Bcd,
    Unqualified,
}

/// ABCD and BCD numbers for one topic and hour. Disjoint by construction.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub abcd_numbers: BTreeSet<u32>,
    pub bcd_numbers: BTreeSet<u32>,
}

impl ClassificationResult {
    /// `None` for numbers that are not D-day numbers or are unqualified.
    pub fn class_of(&self, number: u32) -> Option<NumberClass> {
        if self.abcd_numbers.contains(&number) {
            Some(NumberClass::Abcd)
        } else if self.bcd_numbers.contains(&number) {
            Some(NumberClass::Bcd)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.abcd_numbers.is_empty() && self.bcd_numbers.is_empty()
    }
}

/// How one D-day number was classified and why.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NumberVerdict {
    pub number: u32,
    pub in_a: bool,
    pub in_b: bool,
    pub in_c: bool,
    pub class: NumberClass,
}

impl NumberVerdict {
    pub fn occurrences(&self) -> Vec<DayLabel> {
        [
            (self.in_a, DayLabel::A),
            (self.in_b, DayLabel::B),
            (self.in_c, DayLabel::C),
        ]
        .into_iter()
        .filter_map(|(present, label)| present.then_some(label))
        .collect()
    }

    /// `"A, C"` style summary of where the number was seen before D.
    pub fn occurrence_label(&self) -> String {
        let labels: Vec<&str> = self.occurrences().iter().map(DayLabel::as_str).collect();
        if labels.is_empty() {
            "none".to_string()
        } else {
            labels.join(", ")
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationSummary {
    pub d_day_count: usize,
    pub abcd_count: usize,
    pub bcd_count: usize,
    pub unqualified_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DetailedClassification {
    pub result: ClassificationResult,
    pub unqualified_numbers: BTreeSet<u32>,
    /// One entry per D-day number, ascending
    pub verdicts: Vec<NumberVerdict>,
    pub summary: ClassificationSummary,
}

/// Classify every number of day D against days A, B and C.
///
/// A number seen on at least two of A/B/C is ABCD. Otherwise, a number seen
/// on exactly one of B and C (A is irrelevant) is BCD. ABCD numbers are then
/// removed from BCD.
pub fn classify(
    a: &BTreeSet<u32>,
    b: &BTreeSet<u32>,
    c: &BTreeSet<u32>,
    d: &BTreeSet<u32>,
) -> ClassificationResult {
    let mut abcd_numbers = BTreeSet::new();
    let mut bcd_candidates = BTreeSet::new();

    for &number in d {
        let in_a = a.contains(&number);
        let in_b = b.contains(&number);
        let in_c = c.contains(&number);
        let count = [in_a, in_b, in_c].iter().filter(|hit| **hit).count();

        if count >= 2 {
            abcd_numbers.insert(number);
        } else if in_b != in_c {
            bcd_candidates.insert(number);
        }
    }

    // mutual exclusion: an ABCD number is never BCD
    let bcd_numbers = bcd_candidates.difference(&abcd_numbers).copied().collect();

    ClassificationResult {
        abcd_numbers,
        bcd_numbers,
    }
}

/// [`classify`] plus per-number verdicts, unqualified numbers and counts.
pub fn classify_detailed(
    a: &BTreeSet<u32>,
    b: &BTreeSet<u32>,
    c: &BTreeSet<u32>,
    d: &BTreeSet<u32>,
) -> DetailedClassification {
    let result = classify(a, b, c, d);

    let verdicts: Vec<NumberVerdict> = d
        .iter()
        .map(|&number| NumberVerdict {
            number,
            in_a: a.contains(&number),
            in_b: b.contains(&number),
            in_c: c.contains(&number),
            class: result.class_of(number).unwrap_or(NumberClass::Unqualified),
        })
        .collect();

    let unqualified_numbers: BTreeSet<u32> = verdicts
        .iter()
        .filter(|verdict| verdict.class == NumberClass::Unqualified)
        .map(|verdict| verdict.number)
        .collect();

    let summary = ClassificationSummary {
        d_day_count: d.len(),
        abcd_count: result.abcd_numbers.len(),
        bcd_count: result.bcd_numbers.len(),
        unqualified_count: unqualified_numbers.len(),
    };

    DetailedClassification {
        result,
        unqualified_numbers,
        verdicts,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[u32]) -> BTreeSet<u32> {
        values.iter().copied().collect()
    }

    #[test]
    fn abcd_needs_two_of_three_reference_days() {
        let result = classify(&set(&[1, 5, 9]), &set(&[2, 5]), &set(&[3, 9]), &set(&[1, 5, 9, 12]));
        assert_eq!(result.abcd_numbers, set(&[5, 9]));
        assert!(result.bcd_numbers.is_empty());
    }

    #[test]
    fn exclusive_b_is_bcd() {
        let result = classify(&set(&[]), &set(&[7]), &set(&[]), &set(&[7]));
        assert!(result.abcd_numbers.is_empty());
        assert_eq!(result.bcd_numbers, set(&[7]));
    }

    #[test]
    fn a_and_b_is_abcd_not_bcd() {
        let result = classify(&set(&[7]), &set(&[7]), &set(&[]), &set(&[7]));
        assert_eq!(result.abcd_numbers, set(&[7]));
        assert!(result.bcd_numbers.is_empty());
    }

    #[test]
    fn exclusive_c_is_bcd_and_a_only_is_unqualified() {
        let detailed = classify_detailed(&set(&[4]), &set(&[]), &set(&[8]), &set(&[4, 8, 11]));
        assert_eq!(detailed.result.bcd_numbers, set(&[8]));
        assert_eq!(detailed.unqualified_numbers, set(&[4, 11]));
        assert_eq!(
            detailed.summary,
            ClassificationSummary {
                d_day_count: 3,
                abcd_count: 0,
                bcd_count: 1,
                unqualified_count: 2,
            }
        );
        assert_eq!(detailed.verdicts[0].occurrence_label(), "A");
        assert_eq!(detailed.verdicts[2].occurrence_label(), "none");
    }

    #[test]
    fn numbers_missing_from_d_are_never_classified() {
        let result = classify(&set(&[3]), &set(&[3]), &set(&[3]), &set(&[]));
        assert!(result.is_empty());
        assert_eq!(result.class_of(3), None);
    }

    #[test]
    fn present_on_all_three_days_is_abcd() {
        let detailed = classify_detailed(&set(&[6]), &set(&[6]), &set(&[6]), &set(&[6]));
        assert_eq!(detailed.result.abcd_numbers, set(&[6]));
        assert_eq!(detailed.verdicts[0].occurrence_label(), "A, B, C");
    }

    #[test]
    fn partition_properties_hold_over_a_grid() {
        // every membership pattern of a number across A/B/C/D
        for mask in 0u32..16 {
            let n = 42;
            let pick = |bit: u32| if mask & (1 << bit) != 0 { set(&[n]) } else { set(&[]) };
            let (a, b, c, d) = (pick(0), pick(1), pick(2), pick(3));
            let result = classify(&a, &b, &c, &d);

            let in_d = d.contains(&n);
            let count = [&a, &b, &c].iter().filter(|s| s.contains(&n)).count();
            let expect_abcd = in_d && count >= 2;
            let expect_bcd = in_d && !expect_abcd && (b.contains(&n) != c.contains(&n));

            assert_eq!(result.abcd_numbers.contains(&n), expect_abcd, "mask {mask:04b}");
            assert_eq!(result.bcd_numbers.contains(&n), expect_bcd, "mask {mask:04b}");
            assert!(result.abcd_numbers.is_disjoint(&result.bcd_numbers));
        }
    }
}
