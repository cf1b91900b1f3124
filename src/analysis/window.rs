use serde::Serialize;

use super::config::WindowConvention;

/// The trigger must sit at this zero-based index or later.
pub const MIN_TRIGGER_INDEX: usize = 4;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub enum DayLabel {
    A,
    B,
    C,
    D,
}

impl DayLabel {
    pub const ALL: [DayLabel; 4] = [DayLabel::A, DayLabel::B, DayLabel::C, DayLabel::D];

    pub fn as_str(&self) -> &'static str {
        match self {
            DayLabel::A => "A",
            DayLabel::B => "B",
            DayLabel::C => "C",
            DayLabel::D => "D",
        }
    }
}

/// Four consecutive available dates, oldest first.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayWindow {
    pub a: String,
    pub b: String,
    pub c: String,
    pub d: String,
    pub trigger: String,
    pub convention: WindowConvention,
}

impl DayWindow {
    pub fn date(&self, label: DayLabel) -> &str {
        match label {
            DayLabel::A => &self.a,
            DayLabel::B => &self.b,
            DayLabel::C => &self.c,
            DayLabel::D => &self.d,
        }
    }

    pub fn dates(&self) -> [&str; 4] {
        [&self.a, &self.b, &self.c, &self.d]
    }
}

/// Why a window could not be formed. An expected UI state, not a fault.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InsufficientHistory {
    pub trigger: String,
    /// `None` when the trigger is not among the available dates.
    pub trigger_index: Option<usize>,
    pub available_dates: usize,
}

impl InsufficientHistory {
    /// Actionable status line for the caller to show.
    pub fn reason(&self) -> String {
        match self.trigger_index {
            None => format!(
                "{} is not one of the {} available dates",
                self.trigger, self.available_dates
            ),
            Some(index) => format!(
                "{} is date #{}; analysis needs it to be date #{} or later",
                self.trigger,
                index + 1,
                MIN_TRIGGER_INDEX + 1
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum WindowSelection {
    Ready(DayWindow),
    Insufficient(InsufficientHistory),
}

impl WindowSelection {
    pub fn window(&self) -> Option<&DayWindow> {
        match self {
            WindowSelection::Ready(window) => Some(window),
            WindowSelection::Insufficient(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, WindowSelection::Ready(_))
    }
}

/// Derive the A/B/C/D window for `trigger_date`.
///
/// `sorted_dates` must be ascending; ISO `YYYY-MM-DD` strings sort correctly.
pub fn select_window<S: AsRef<str>>(
    sorted_dates: &[S],
    trigger_date: &str,
    convention: WindowConvention,
) -> WindowSelection {
    let position = sorted_dates
        .iter()
        .position(|date| date.as_ref() == trigger_date);

    let index = match position {
        Some(index) if index >= MIN_TRIGGER_INDEX => index,
        _ => {
            return WindowSelection::Insufficient(InsufficientHistory {
                trigger: trigger_date.to_string(),
                trigger_index: position,
                available_dates: sorted_dates.len(),
            })
        }
    };

    let d_index = match convention {
        WindowConvention::TriggerIsD => index,
        WindowConvention::TriggerAfterD => index - 1,
    };
    let at = |offset: usize| sorted_dates[d_index - offset].as_ref().to_string();

    WindowSelection::Ready(DayWindow {
        a: at(3),
        b: at(2),
        c: at(1),
        d: at(0),
        trigger: trigger_date.to_string(),
        convention,
    })
}
