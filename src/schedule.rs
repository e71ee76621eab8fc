//! Event date/time parsing.
//!
//! Organisers type the schedule by hand, so the input is ISO-ish at best:
//! `2026-08-01T10:00:00`, `2026-08-01 09:00 - 18:00`, `2026-08-01T17:00–21:30`.
//! A range is recognised by an en dash or a spaced hyphen; missing or short
//! time fragments default to 09:00 and 18:00.

use chrono::NaiveDateTime;

/// Range separators, checked in order.
const RANGE_SEPARATORS: [&str; 2] = ["–", " - "];

pub const DEFAULT_START: &str = "09:00";
pub const DEFAULT_END: &str = "18:00";

/// A single-day window with `HH:MM` start/end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventWindow {
    pub date: String,
    pub start: String,
    pub end: String,
}

impl EventWindow {
    /// `YYYY-MM-DD HH:MM` for the start of the window.
    pub fn start_stamp(&self) -> String {
        format!("{} {}", self.date, self.start)
    }

    /// `YYYY-MM-DD HH:MM` for the end of the window (same calendar date).
    pub fn end_stamp(&self) -> String {
        format!("{} {}", self.date, self.end)
    }

    /// Parse start/end into datetimes; an end at or before the start rolls to the next day.
    pub fn bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let start = NaiveDateTime::parse_from_str(&self.start_stamp(), "%Y-%m-%d %H:%M").ok()?;
        let mut end = NaiveDateTime::parse_from_str(&self.end_stamp(), "%Y-%m-%d %H:%M").ok()?;
        if end <= start {
            end += chrono::Duration::days(1);
        }
        Some((start, end))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSchedule {
    /// Blank input.
    Unspecified,
    /// A single timestamp; holds the first 19 characters of the trimmed input.
    Instant(String),
    Range(EventWindow),
}

impl EventSchedule {
    pub fn parse(date_time: &str) -> EventSchedule {
        let dt = date_time.trim();
        if dt.is_empty() {
            return EventSchedule::Unspecified;
        }

        let Some(sep) = RANGE_SEPARATORS.iter().find(|s| dt.contains(*s)) else {
            return EventSchedule::Instant(take_chars(dt, 19));
        };

        let (left, right) = dt.split_once(sep).unwrap_or((dt, ""));
        let left = left.trim();
        let right = right.trim();

        let left_len = left.chars().count();
        let date = take_chars(left, 10);

        let mut start = if left_len >= 16 {
            slice_chars(left, 11, 16).trim().to_string()
        } else if left_len <= 10 {
            DEFAULT_START.to_string()
        } else {
            let tail = slice_chars(left, 11, left_len).trim().to_string();
            if tail.is_empty() {
                DEFAULT_START.to_string()
            } else {
                tail
            }
        };
        if start.chars().count() != 5 {
            start = DEFAULT_START.to_string();
        }

        let end = if right.chars().count() >= 5 {
            take_chars(right, 5).trim().to_string()
        } else {
            DEFAULT_END.to_string()
        };

        EventSchedule::Range(EventWindow { date, start, end })
    }

    pub fn window(&self) -> Option<&EventWindow> {
        match self {
            EventSchedule::Range(w) => Some(w),
            _ => None,
        }
    }

    /// ISO timestamp suitable for a weather lookup.
    pub fn lookup_timestamp(&self, raw: &str) -> String {
        match self {
            EventSchedule::Range(w) => format!("{}T{}:00", w.date, w.start),
            EventSchedule::Instant(_) => take_chars(&raw.trim().replace(' ', "T"), 19),
            EventSchedule::Unspecified => raw.to_string(),
        }
    }

    /// The date/time line rendered into the analysis prompt.
    pub fn prompt_line(&self) -> String {
        match self {
            EventSchedule::Unspecified => "Date / Time: Not specified.".to_string(),
            EventSchedule::Instant(dt) => format!("Date / Time: {dt}"),
            EventSchedule::Range(w) => format!(
                "Event date: {}. Time range: {} to {} (consider how risks vary by time: \
                 opening rush, midday peak, closing, etc.).",
                w.date, w.start, w.end
            ),
        }
    }
}

/// First `n` characters (not bytes) of `s`.
pub(crate) fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn slice_chars(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}
