//! Input validation.
//!
//! `SimulationRequest::validate` is the hard gate before any I/O. `validate_input`
//! is a lighter form check that reports per-field issues for partially filled drafts.

use serde::{Deserialize, Serialize};

use super::types::SimulationRequest;
use super::SimulationError;

pub const MAX_EVENT_NAME_CHARS: usize = 200;
pub const MAX_LOCATION_CHARS: usize = 500;
pub const MAX_NOTES_CHARS: usize = 2000;
pub const MAX_ATTENDANCE: u64 = 10_000_000;
pub const MIN_POLYGON_POINTS: usize = 3;

/// Attendance above this draws a warning in `validate_input`.
pub const LARGE_EVENT_ATTENDANCE: u64 = 500_000;

impl SimulationRequest {
    /// Reject out-of-range input. All violations are reported together.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let mut problems = Vec::new();

        let name_len = self.event_name.trim().chars().count();
        if name_len == 0 || self.event_name.chars().count() > MAX_EVENT_NAME_CHARS {
            problems.push(format!("event_name must be 1-{MAX_EVENT_NAME_CHARS} characters"));
        }
        let location_len = self.event_location.trim().chars().count();
        if location_len == 0 || self.event_location.chars().count() > MAX_LOCATION_CHARS {
            problems.push(format!(
                "event_location must be 1-{MAX_LOCATION_CHARS} characters"
            ));
        }
        if self.date_time.trim().is_empty() {
            problems.push("date_time is required".to_string());
        }
        if !(1..=MAX_ATTENDANCE).contains(&self.expected_attendance) {
            problems.push(format!(
                "expected_attendance must be between 1 and {MAX_ATTENDANCE}"
            ));
        }
        if let Some(t) = self.temperature_celsius {
            if !(-40.0..=55.0).contains(&t) {
                problems.push("temperature_celsius must be between -40 and 55".to_string());
            }
        }
        if let Some(p) = self.precipitation_probability {
            if !(0.0..=100.0).contains(&p) {
                problems.push("precipitation_probability must be between 0 and 100".to_string());
            }
        }
        if self.polygon.len() < MIN_POLYGON_POINTS {
            problems.push(format!(
                "polygon needs at least {MIN_POLYGON_POINTS} points, got {}",
                self.polygon.len()
            ));
        }
        if let Some(idx) = self.polygon.iter().position(|p| !p.is_valid()) {
            problems.push(format!("polygon point {idx} is out of range"));
        }
        if self.additional_notes.chars().count() > MAX_NOTES_CHARS {
            problems.push(format!(
                "additional_notes must be at most {MAX_NOTES_CHARS} characters"
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SimulationError::InvalidRequest(problems.join("; ")))
        }
    }
}

/// Partially filled form, as submitted before a full request exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputDraft {
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub event_location: String,
    #[serde(default)]
    pub date_time: String,
    #[serde(default)]
    pub expected_attendance: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub code: String,
    pub message: String,
    pub severity: IssueSeverity,
}

impl ValidationIssue {
    fn error(field: &str, code: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            code: code.to_string(),
            message: message.to_string(),
            severity: IssueSeverity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True when no issue has error severity.
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

pub fn validate_input(draft: &InputDraft) -> ValidationReport {
    let mut issues = Vec::new();
    if draft.event_name.trim().is_empty() {
        issues.push(ValidationIssue::error(
            "event_name",
            "required",
            "イベント名は必須です。",
        ));
    }
    if draft.event_location.trim().is_empty() {
        issues.push(ValidationIssue::error(
            "event_location",
            "required",
            "開催場所は必須です。",
        ));
    }
    if draft.date_time.trim().is_empty() {
        issues.push(ValidationIssue::error(
            "date_time",
            "required",
            "開催日時は必須です。",
        ));
    }
    if draft.expected_attendance == 0 {
        issues.push(ValidationIssue::error(
            "expected_attendance",
            "min",
            "予想来場者数は1以上を入力してください。",
        ));
    }
    if draft.expected_attendance > LARGE_EVENT_ATTENDANCE && issues.is_empty() {
        issues.push(ValidationIssue {
            field: "expected_attendance".to_string(),
            code: "warning".to_string(),
            message: "50万人超のイベントは要確認です。".to_string(),
            severity: IssueSeverity::Warning,
        });
    }

    ValidationReport {
        valid: issues.iter().all(|i| i.severity != IssueSeverity::Error),
        issues,
    }
}
