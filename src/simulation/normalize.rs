//! Conversion from the model's loosely-typed JSON into domain types.
//!
//! This is the only place a `serde_json::Value` from the model is read. Each risk
//! record is converted independently; a record that cannot be shaped is logged and
//! skipped while the rest of the batch survives.

use serde_json::{Map, Value};
use tracing::warn;

use super::types::{short_id, LatLng, RiskCategory, RiskItem, RiskLocation};

pub const DEFAULT_PROBABILITY: f64 = 0.5;
pub const DEFAULT_SEVERITY: f64 = 5.0;
pub const DEFAULT_OVERALL_SCORE: f64 = 5.0;
pub const DEFAULT_RADIUS_METERS: f64 = 50.0;
pub const DEFAULT_SUMMARY: &str = "Risk analysis complete.";

/// Qualitative probability labels. Closed set, English and Japanese.
const PROBABILITY_LABELS: [(&str, f64); 6] = [
    ("高", 0.8),
    ("high", 0.8),
    ("中", 0.5),
    ("medium", 0.5),
    ("低", 0.2),
    ("low", 0.2),
];

/// Qualitative severity labels. Closed set, English and Japanese.
const SEVERITY_LABELS: [(&str, f64); 7] = [
    ("高", 8.0),
    ("high", 8.0),
    ("中", 5.0),
    ("medium", 5.0),
    ("medium-high", 6.0),
    ("低", 2.0),
    ("low", 2.0),
];

/// Why a single risk record was rejected.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum NormalizeError {
    #[error("record is not an object")]
    NotAnObject,
    #[error("`{0}` must be an object")]
    FieldNotObject(&'static str),
    #[error("`{field}` must be a string")]
    FieldNotString { field: &'static str },
    #[error("`{field}` is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },
    #[error("`{field}` out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Top-level assessment after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub risks: Vec<RiskItem>,
    /// Within [0, 10].
    pub overall_risk_score: f64,
    pub summary: String,
    pub recommendations: Vec<String>,
}

/// Normalize a whole model result: risks, overall score, summary, recommendations.
pub fn normalize_assessment(raw: &Value) -> Assessment {
    let records = raw
        .get("risks")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    Assessment {
        risks: normalize_risks(records),
        overall_risk_score: parse_overall_score(raw.get("overall_risk_score")),
        summary: raw
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_SUMMARY)
            .to_string(),
        recommendations: ensure_string_list(raw.get("recommendations")),
    }
}

/// Normalize each record, skipping the ones that fail.
pub fn normalize_risks(records: &[Value]) -> Vec<RiskItem> {
    records
        .iter()
        .enumerate()
        .filter_map(|(idx, raw)| match normalize_risk(idx, raw) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!(index = idx, error = %err, "Skipping malformed risk record");
                None
            }
        })
        .collect()
}

/// Normalize one record. `idx` only feeds the fallback title.
pub fn normalize_risk(idx: usize, raw: &Value) -> Result<RiskItem, NormalizeError> {
    let obj = raw.as_object().ok_or(NormalizeError::NotAnObject)?;

    let category = obj
        .get("category")
        .and_then(Value::as_str)
        .map(RiskCategory::from_label)
        .unwrap_or(RiskCategory::Operational);

    let title = match present(obj, "title") {
        None => format!("Risk {}", idx + 1),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(NormalizeError::FieldNotString { field: "title" }),
    };
    let description = match present(obj, "description") {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(NormalizeError::FieldNotString {
                field: "description",
            })
        }
    };

    Ok(RiskItem {
        id: short_id(),
        category,
        title,
        description,
        probability: parse_probability(obj.get("probability")),
        severity: parse_severity(obj.get("severity")),
        location: parse_location(obj)?,
        location_description: stringify(obj.get("location_description")),
        mitigation_actions: ensure_string_list(obj.get("mitigation_actions")),
        cascading_risks: ensure_string_list(obj.get("cascading_risks")),
        importance: parse_optional_score(obj.get("importance")),
        urgency: parse_optional_score(obj.get("urgency")),
        execution_difficulty: parse_optional_score(obj.get("execution_difficulty")),
        evidence: stringify(obj.get("evidence")),
    })
}

fn parse_location(obj: &Map<String, Value>) -> Result<RiskLocation, NormalizeError> {
    let empty = Map::new();
    let location = match present(obj, "location") {
        None => &empty,
        Some(v) => v
            .as_object()
            .ok_or(NormalizeError::FieldNotObject("location"))?,
    };
    let center = match present(location, "center") {
        None => &empty,
        Some(v) => v.as_object().ok_or(NormalizeError::FieldNotObject("center"))?,
    };

    let lat = required_number(center, "lat", 0.0)?;
    let lng = required_number(center, "lng", 0.0)?;
    let radius = required_number(location, "radius_meters", DEFAULT_RADIUS_METERS)?;

    if !(-90.0..=90.0).contains(&lat) {
        return Err(NormalizeError::OutOfRange { field: "lat", value: lat });
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(NormalizeError::OutOfRange { field: "lng", value: lng });
    }
    if radius.is_nan() || radius < 0.0 {
        return Err(NormalizeError::OutOfRange {
            field: "radius_meters",
            value: radius,
        });
    }

    Ok(RiskLocation {
        center: LatLng::new(lat, lng),
        radius_meters: radius,
    })
}

/// Numeric field that must coerce when present.
fn required_number(
    obj: &Map<String, Value>,
    field: &'static str,
    default: f64,
) -> Result<f64, NormalizeError> {
    match present(obj, field) {
        None => Ok(default),
        Some(v) => coerce_f64(v).ok_or_else(|| NormalizeError::NotNumeric {
            field,
            value: v.to_string(),
        }),
    }
}

/// Probability in [0, 1]. Labels first, then numeric coercion, then 0.5.
pub fn parse_probability(value: Option<&Value>) -> f64 {
    parse_scaled(value, &PROBABILITY_LABELS, 0.0, 1.0, DEFAULT_PROBABILITY)
}

/// Severity in [1, 10]. Labels first, then numeric coercion, then 5.0.
pub fn parse_severity(value: Option<&Value>) -> f64 {
    parse_scaled(value, &SEVERITY_LABELS, 1.0, 10.0, DEFAULT_SEVERITY)
}

fn parse_scaled(
    value: Option<&Value>,
    labels: &[(&str, f64)],
    min: f64,
    max: f64,
    default: f64,
) -> f64 {
    let Some(value) = value else {
        return default;
    };
    if let Some(s) = value.as_str() {
        let key = s.trim().to_lowercase();
        if let Some((_, v)) = labels.iter().find(|(label, _)| *label == key) {
            return *v;
        }
    }
    match coerce_f64(value) {
        Some(v) if !v.is_nan() => v.clamp(min, max),
        _ => default,
    }
}

/// Optional 0-10 score. Unparseable input is `None`, not a floor value.
pub fn parse_optional_score(value: Option<&Value>) -> Option<f64> {
    coerce_f64(value?)
        .filter(|v| !v.is_nan())
        .map(|v| v.clamp(0.0, 10.0))
}

/// Model-reported overall score, clamped to [0, 10].
pub fn parse_overall_score(value: Option<&Value>) -> f64 {
    value
        .and_then(coerce_f64)
        .filter(|v| !v.is_nan())
        .map(|v| v.clamp(0.0, 10.0))
        .unwrap_or(DEFAULT_OVERALL_SCORE)
}

/// A string becomes a one-element list; list elements are stringified and trimmed.
pub fn ensure_string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                Vec::new()
            } else {
                vec![s.to_string()]
            }
        }
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| stringify(Some(v)))
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Numbers, numeric strings, and booleans coerce; everything else does not.
fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    }
}

/// Field value, treating explicit `null` as absent.
fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}
