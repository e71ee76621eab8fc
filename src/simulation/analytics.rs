//! Secondary analytics derived from the normalized risk set.
//!
//! Everything here is a pure function of the risks, the overall score, and the raw
//! event date/time. It runs once per simulation.

use chrono::{Duration, NaiveDateTime};

use super::types::{
    short_id, Bottleneck, DangerReason, MapDangerPoint, MitigationImpact, MitigationTask,
    RiskFactorBreakdown, RiskFactorContribution, RiskItem, RiskTimeSlot,
};
use crate::schedule::{take_chars, EventSchedule};

/// Severity at or above which a located risk becomes a bottleneck.
pub const BOTTLENECK_SEVERITY: f64 = 7.0;

/// Number of risk ids attached to each time slot.
const SLOT_RISK_IDS: usize = 5;
const BOTTLENECK_MEASURES: usize = 3;
const EXPLANATION_CHARS: usize = 100;
const DANGER_LABEL_CHARS: usize = 30;

const TASK_OWNER: &str = "担当者";
const TASK_CATEGORY: &str = "general";
const IMPACT_INDICATOR: &str = "リスク低減";
const RANGE_FALLBACK_LABEL: &str = "開催時間帯";
const MAIN_SLOT_LABEL: &str = "メイン時間帯";
const DANGER_FALLBACK_LABEL: &str = "リスク";

const SLOT_TIMESTAMP: &str = "%Y-%m-%dT%H:%M:%S";

// Time-of-day curve. Tunable policy values, kept stable for compatibility.
const SHORT_FIRST_BOOST: f64 = 0.20;
const SHORT_LAST_BOOST: f64 = 0.15;
const OPENING_END: f64 = 0.2;
const CLOSING_START: f64 = 0.8;
const OPENING_PEAK: f64 = 0.25;
const CLOSING_PEAK: f64 = 0.20;
const TROUGH_FLOOR: f64 = 0.85;
const TROUGH_RISE: f64 = 0.15;

// Per-task impact bounds.
const IMPACT_DIVISOR: f64 = 40.0;
const IMPACT_MIN: f64 = 0.08;
const IMPACT_MAX: f64 = 0.35;
const FIRST_ACTION_CONGESTION_MINUTES: f64 = -5.0;
const LATER_ACTION_CONGESTION_MINUTES: f64 = -2.0;

/// Risk multiplier for slot `i` of `n` hourly slots.
///
/// Short events boost the first and last slot. Longer ones follow an
/// opening rush, a midday trough, and a closing rise.
pub fn slot_multiplier(n: usize, i: usize) -> f64 {
    if n <= 1 {
        return 1.0;
    }
    if n <= 3 {
        return if i == 0 {
            1.0 + SHORT_FIRST_BOOST
        } else if i == n - 1 {
            1.0 + SHORT_LAST_BOOST
        } else {
            1.0
        };
    }
    let t = i as f64 / (n - 1) as f64;
    if t < OPENING_END {
        1.0 + OPENING_PEAK * (1.0 - t / OPENING_END)
    } else if t > CLOSING_START {
        1.0 + CLOSING_PEAK * ((t - CLOSING_START) / (1.0 - CLOSING_START))
    } else {
        TROUGH_FLOOR + TROUGH_RISE * (t - OPENING_END) / (CLOSING_START - OPENING_END)
    }
}

/// Projected risk-score reduction for one completed mitigation of a risk at `severity`.
pub fn impact_delta(severity: f64) -> f64 {
    -round_to((severity / IMPACT_DIVISOR).clamp(IMPACT_MIN, IMPACT_MAX), 2)
}

/// Hourly `[start, end)` slots; the last one is cut at `end`.
pub fn hourly_slots(
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let mut slots = Vec::new();
    let mut slot_start = start;
    while slot_start < end {
        let slot_end = (slot_start + Duration::hours(1)).min(end);
        slots.push((slot_start, slot_end));
        slot_start = slot_end;
    }
    slots
}

/// All derived collections for one simulation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analytics {
    pub risk_factor_breakdowns: Vec<RiskFactorBreakdown>,
    pub risk_time_series: Vec<RiskTimeSlot>,
    pub bottlenecks: Vec<Bottleneck>,
    pub mitigation_tasks: Vec<MitigationTask>,
    pub mitigation_impacts: Vec<MitigationImpact>,
    pub danger_points: Vec<MapDangerPoint>,
}

impl Analytics {
    pub fn derive(risks: &[RiskItem], overall_risk_score: f64, date_time: &str) -> Self {
        let schedule = EventSchedule::parse(date_time);
        let (mitigation_tasks, mitigation_impacts) = mitigations(risks, &schedule, date_time);

        Self {
            risk_factor_breakdowns: risks.iter().map(factor_breakdown).collect(),
            risk_time_series: time_series(risks, overall_risk_score, &schedule, date_time),
            bottlenecks: risks.iter().filter_map(bottleneck).collect(),
            mitigation_tasks,
            mitigation_impacts,
            danger_points: risks.iter().map(danger_point).collect(),
        }
    }
}

fn factor_breakdown(risk: &RiskItem) -> RiskFactorBreakdown {
    let explanation = if !risk.evidence.is_empty() {
        Some(risk.evidence.clone())
    } else if !risk.description.is_empty() {
        Some(take_chars(&risk.description, EXPLANATION_CHARS))
    } else {
        None
    };

    RiskFactorBreakdown {
        risk_id: risk.id.clone(),
        factors: vec![
            RiskFactorContribution {
                factor: "severity".to_string(),
                label: "深刻度".to_string(),
                weight: risk.severity / 10.0,
                explanation,
            },
            RiskFactorContribution {
                factor: "probability".to_string(),
                label: "発生確率".to_string(),
                weight: risk.probability,
                explanation: None,
            },
        ],
    }
}

fn time_series(
    risks: &[RiskItem],
    overall: f64,
    schedule: &EventSchedule,
    date_time: &str,
) -> Vec<RiskTimeSlot> {
    if risks.is_empty() {
        return Vec::new();
    }
    let risk_ids: Vec<String> = risks
        .iter()
        .take(SLOT_RISK_IDS)
        .map(|r| r.id.clone())
        .collect();

    let Some(window) = schedule.window() else {
        let dt = take_chars(date_time, 19);
        return vec![RiskTimeSlot {
            start_time: dt.clone(),
            end_time: dt,
            risk_score: overall,
            risk_ids,
            label: Some(MAIN_SLOT_LABEL.to_string()),
        }];
    };

    let Some((start, end)) = window.bounds() else {
        return vec![RiskTimeSlot {
            start_time: window.start_stamp(),
            end_time: window.end_stamp(),
            risk_score: overall,
            risk_ids,
            label: Some(RANGE_FALLBACK_LABEL.to_string()),
        }];
    };

    let slots = hourly_slots(start, end);
    let n = slots.len();
    slots
        .into_iter()
        .enumerate()
        .map(|(i, (st, en))| RiskTimeSlot {
            start_time: st.format(SLOT_TIMESTAMP).to_string(),
            end_time: en.format(SLOT_TIMESTAMP).to_string(),
            risk_score: round_to(overall * slot_multiplier(n, i), 1).clamp(1.0, 10.0),
            risk_ids: risk_ids.clone(),
            label: Some(format!("{}–{}", st.format("%H:%M"), en.format("%H:%M"))),
        })
        .collect()
}

fn bottleneck(risk: &RiskItem) -> Option<Bottleneck> {
    if risk.severity < BOTTLENECK_SEVERITY || risk.location_description.is_empty() {
        return None;
    }
    Some(Bottleneck {
        id: short_id(),
        location_description: risk.location_description.clone(),
        center: risk.location.center,
        radius_meters: risk.location.radius_meters,
        reason: risk.title.clone(),
        severity: risk.severity,
        suggested_measures: risk
            .mitigation_actions
            .iter()
            .take(BOTTLENECK_MEASURES)
            .cloned()
            .collect(),
    })
}

fn mitigations(
    risks: &[RiskItem],
    schedule: &EventSchedule,
    date_time: &str,
) -> (Vec<MitigationTask>, Vec<MitigationImpact>) {
    let due_by = match schedule.window() {
        Some(w) => Some(take_chars(&w.start_stamp(), 10)),
        None if date_time.trim().is_empty() => None,
        None => Some(take_chars(date_time.trim(), 10)),
    };

    let mut tasks = Vec::new();
    let mut impacts = Vec::new();
    for risk in risks {
        for (i, action) in risk.mitigation_actions.iter().enumerate() {
            let task = MitigationTask {
                id: short_id(),
                risk_id: Some(risk.id.clone()),
                who: TASK_OWNER.to_string(),
                action: action.clone(),
                due_by: due_by.clone(),
                required_items: Vec::new(),
                impact_score: Some(risk.severity),
                category: Some(TASK_CATEGORY.to_string()),
                checked: false,
            };
            let first = i == 0;
            impacts.push(MitigationImpact {
                mitigation_id: task.id.clone(),
                risk_score_delta: impact_delta(risk.severity),
                danger_count_delta: Some(if first { -1 } else { 0 }),
                congestion_time_delta_minutes: Some(if first {
                    FIRST_ACTION_CONGESTION_MINUTES
                } else {
                    LATER_ACTION_CONGESTION_MINUTES
                }),
                indicators_improved: vec![IMPACT_INDICATOR.to_string()],
            });
            tasks.push(task);
        }
    }
    (tasks, impacts)
}

fn danger_point(risk: &RiskItem) -> MapDangerPoint {
    let label = if !risk.title.is_empty() {
        take_chars(&risk.title, DANGER_LABEL_CHARS)
    } else if !risk.location_description.is_empty() {
        risk.location_description.clone()
    } else {
        DANGER_FALLBACK_LABEL.to_string()
    };

    MapDangerPoint {
        id: short_id(),
        center: risk.location.center,
        reason: DangerReason::for_category(risk.category),
        label,
        risk_id: Some(risk.id.clone()),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::{LatLng, RiskCategory, RiskLocation};

    fn risk(title: &str, severity: f64, location_description: &str, actions: &[&str]) -> RiskItem {
        RiskItem {
            id: short_id(),
            category: RiskCategory::CrowdSafety,
            title: title.to_string(),
            description: "Crowd builds up at the east gate after the headline act.".to_string(),
            probability: 0.6,
            severity,
            location: RiskLocation {
                center: LatLng::new(35.64, 140.03),
                radius_meters: 80.0,
            },
            location_description: location_description.to_string(),
            mitigation_actions: actions.iter().map(|s| s.to_string()).collect(),
            cascading_risks: Vec::new(),
            importance: None,
            urgency: None,
            execution_difficulty: None,
            evidence: String::new(),
        }
    }

    #[test]
    fn multiplier_curve_shape() {
        assert_eq!(slot_multiplier(1, 0), 1.0);
        assert!((slot_multiplier(2, 0) - 1.2).abs() < 1e-12);
        assert!((slot_multiplier(2, 1) - 1.15).abs() < 1e-12);
        assert_eq!(slot_multiplier(3, 1), 1.0);

        // Long events: opening peak, trough floor, closing peak.
        assert!((slot_multiplier(9, 0) - 1.25).abs() < 1e-12);
        assert!((slot_multiplier(11, 2) - 0.85).abs() < 1e-12);
        assert!((slot_multiplier(9, 8) - 1.2).abs() < 1e-12);
        for n in 4..30 {
            for i in 0..n {
                let m = slot_multiplier(n, i);
                assert!((0.85..=1.25).contains(&m), "n={n} i={i} m={m}");
            }
        }
    }

    #[test]
    fn nine_hour_event_has_nine_slots_in_range() {
        let risks = vec![risk("crush", 8.0, "east gate", &["open more lanes"])];
        let a = Analytics::derive(&risks, 9.5, "2026-08-01T09:00 - 18:00");
        assert_eq!(a.risk_time_series.len(), 9);
        let first = &a.risk_time_series[0];
        assert!(first.risk_score >= 9.5);
        assert_eq!(first.start_time, "2026-08-01T09:00:00");
        assert_eq!(first.label.as_deref(), Some("09:00–10:00"));
        assert!(a
            .risk_time_series
            .iter()
            .all(|s| (1.0..=10.0).contains(&s.risk_score)));
    }

    #[test]
    fn overnight_event_rolls_past_midnight() {
        let risks = vec![risk("noise", 4.0, "", &[])];
        let a = Analytics::derive(&risks, 5.0, "2026-12-31 22:00 - 01:30");
        let series = &a.risk_time_series;
        assert_eq!(series.len(), 4);
        assert_eq!(series[3].end_time, "2027-01-01T01:30:00");
        assert_eq!(series[3].label.as_deref(), Some("01:00–01:30"));
    }

    #[test]
    fn non_range_date_gets_single_main_slot() {
        let risks = vec![risk("heat", 6.0, "", &[])];
        let a = Analytics::derive(&risks, 6.3, "2026-08-01T10:00:00+09:00");
        assert_eq!(a.risk_time_series.len(), 1);
        let slot = &a.risk_time_series[0];
        assert_eq!(slot.start_time, "2026-08-01T10:00:00");
        assert_eq!(slot.risk_score, 6.3);
        assert_eq!(slot.label.as_deref(), Some(MAIN_SLOT_LABEL));
    }

    #[test]
    fn unparseable_range_keeps_raw_bounds() {
        let risks = vec![risk("heat", 6.0, "", &[])];
        let a = Analytics::derive(&risks, 4.0, "sometime – later");
        assert_eq!(a.risk_time_series.len(), 1);
        assert_eq!(a.risk_time_series[0].label.as_deref(), Some(RANGE_FALLBACK_LABEL));
        assert_eq!(a.risk_time_series[0].risk_score, 4.0);
    }

    #[test]
    fn no_risks_no_time_series() {
        let a = Analytics::derive(&[], 5.0, "2026-08-01T09:00 - 18:00");
        assert_eq!(a, Analytics::default());
    }

    #[test]
    fn bottleneck_threshold() {
        let risks = vec![
            risk("below", 6.9, "north stairs", &["a"]),
            risk("at", 7.0, "south stairs", &["a", "b", "c", "d"]),
            risk("unlocated", 9.0, "", &["a"]),
        ];
        let a = Analytics::derive(&risks, 5.0, "");
        assert_eq!(a.bottlenecks.len(), 1);
        let b = &a.bottlenecks[0];
        assert_eq!(b.reason, "at");
        assert_eq!(b.location_description, "south stairs");
        assert_eq!(b.suggested_measures, vec!["a", "b", "c"]);
    }

    #[test]
    fn mitigation_impacts_pair_with_tasks() {
        let risks = vec![
            risk("crush", 8.0, "gate", &["stewards", "barriers", "signage"]),
            risk("minor", 2.0, "", &["cones"]),
        ];
        let a = Analytics::derive(&risks, 5.0, "2026-08-01T09:00 - 18:00");
        assert_eq!(a.mitigation_tasks.len(), 4);
        assert_eq!(a.mitigation_impacts.len(), 4);
        for (task, impact) in a.mitigation_tasks.iter().zip(&a.mitigation_impacts) {
            assert_eq!(task.id, impact.mitigation_id);
            assert_eq!(task.due_by.as_deref(), Some("2026-08-01"));
            assert_eq!(task.who, TASK_OWNER);
        }

        let deltas: Vec<_> = a
            .mitigation_impacts
            .iter()
            .map(|i| i.danger_count_delta)
            .collect();
        assert_eq!(deltas, [Some(-1), Some(0), Some(0), Some(-1)]);
        assert_eq!(a.mitigation_impacts[0].risk_score_delta, -0.2);
        assert_eq!(a.mitigation_impacts[1].congestion_time_delta_minutes, Some(-2.0));
        // Floor applies to low severity.
        assert_eq!(a.mitigation_impacts[3].risk_score_delta, -0.08);
        assert_eq!(a.mitigation_tasks[0].impact_score, Some(8.0));
    }

    #[test]
    fn impact_delta_is_clamped() {
        assert_eq!(impact_delta(10.0), -0.25);
        assert_eq!(impact_delta(1.0), -0.08);
        assert_eq!(impact_delta(20.0), -0.35);
    }

    #[test]
    fn danger_points_follow_category_and_title() {
        let mut long = risk("a very long title that clearly exceeds thirty characters", 5.0, "", &[]);
        long.category = RiskCategory::Visibility;
        let mut untitled = risk("", 5.0, "west exit", &[]);
        untitled.category = RiskCategory::LegalCompliance;
        let anonymous = risk("", 5.0, "", &[]);

        let a = Analytics::derive(&[long, untitled, anonymous], 5.0, "");
        let points = &a.danger_points;
        assert_eq!(points[0].reason, DangerReason::BlindSpot);
        assert_eq!(points[0].label.chars().count(), 30);
        assert_eq!(points[1].reason, DangerReason::Other);
        assert_eq!(points[1].label, "west exit");
        assert_eq!(points[2].reason, DangerReason::Narrow);
        assert_eq!(points[2].label, DANGER_FALLBACK_LABEL);
    }

    #[test]
    fn factor_breakdown_prefers_evidence() {
        let mut r = risk("crush", 8.0, "", &[]);
        let a = Analytics::derive(std::slice::from_ref(&r), 5.0, "");
        let severity = &a.risk_factor_breakdowns[0].factors[0];
        assert_eq!(severity.weight, 0.8);
        assert!(severity.explanation.as_deref().unwrap().starts_with("Crowd builds"));

        r.evidence = "Single exit, 28k attendance".to_string();
        let a = Analytics::derive(std::slice::from_ref(&r), 5.0, "");
        let factors = &a.risk_factor_breakdowns[0].factors;
        assert_eq!(factors[0].explanation.as_deref(), Some("Single exit, 28k attendance"));
        assert_eq!(factors[1].label, "発生確率");
        assert_eq!(factors[1].explanation, None);
    }
}
