//! Request, risk, and response types for event risk simulations.
//!
//! Everything here serializes to snake_case JSON. `RiskItem` and the derived
//! analytics are only ever constructed by the pipeline (`normalize`, `analytics`).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Geometry
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Arithmetic mean of the polygon vertices.
///
/// Returns `None` for an empty polygon.
pub fn centroid(polygon: &[LatLng]) -> Option<LatLng> {
    if polygon.is_empty() {
        return None;
    }
    let n = polygon.len() as f64;
    let lat = polygon.iter().map(|p| p.lat).sum::<f64>() / n;
    let lng = polygon.iter().map(|p| p.lng).sum::<f64>() / n;
    Some(LatLng { lat, lng })
}

// =============================================================================
// Request enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MusicFestival,
    Fireworks,
    Marathon,
    Demonstration,
    SportsEvent,
    Exhibition,
    Other,
}

impl EventType {
    pub fn label(&self) -> &'static str {
        match self {
            EventType::MusicFestival => "Music Festival / Concert",
            EventType::Fireworks => "Fireworks Display",
            EventType::Marathon => "Marathon / Running Event",
            EventType::Demonstration => "Demonstration / Protest March",
            EventType::SportsEvent => "Sports Event",
            EventType::Exhibition => "Exhibition / Convention",
            EventType::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudienceType {
    Youth,
    Family,
    Elderly,
    Mixed,
}

impl AudienceType {
    pub fn label(&self) -> &'static str {
        match self {
            AudienceType::Youth => "Primarily young adults (18-30)",
            AudienceType::Family => "Family-oriented (children and parents)",
            AudienceType::Elderly => "Primarily elderly (65+)",
            AudienceType::Mixed => "Mixed demographics",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    Cloudy,
    Rain,
    HeavyRain,
    Storm,
    Snow,
    ExtremeHeat,
}

impl WeatherCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherCondition::Clear => "clear",
            WeatherCondition::Cloudy => "cloudy",
            WeatherCondition::Rain => "rain",
            WeatherCondition::HeavyRain => "heavy_rain",
            WeatherCondition::Storm => "storm",
            WeatherCondition::Snow => "snow",
            WeatherCondition::ExtremeHeat => "extreme_heat",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WeatherCondition::Clear => "Clear sky",
            WeatherCondition::Cloudy => "Cloudy",
            WeatherCondition::Rain => "Light to moderate rain",
            WeatherCondition::HeavyRain => "Heavy rain",
            WeatherCondition::Storm => "Storm / Thunderstorm",
            WeatherCondition::Snow => "Snow",
            WeatherCondition::ExtremeHeat => "Extreme heat",
        }
    }
}

/// Viewpoint the organiser wants the assessment tailored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Organizer,
    Security,
    LocalGov,
    VenueManager,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Organizer => "organizer",
            UserRole::Security => "security",
            UserRole::LocalGov => "local_gov",
            UserRole::VenueManager => "venue_manager",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertThreshold {
    Conservative,
    Standard,
    Aggressive,
}

impl AlertThreshold {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertThreshold::Conservative => "conservative",
            AlertThreshold::Standard => "standard",
            AlertThreshold::Aggressive => "aggressive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ja,
    En,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::Ja => "ja",
            Locale::En => "en",
        }
    }
}

// =============================================================================
// Request
// =============================================================================

/// Structured description of a planned public event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub event_name: String,
    pub event_type: EventType,
    pub event_location: String,
    /// ISO-ish timestamp, optionally a range such as `2026-08-01T09:00 - 18:00`.
    pub date_time: String,
    pub expected_attendance: u64,
    pub audience_type: AudienceType,
    #[serde(default)]
    pub temperature_celsius: Option<f64>,
    #[serde(default)]
    pub precipitation_probability: Option<f64>,
    #[serde(default)]
    pub weather_condition: Option<WeatherCondition>,
    pub polygon: Vec<LatLng>,
    #[serde(default)]
    pub additional_notes: String,
    #[serde(default)]
    pub locale: Locale,
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub alert_threshold: Option<AlertThreshold>,
}

impl SimulationRequest {
    /// Weather supplied by the organiser, only when all three fields are present.
    pub fn supplied_weather(&self) -> Option<WeatherSnapshot> {
        Some(WeatherSnapshot {
            temperature_celsius: self.temperature_celsius?,
            precipitation_probability: self.precipitation_probability?,
            condition: self.weather_condition?,
        })
    }
}

/// (temperature, precipitation probability, condition) triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature_celsius: f64,
    pub precipitation_probability: f64,
    #[serde(rename = "weather_condition")]
    pub condition: WeatherCondition,
}

impl Default for WeatherSnapshot {
    fn default() -> Self {
        Self {
            temperature_celsius: 25.0,
            precipitation_probability: 20.0,
            condition: WeatherCondition::Clear,
        }
    }
}

// =============================================================================
// Risk items
// =============================================================================

/// The six fixed risk domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    CrowdSafety,
    TrafficLogistics,
    EnvironmentalHealth,
    Operational,
    Visibility,
    LegalCompliance,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 6] = [
        RiskCategory::CrowdSafety,
        RiskCategory::TrafficLogistics,
        RiskCategory::EnvironmentalHealth,
        RiskCategory::Operational,
        RiskCategory::Visibility,
        RiskCategory::LegalCompliance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::CrowdSafety => "crowd_safety",
            RiskCategory::TrafficLogistics => "traffic_logistics",
            RiskCategory::EnvironmentalHealth => "environmental_health",
            RiskCategory::Operational => "operational",
            RiskCategory::Visibility => "visibility",
            RiskCategory::LegalCompliance => "legal_compliance",
        }
    }

    /// Exact lookup of a canonical label (after trim + lowercase).
    pub fn parse(label: &str) -> Option<RiskCategory> {
        let label = label.trim().to_lowercase();
        RiskCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == label)
    }

    /// Total mapping: anything unrecognised is `Operational`.
    pub fn from_label(label: &str) -> RiskCategory {
        RiskCategory::parse(label).unwrap_or(RiskCategory::Operational)
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLocation {
    pub center: LatLng,
    pub radius_meters: f64,
}

/// One normalized hazard finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskItem {
    pub id: String,
    pub category: RiskCategory,
    pub title: String,
    pub description: String,
    /// Always within [0, 1].
    pub probability: f64,
    /// Always within [1, 10].
    pub severity: f64,
    pub location: RiskLocation,
    pub location_description: String,
    pub mitigation_actions: Vec<String>,
    pub cascading_risks: Vec<String>,
    pub importance: Option<f64>,
    pub urgency: Option<f64>,
    pub execution_difficulty: Option<f64>,
    pub evidence: String,
}

// =============================================================================
// Derived analytics
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactorContribution {
    pub factor: String,
    pub label: String,
    pub weight: f64,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactorBreakdown {
    pub risk_id: String,
    pub factors: Vec<RiskFactorContribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskTimeSlot {
    pub start_time: String,
    pub end_time: String,
    /// Always within [1, 10].
    pub risk_score: f64,
    pub risk_ids: Vec<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub id: String,
    pub location_description: String,
    pub center: LatLng,
    pub radius_meters: f64,
    pub reason: String,
    pub severity: f64,
    pub suggested_measures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitigationTask {
    pub id: String,
    pub risk_id: Option<String>,
    pub who: String,
    pub action: String,
    pub due_by: Option<String>,
    pub required_items: Vec<String>,
    pub impact_score: Option<f64>,
    pub category: Option<String>,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitigationImpact {
    pub mitigation_id: String,
    pub risk_score_delta: f64,
    pub danger_count_delta: Option<i32>,
    pub congestion_time_delta_minutes: Option<f64>,
    pub indicators_improved: Vec<String>,
}

/// Coarse reason tag for a map danger point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DangerReason {
    BlindSpot,
    Narrow,
    Slope,
    Other,
}

impl DangerReason {
    pub fn for_category(category: RiskCategory) -> DangerReason {
        match category {
            RiskCategory::Visibility => DangerReason::BlindSpot,
            RiskCategory::CrowdSafety => DangerReason::Narrow,
            RiskCategory::EnvironmentalHealth => DangerReason::Slope,
            _ => DangerReason::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDangerPoint {
    pub id: String,
    pub center: LatLng,
    pub reason: DangerReason,
    pub label: String,
    pub risk_id: Option<String>,
}

// =============================================================================
// Response
// =============================================================================

/// Aggregate result of one simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResponse {
    pub simulation_id: String,
    pub event_name: String,
    pub event_location: String,
    pub date_time: String,
    pub risks: Vec<RiskItem>,
    /// Always within [0, 10].
    pub overall_risk_score: f64,
    pub summary: String,
    pub recommendations: Vec<String>,
    /// Every category is present, zero when no risk landed in it.
    pub risk_count_by_category: BTreeMap<RiskCategory, usize>,
    pub weather_used: Option<WeatherSnapshot>,
    pub locale: Locale,
    #[serde(default)]
    pub risk_factor_breakdowns: Vec<RiskFactorBreakdown>,
    #[serde(default)]
    pub risk_time_series: Vec<RiskTimeSlot>,
    #[serde(default)]
    pub bottlenecks: Vec<Bottleneck>,
    #[serde(default)]
    pub mitigation_tasks: Vec<MitigationTask>,
    #[serde(default)]
    pub mitigation_impacts: Vec<MitigationImpact>,
    #[serde(default)]
    pub danger_points: Vec<MapDangerPoint>,
}

/// Per-category tally with all six categories present.
pub fn count_by_category(risks: &[RiskItem]) -> BTreeMap<RiskCategory, usize> {
    let mut counts: BTreeMap<RiskCategory, usize> =
        RiskCategory::ALL.into_iter().map(|c| (c, 0)).collect();
    for risk in risks {
        *counts.entry(risk.category).or_insert(0) += 1;
    }
    counts
}

/// Short random identifier (first 8 hex chars of a v4 UUID).
pub(crate) fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_mapping_is_total() {
        assert_eq!(
            RiskCategory::from_label("  Crowd_Safety "),
            RiskCategory::CrowdSafety
        );
        assert_eq!(
            RiskCategory::from_label("legal_compliance"),
            RiskCategory::LegalCompliance
        );
        assert_eq!(RiskCategory::from_label("alien_invasion"), RiskCategory::Operational);
        assert_eq!(RiskCategory::from_label(""), RiskCategory::Operational);
        assert!(RiskCategory::parse("alien_invasion").is_none());
    }

    #[test]
    fn count_by_category_zero_fills() {
        let counts = count_by_category(&[]);
        assert_eq!(counts.len(), 6);
        assert!(counts.values().all(|&n| n == 0));
    }

    #[test]
    fn category_counts_serialize_with_snake_case_keys() {
        let counts = count_by_category(&[]);
        let json = serde_json::to_value(&counts).unwrap();
        assert_eq!(json["environmental_health"], 0);
        assert_eq!(json.as_object().unwrap().len(), 6);
    }

    #[test]
    fn centroid_averages_vertices() {
        let poly = [
            LatLng::new(35.0, 139.0),
            LatLng::new(35.2, 139.0),
            LatLng::new(35.1, 139.3),
        ];
        let c = centroid(&poly).unwrap();
        assert!((c.lat - 35.1).abs() < 1e-9);
        assert!((c.lng - 139.1).abs() < 1e-9);
        assert!(centroid(&[]).is_none());
    }

    #[test]
    fn supplied_weather_requires_all_three_fields() {
        let json = serde_json::json!({
            "event_name": "Summer Fest",
            "event_type": "music_festival",
            "event_location": "Makuhari",
            "date_time": "2026-08-01T10:00",
            "expected_attendance": 28000,
            "audience_type": "youth",
            "temperature_celsius": 31.0,
            "polygon": [
                {"lat": 35.64, "lng": 140.03},
                {"lat": 35.65, "lng": 140.04},
                {"lat": 35.64, "lng": 140.05}
            ]
        });
        let mut req: SimulationRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.locale, Locale::Ja);
        assert!(req.supplied_weather().is_none());

        req.precipitation_probability = Some(40.0);
        req.weather_condition = Some(WeatherCondition::Rain);
        let w = req.supplied_weather().unwrap();
        assert_eq!(w.condition, WeatherCondition::Rain);
    }

    #[test]
    fn short_ids_are_eight_chars() {
        let id = short_id();
        assert_eq!(id.len(), 8);
        assert_ne!(id, short_id());
    }
}
