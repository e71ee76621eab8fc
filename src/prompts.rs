//! Prompt templates for event risk analysis.
//!
//! Pure rendering, no I/O. The same request always renders to the same text.

use serde_json::Value;

use crate::gateway::Message;
use crate::schedule::EventSchedule;
use crate::simulation::types::{
    centroid, AlertThreshold, Locale, RiskCategory, SimulationRequest, UserRole, WeatherSnapshot,
};

// =============================================================================
// Prompt instances
// =============================================================================

/// Rendered prompt ready for the model.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub template_slug: &'static str,
    pub system: String,
    pub user: String,
}

impl PromptInstance {
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::system(&self.system), Message::user(&self.user)]
    }
}

// =============================================================================
// System prompts
// =============================================================================

pub const SYSTEM_PROMPT: &str = r#"You are the Chief Risk Officer (CRO) for large-scale event management.
You have decades of experience analysing and mitigating risks at major
public events worldwide, including music festivals, fireworks displays,
marathons, demonstrations, and sports events.

Your task is to analyse the given event parameters and geographic area to
produce a comprehensive, multi-layered risk assessment.

RISK CATEGORIES (you must consider ALL six):
1. crowd_safety         - Crowd crush, stampede, congestion, bottlenecks, surges.
2. traffic_logistics    - Road congestion, illegal parking, vehicle-pedestrian
                          conflicts, public transit overload, delivery vehicles.
3. environmental_health - Heatstroke risk (shade / hydration), sudden weather
                          changes, evacuation route adequacy, air quality.
4. operational          - Long entry queues, insufficient restrooms, waste
                          management, noise complaints, communication failures.
5. visibility           - Height and blind spot risks: poor line-of-sight from
                          staff or cameras, areas hidden by structures or terrain,
                          multi-level visibility gaps, corners and elevated areas
                          that are hard to monitor.
6. legal_compliance     - Legal and regulatory obligations for hosting: road use
                          permits, food business notifications, fire department
                          notifications, entertainment regulations, music
                          licensing, noise ordinances, temporary structure permits.
                          Flag missing or late filings and location-specific
                          obligations.

ANALYSIS REQUIREMENTS:
- Analyse geographic features (intersections, plazas, narrow alleys, slopes,
  waterfront areas) combined with event characteristics.
- Consider CASCADING RISKS: how one risk can trigger another.
  Example: sudden rain causes a rush to covered areas, creating crush risk.
- Provide SPECIFIC LOCATIONS within the polygon for each risk using
  latitude / longitude coordinates.
- Consider time-of-day effects, crowd psychology, and infrastructure limits.
- Each risk must include concrete, actionable mitigation strategies.

LOCATION DESCRIPTION (required for every risk):
- Set "location_description" to a short, concrete text that tells readers WHERE
  the risk applies (e.g. "メインステージ正面の混雑エリア", "東入口付近の歩道").
  Use place names, landmarks, and directions.
- For traffic_logistics use concrete intersections, roads, and station exits.

OUTPUT FORMAT - respond with VALID JSON. Schema:
{
  "risks": [
    {
      "category": "crowd_safety" | "traffic_logistics" | "environmental_health" | "operational" | "visibility" | "legal_compliance",
      "title": "string",
      "description": "string",
      "location_description": "string",
      "probability": <number 0.0 to 1.0>,
      "severity": <number 1.0 to 10.0>,
      "location": { "center": { "lat": <number>, "lng": <number> }, "radius_meters": <number> },
      "mitigation_actions": [ "string", ... ],
      "cascading_risks": [ "string", ... ],
      "evidence": "string (which inputs drove this risk)"
    }
  ],
  "overall_risk_score": <number 1.0 to 10.0>,
  "summary": "string",
  "recommendations": [ "string", ... ]
}

PLAIN TEXT ONLY: no markdown or formatting characters in any string field.

NUMERIC FIELDS ONLY:
- probability MUST be a number between 0.0 and 1.0. Never "High", "Medium", "Low", "高", "中", "低".
- severity MUST be a number between 1.0 and 10.0. Never a text label.
- cascading_risks MUST be an array of strings, even for a single entry.

Generate between 10 and 20 risk items covering ALL six categories (at least 1-2
visibility and 1-2 legal_compliance risks where relevant).
Keep locations within or near the specified polygon.
Probability reflects real-world likelihood for this type and scale of event.
Severity reflects potential impact on human safety and event operations."#;

pub const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You are the Chief Risk Officer reviewing findings from six specialist analysts, one per risk category.
Weigh the findings together, accounting for cascading effects between categories.
Respond with VALID JSON only:
{"overall_risk_score": <number 1.0 to 10.0>, "summary": "string", "recommendations": ["string", ...]}
Plain text only, no markdown."#;

pub const TRANSLATION_SYSTEM_PROMPT: &str =
    "You are a professional Japanese-to-English translator for event safety reports.";

/// Language requirement appended verbatim to analysis prompts.
pub fn locale_instruction(locale: Locale) -> &'static str {
    match locale {
        Locale::Ja => {
            "\n\nLANGUAGE REQUIREMENT:\n\
             Respond entirely in Japanese. ALL text fields (title, description, \
             mitigation_actions, cascading_risks, summary, recommendations) \
             MUST be written in Japanese. JSON keys remain in English."
        }
        Locale::En => {
            "\n\nLANGUAGE REQUIREMENT:\n\
             Respond entirely in English. ALL text fields (title, description, \
             mitigation_actions, cascading_risks, summary, recommendations) \
             MUST be written in English. JSON keys remain in English."
        }
    }
}

// =============================================================================
// Analysis prompt
// =============================================================================

/// Render the analysis prompt body.
///
/// `weather_override` (fetched weather) wins over weather supplied on the request.
pub fn build_analysis_prompt(
    request: &SimulationRequest,
    weather_override: Option<&WeatherSnapshot>,
) -> String {
    let polygon = request
        .polygon
        .iter()
        .map(|p| format!("({:.6}, {:.6})", p.lat, p.lng))
        .collect::<Vec<_>>()
        .join(", ");
    let center = centroid(&request.polygon).unwrap_or_default();
    let date_time_line = EventSchedule::parse(&request.date_time).prompt_line();

    let weather_block = match (weather_override, request.supplied_weather()) {
        (Some(w), _) => format!(
            "WEATHER CONDITIONS (fetched for event date/location):\n{}",
            weather_lines(w)
        ),
        (None, Some(w)) => format!("WEATHER CONDITIONS:\n{}", weather_lines(&w)),
        (None, None) => {
            "WEATHER CONDITIONS: Not specified (will be fetched for event date).".to_string()
        }
    };

    let notes = if request.additional_notes.trim().is_empty() {
        "None provided."
    } else {
        request.additional_notes.as_str()
    };

    let mut details = vec![
        format!("- Event Name: {}", request.event_name),
        format!("- Event Type: {}", request.event_type.label()),
        format!("- Event Location / Venue: {}", request.event_location),
        format!("- {date_time_line}"),
        format!(
            "- Expected Attendance: {} people",
            group_thousands(request.expected_attendance)
        ),
        format!("- Primary Audience: {}", request.audience_type.label()),
    ];
    if let Some(role) = request.role {
        details.push(format!("- Report Viewpoint: {}", role_focus(role)));
    }
    if let Some(threshold) = request.alert_threshold {
        details.push(format!("- Alert Sensitivity: {}", threshold_focus(threshold)));
    }

    format!(
        "Analyse the following event and produce a comprehensive risk assessment.\n\
         \n\
         EVENT DETAILS:\n\
         {details}\n\
         \n\
         {weather_block}\n\
         \n\
         GEOGRAPHIC AREA:\n\
         - Polygon vertices: [{polygon}]\n\
         - Approximate centre: ({lat:.6}, {lng:.6})\n\
         \n\
         ADDITIONAL NOTES FROM ORGANISER:\n\
         {notes}\n\
         \n\
         Provide your risk assessment as JSON.\n\
         Ensure all risk locations fall within or very near the polygon area.\
         {locale}",
        details = details.join("\n"),
        lat = center.lat,
        lng = center.lng,
        locale = locale_instruction(request.locale),
    )
}

/// Full-assessment prompt used in single-call mode.
pub fn analysis_prompt(
    request: &SimulationRequest,
    weather_override: Option<&WeatherSnapshot>,
) -> PromptInstance {
    PromptInstance {
        template_slug: "risk_analysis_v1",
        system: SYSTEM_PROMPT.to_string(),
        user: build_analysis_prompt(request, weather_override),
    }
}

/// Single-category prompt used by the multi-agent fan-out.
pub fn category_prompt(
    request: &SimulationRequest,
    category: RiskCategory,
    weather_override: Option<&WeatherSnapshot>,
) -> PromptInstance {
    let user = format!(
        "{base}\n\n\
         CATEGORY FOCUS:\n\
         You are the specialist for the \"{cat}\" category only. Ignore the other \
         categories. Generate between 2 and 5 risk items, every one with \
         \"category\": \"{cat}\". Return JSON of the form {{\"risks\": [...]}}; \
         overall_risk_score, summary, and recommendations may be omitted.",
        base = build_analysis_prompt(request, weather_override),
        cat = category.as_str(),
    );
    PromptInstance {
        template_slug: "risk_category_v1",
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Prompt for the aggregate score/summary over merged category findings.
pub fn synthesis_prompt(risks: &[Value], request: &SimulationRequest) -> PromptInstance {
    let findings: Vec<Value> = risks
        .iter()
        .map(|r| {
            serde_json::json!({
                "category": r.get("category"),
                "title": r.get("title"),
                "severity": r.get("severity"),
                "probability": r.get("probability"),
                "location_description": r.get("location_description"),
            })
        })
        .collect();
    let findings = serde_json::to_string_pretty(&findings).unwrap_or_else(|_| "[]".to_string());

    let user = format!(
        "EVENT: {name} ({kind}), {attendance} expected attendees, audience: {audience}.\n\
         {date_time_line}\n\
         \n\
         SPECIALIST FINDINGS ({count} risks):\n\
         {findings}\n\
         \n\
         Produce the overall risk score, a concise summary, and the top recommendations.\
         {locale}",
        name = request.event_name,
        kind = request.event_type.label(),
        attendance = group_thousands(request.expected_attendance),
        audience = request.audience_type.label(),
        date_time_line = EventSchedule::parse(&request.date_time).prompt_line(),
        count = risks.len(),
        locale = locale_instruction(request.locale),
    );
    PromptInstance {
        template_slug: "risk_synthesis_v1",
        system: SYNTHESIS_SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Prompt translating the string values of one JSON chunk to English.
pub fn translation_prompt(chunk: &Value) -> PromptInstance {
    let body = serde_json::to_string_pretty(chunk).unwrap_or_else(|_| chunk.to_string());
    PromptInstance {
        template_slug: "translate_chunk_v1",
        system: TRANSLATION_SYSTEM_PROMPT.to_string(),
        user: format!(
            "Translate the following JSON from Japanese to English.\n\
             Rules: Preserve exact structure and keys. Translate only string values \
             (user-visible text). Do NOT translate keys, enum values (e.g. crowd_safety), \
             numbers, or IDs. Return valid JSON only, no markdown.\n\n{body}"
        ),
    }
}

fn weather_lines(w: &WeatherSnapshot) -> String {
    format!(
        "- Temperature: {:?} deg C\n- Precipitation Probability: {:?}%\n- Condition: {}",
        w.temperature_celsius,
        w.precipitation_probability,
        w.condition.label()
    )
}

fn role_focus(role: UserRole) -> &'static str {
    match role {
        UserRole::Organizer => "event organiser (overall operations and budget)",
        UserRole::Security => "security lead (crowd control, staffing, incident response)",
        UserRole::LocalGov => "local government (public order, permits, residents)",
        UserRole::VenueManager => "venue manager (facilities, capacity, structures)",
    }
}

fn threshold_focus(threshold: AlertThreshold) -> &'static str {
    match threshold {
        AlertThreshold::Conservative => "conservative (flag borderline risks, err high on severity)",
        AlertThreshold::Standard => "standard",
        AlertThreshold::Aggressive => "aggressive (report only clear, material risks)",
    }
}

/// `28000` -> `28,000`.
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// =============================================================================
// TESTS
// =============================================================================
