//! Raw form inputs and their validation into [`Params`].
//!
//! Inputs arrive as text (scenario files may also use JSON numbers). Validation
//! checks every field and reports all failures at once; nothing is simulated
//! until the whole set is clean.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    DistributionKind, FlightSchedule, Incoterm, LtError, MinuteOfDay, OrderPattern, Params,
};

pub const DEFAULT_PEAK: MinuteOfDay = MinuteOfDay(12 * 60);
pub const DEFAULT_SIGMA_H: f64 = 3.0;
pub const DEFAULT_CUTOFF: MinuteOfDay = MinuteOfDay(15 * 60);

/// Strict `HH:MM` (00-23, 00-59).
pub fn parse_time_of_day(text: &str) -> Option<MinuteOfDay> {
    let (hours, minutes) = text.trim().split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 || !all_digits(hours) || !all_digits(minutes) {
        return None;
    }
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    MinuteOfDay::from_hm(hours, minutes).ok()
}

/// `H:MM` duration in hours, e.g. `"1:30"` is 1.5.
pub fn parse_duration_hours(text: &str) -> Option<f64> {
    let (hours, minutes) = text.trim().split_once(':')?;
    if hours.is_empty() || minutes.len() != 2 || !all_digits(hours) || !all_digits(minutes) {
        return None;
    }
    let hours: u64 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if minutes > 59 {
        return None;
    }
    Some(hours as f64 + f64::from(minutes) / 60.0)
}

/// Hours given either as `H:MM` or as a plain decimal number.
pub fn parse_hours(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(hours) = parse_duration_hours(trimmed) {
        return Some(hours);
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn all_digits(text: &str) -> bool {
    text.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum InputField {
    Incoterm,
    Rfc,
    Transit,
    Lat,
    Flight,
    Toa,
    Customs,
    LastMile,
    Flights,
    Distribution,
    Peak,
    Sigma,
    Cutoff,
    Resolution,
    Lookup,
}

impl InputField {
    pub fn name(&self) -> &'static str {
        match self {
            InputField::Incoterm => "incoterm",
            InputField::Rfc => "rfc",
            InputField::Transit => "transit",
            InputField::Lat => "lat",
            InputField::Flight => "flight",
            InputField::Toa => "toa",
            InputField::Customs => "customs",
            InputField::LastMile => "lastMile",
            InputField::Flights => "flights",
            InputField::Distribution => "distribution",
            InputField::Peak => "peak",
            InputField::Sigma => "sigma",
            InputField::Cutoff => "cutoff",
            InputField::Resolution => "resolution",
            InputField::Lookup => "lookup",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: InputField,
    pub message: String,
}

impl FieldError {
    fn new(field: InputField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field.name(), self.message)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn for_field(&self, field: InputField) -> Option<&FieldError> {
        self.0.iter().find(|e| e.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", joined.join("; "))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(f64),
}

impl From<TextOrNumber> for String {
    fn from(value: TextOrNumber) -> Self {
        match value {
            TextOrNumber::Text(text) => text,
            TextOrNumber::Number(n) => n.to_string(),
        }
    }
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    TextOrNumber::deserialize(deserializer).map(String::from)
}

fn opt_text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<TextOrNumber>::deserialize(deserializer).map(|v| v.map(String::from))
}

/// Form values as entered. `customs` and `last_mile` fall back to the incoterm
/// defaults when absent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RawInputs {
    pub incoterm: String,
    #[serde(deserialize_with = "text_or_number")]
    pub rfc: String,
    #[serde(deserialize_with = "text_or_number")]
    pub transit: String,
    #[serde(deserialize_with = "text_or_number")]
    pub lat: String,
    #[serde(deserialize_with = "text_or_number")]
    pub flight: String,
    #[serde(deserialize_with = "text_or_number")]
    pub toa: String,
    #[serde(deserialize_with = "opt_text_or_number", skip_serializing_if = "Option::is_none")]
    pub customs: Option<String>,
    #[serde(deserialize_with = "opt_text_or_number", skip_serializing_if = "Option::is_none")]
    pub last_mile: Option<String>,
    pub flights: String,
    pub distribution: String,
    pub peak: String,
    #[serde(deserialize_with = "text_or_number")]
    pub sigma: String,
    pub cutoff: String,
    #[serde(deserialize_with = "text_or_number")]
    pub resolution: String,
    #[serde(deserialize_with = "text_or_number")]
    pub lookup: String,
}

impl Default for RawInputs {
    fn default() -> Self {
        Self {
            incoterm: Incoterm::Dap.code().to_string(),
            rfc: "2".to_string(),
            transit: "1".to_string(),
            lat: "2".to_string(),
            flight: "10".to_string(),
            toa: "2".to_string(),
            customs: None,
            last_mile: None,
            flights: "09:00, 21:00".to_string(),
            distribution: DistributionKind::Uniform.name().to_string(),
            peak: DEFAULT_PEAK.to_string(),
            sigma: DEFAULT_SIGMA_H.to_string(),
            cutoff: DEFAULT_CUTOFF.to_string(),
            resolution: "0.5".to_string(),
            lookup: "24".to_string(),
        }
    }
}

impl RawInputs {
    pub fn from_json_str(text: &str) -> Result<Self, LtError> {
        serde_json::from_str(text).map_err(|e| LtError::Scenario(e.to_string()))
    }

    /// Switch incoterm and reset customs / last-mile to its defaults.
    pub fn with_incoterm(mut self, incoterm: Incoterm) -> Self {
        self.incoterm = incoterm.code().to_string();
        self.customs = Some(incoterm.default_customs_h().to_string());
        self.last_mile = Some(incoterm.default_last_mile_h().to_string());
        self
    }

    /// Same inputs apart from the lookup target.
    pub fn same_simulation_inputs(&self, other: &RawInputs) -> bool {
        let mut lhs = self.clone();
        lhs.lookup.clone_from(&other.lookup);
        lhs == *other
    }

    pub fn validate(&self) -> Result<Params, LtError> {
        let mut errors = Vec::new();

        let incoterm = match self.incoterm.parse::<Incoterm>() {
            Ok(incoterm) => incoterm,
            Err(err) => {
                errors.push(FieldError::new(InputField::Incoterm, err.to_string()));
                Incoterm::default()
            }
        };

        let rfc_h = non_negative_hours(InputField::Rfc, &self.rfc, &mut errors);
        let transit_h = non_negative_hours(InputField::Transit, &self.transit, &mut errors);
        let lat_h = non_negative_hours(InputField::Lat, &self.lat, &mut errors);
        let flight_h = non_negative_hours(InputField::Flight, &self.flight, &mut errors);
        let toa_h = non_negative_hours(InputField::Toa, &self.toa, &mut errors);
        let customs_h = match self.customs.as_deref() {
            Some(text) => non_negative_hours(InputField::Customs, text, &mut errors),
            None => incoterm.default_customs_h(),
        };
        let last_mile_h = match self.last_mile.as_deref() {
            Some(text) => non_negative_hours(InputField::LastMile, text, &mut errors),
            None => incoterm.default_last_mile_h(),
        };

        let flights = parse_flight_list(&self.flights, &mut errors);
        let pattern = self.parse_pattern(&mut errors);

        let resolution_h = match parse_hours(&self.resolution) {
            Some(v) if v > 0.0 => v,
            _ => {
                errors.push(FieldError::new(
                    InputField::Resolution,
                    "Resolution must be > 0.",
                ));
                0.0
            }
        };
        let lookup_h = match parse_hours(&self.lookup) {
            Some(v) if v >= 0.0 => v,
            _ => {
                errors.push(FieldError::new(
                    InputField::Lookup,
                    "Use HH:MM (24h) or a number ≥ 0.",
                ));
                0.0
            }
        };

        match (flights, pattern) {
            (Some(flights), Some(pattern)) if errors.is_empty() => Ok(Params {
                incoterm,
                rfc_h,
                transit_h,
                lat_h,
                flight_h,
                toa_h,
                customs_h,
                last_mile_h,
                flights,
                pattern,
                resolution_h,
                lookup_h,
            }),
            _ => Err(LtError::Validation(ValidationErrors(errors))),
        }
    }

    fn parse_pattern(&self, errors: &mut Vec<FieldError>) -> Option<OrderPattern> {
        let kind = match self.distribution.parse::<DistributionKind>() {
            Ok(kind) => kind,
            Err(err) => {
                errors.push(FieldError::new(InputField::Distribution, err.to_string()));
                return None;
            }
        };
        match kind {
            DistributionKind::Uniform => Some(OrderPattern::Uniform),
            DistributionKind::Normal => {
                let peak = parse_time_of_day(&self.peak);
                if peak.is_none() {
                    errors.push(FieldError::new(InputField::Peak, "Use HH:MM (24h)."));
                }
                let sigma_h = parse_hours(&self.sigma).filter(|s| *s > 0.0);
                if sigma_h.is_none() {
                    errors.push(FieldError::new(InputField::Sigma, "Sigma must be > 0."));
                }
                Some(OrderPattern::Normal {
                    peak: peak?,
                    sigma_h: sigma_h?,
                })
            }
            DistributionKind::Cutoff => match parse_time_of_day(&self.cutoff) {
                Some(cutoff) => Some(OrderPattern::Cutoff { cutoff }),
                None => {
                    errors.push(FieldError::new(InputField::Cutoff, "Use HH:MM (24h)."));
                    None
                }
            },
        }
    }
}

fn non_negative_hours(field: InputField, text: &str, errors: &mut Vec<FieldError>) -> f64 {
    match parse_hours(text) {
        Some(v) if v >= 0.0 => v,
        _ => {
            errors.push(FieldError::new(field, "Enter a number ≥ 0."));
            0.0
        }
    }
}

fn parse_flight_list(text: &str, errors: &mut Vec<FieldError>) -> Option<FlightSchedule> {
    let tokens: Vec<&str> = text
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        errors.push(FieldError::new(
            InputField::Flights,
            "Enter at least one HH:MM time.",
        ));
        return None;
    }
    let mut times = Vec::with_capacity(tokens.len());
    let mut invalid = Vec::new();
    for token in tokens {
        match parse_time_of_day(token) {
            Some(time) => times.push(time),
            None => invalid.push(token),
        }
    }
    if !invalid.is_empty() {
        errors.push(FieldError::new(
            InputField::Flights,
            format!("Invalid time(s): {}", invalid.join(", ")),
        ));
        return None;
    }
    match FlightSchedule::new(times) {
        Ok(schedule) => Some(schedule),
        Err(err) => {
            errors.push(FieldError::new(InputField::Flights, err.to_string()));
            None
        }
    }
}
