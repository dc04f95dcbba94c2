//! Shipment lead-time simulation over a fixed daily flight schedule.
//!
//! Every minute of the day is treated as a possible order time. For each one the
//! simulator picks the earliest departure the shipment can still be accepted on,
//! and the per-minute lead times are then weighted by an order-time pattern to
//! produce a service-level curve, quantiles, per-flight traffic shares and the
//! explanatory metrics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod distribution;
pub mod explain;
pub mod format;
pub mod inputs;
pub mod schedule;
pub mod service;
pub mod session;

pub use distribution::OrderProfile;
pub use explain::{ExplainMetrics, FlightCutoff, MissedDeparture, Narrative};
pub use format::{
    format_abs_time, format_cutoff, format_duration_minutes, format_hours, format_percent,
    NEXT_DAY_LABEL,
};
pub use inputs::{
    parse_duration_hours, parse_hours, parse_time_of_day, FieldError, InputField, RawInputs,
    ValidationErrors,
};
pub use schedule::{Assignment, Departure, DepartureSchedule, Simulation, LOOKAHEAD_DAYS};
pub use service::{
    flight_shares, service_curve, service_level_at, weighted_quantile, FlightShares,
    ServiceCurve, ServicePoint,
};
pub use session::{RecomputePolicy, Session, SessionState};

/// Number of order minutes simulated per day.
pub const MINUTES_PER_DAY: u32 = 1440;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LtError {
    #[error("invalid inputs: {0}")]
    Validation(ValidationErrors),
    #[error("No feasible flight found within 3 days. Adjust your parameters.")]
    NoFeasibleFlight,
    #[error("unknown distribution mode: {0}")]
    UnknownDistribution(String),
    #[error("unknown incoterm: {0}")]
    UnknownIncoterm(String),
    #[error("minute {0} is outside the day (0..1440)")]
    MinuteOutOfRange(u32),
    #[error("flight schedule is empty")]
    EmptySchedule,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("failed to parse scenario: {0}")]
    Scenario(String),
}

/// A minute within one day, `0..1440`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct MinuteOfDay(pub(crate) u16);

impl MinuteOfDay {
    pub const MIDNIGHT: MinuteOfDay = MinuteOfDay(0);

    pub fn new(minute: u32) -> Result<Self, LtError> {
        if minute < MINUTES_PER_DAY {
            Ok(Self(minute as u16))
        } else {
            Err(LtError::MinuteOutOfRange(minute))
        }
    }

    pub fn from_hm(hours: u32, minutes: u32) -> Result<Self, LtError> {
        if minutes >= 60 {
            return Err(LtError::InvalidParameter(format!(
                "minutes must be below 60, got {minutes}"
            )));
        }
        Self::new(hours.saturating_mul(60).saturating_add(minutes))
    }

    pub fn get(self) -> u32 {
        u32::from(self.0)
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    pub fn hour(self) -> u32 {
        self.get() / 60
    }

    pub fn minute(self) -> u32 {
        self.get() % 60
    }

    /// All minutes of the day in ascending order.
    pub fn all() -> impl Iterator<Item = MinuteOfDay> {
        (0..MINUTES_PER_DAY as u16).map(MinuteOfDay)
    }
}

impl TryFrom<u32> for MinuteOfDay {
    type Error = LtError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MinuteOfDay> for u32 {
    fn from(value: MinuteOfDay) -> Self {
        value.get()
    }
}

impl fmt::Display for MinuteOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Delivery term. Door delivery (DAP) includes customs and last-mile; terminal
/// delivery (DPU) stops at the destination terminal.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Incoterm {
    #[serde(rename = "DAP")]
    Dap,
    #[serde(rename = "DPU")]
    Dpu,
}

impl Default for Incoterm {
    fn default() -> Self {
        Incoterm::Dap
    }
}

impl Incoterm {
    pub fn code(&self) -> &'static str {
        match self {
            Incoterm::Dap => "DAP",
            Incoterm::Dpu => "DPU",
        }
    }

    pub fn default_customs_h(&self) -> f64 {
        match self {
            Incoterm::Dap => 2.0,
            Incoterm::Dpu => 0.0,
        }
    }

    pub fn default_last_mile_h(&self) -> f64 {
        match self {
            Incoterm::Dap => 1.0,
            Incoterm::Dpu => 0.0,
        }
    }
}

impl FromStr for Incoterm {
    type Err = LtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAP" => Ok(Incoterm::Dap),
            "DPU" => Ok(Incoterm::Dpu),
            _ => Err(LtError::UnknownIncoterm(s.to_string())),
        }
    }
}

/// Name of an order-time distribution mode, as entered by the user.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistributionKind {
    Uniform,
    Normal,
    Cutoff,
}

impl DistributionKind {
    pub fn name(&self) -> &'static str {
        match self {
            DistributionKind::Uniform => "uniform",
            DistributionKind::Normal => "normal",
            DistributionKind::Cutoff => "cutoff",
        }
    }
}

impl FromStr for DistributionKind {
    type Err = LtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniform" => Ok(DistributionKind::Uniform),
            "normal" => Ok(DistributionKind::Normal),
            "cutoff" => Ok(DistributionKind::Cutoff),
            _ => Err(LtError::UnknownDistribution(s.to_string())),
        }
    }
}

/// Order-time pattern with its mode-specific parameters.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum OrderPattern {
    Uniform,
    Normal { peak: MinuteOfDay, sigma_h: f64 },
    Cutoff { cutoff: MinuteOfDay },
}

impl Default for OrderPattern {
    fn default() -> Self {
        OrderPattern::Uniform
    }
}

impl OrderPattern {
    pub fn kind(&self) -> DistributionKind {
        match self {
            OrderPattern::Uniform => DistributionKind::Uniform,
            OrderPattern::Normal { .. } => DistributionKind::Normal,
            OrderPattern::Cutoff { .. } => DistributionKind::Cutoff,
        }
    }
}

/// Daily departure times: non-empty, distinct, ascending.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Vec<MinuteOfDay>", into = "Vec<MinuteOfDay>")]
pub struct FlightSchedule(Vec<MinuteOfDay>);

impl FlightSchedule {
    pub fn new(mut times: Vec<MinuteOfDay>) -> Result<Self, LtError> {
        times.sort_unstable();
        times.dedup();
        if times.is_empty() {
            return Err(LtError::EmptySchedule);
        }
        Ok(Self(times))
    }

    pub fn times(&self) -> &[MinuteOfDay] {
        &self.0
    }

    /// Earliest departure of the day.
    pub fn first(&self) -> MinuteOfDay {
        self.0[0]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn position(&self, time_of_day: MinuteOfDay) -> Option<usize> {
        self.0.binary_search(&time_of_day).ok()
    }
}

impl TryFrom<Vec<MinuteOfDay>> for FlightSchedule {
    type Error = LtError;

    fn try_from(value: Vec<MinuteOfDay>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FlightSchedule> for Vec<MinuteOfDay> {
    fn from(value: FlightSchedule) -> Self {
        value.0
    }
}

/// Validated input to one simulation run. Durations are in hours.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Params {
    pub incoterm: Incoterm,
    pub rfc_h: f64,
    pub transit_h: f64,
    pub lat_h: f64,
    pub flight_h: f64,
    pub toa_h: f64,
    pub customs_h: f64,
    pub last_mile_h: f64,
    pub flights: FlightSchedule,
    pub pattern: OrderPattern,
    pub resolution_h: f64,
    pub lookup_h: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            incoterm: Incoterm::Dap,
            rfc_h: 2.0,
            transit_h: 1.0,
            lat_h: 2.0,
            flight_h: 10.0,
            toa_h: 2.0,
            customs_h: Incoterm::Dap.default_customs_h(),
            last_mile_h: Incoterm::Dap.default_last_mile_h(),
            flights: FlightSchedule(vec![MinuteOfDay(9 * 60), MinuteOfDay(21 * 60)]),
            pattern: OrderPattern::Uniform,
            resolution_h: 0.5,
            lookup_h: 24.0,
        }
    }
}

impl Params {
    /// Collection plus transit to the departure terminal, in minutes.
    pub fn pre_departure_minutes(&self) -> f64 {
        (self.rfc_h + self.transit_h) * 60.0
    }

    /// Flight, arrival processing, customs and last-mile, in minutes.
    pub fn post_departure_minutes(&self) -> f64 {
        (self.flight_h + self.toa_h + self.customs_h + self.last_mile_h) * 60.0
    }

    pub fn acceptance_minutes(&self) -> f64 {
        self.lat_h * 60.0
    }

    /// Re-checks numeric ranges for params built in code rather than through
    /// [`RawInputs::validate`].
    pub fn check(&self) -> Result<(), LtError> {
        let durations = [
            ("rfc", self.rfc_h),
            ("transit", self.transit_h),
            ("lat", self.lat_h),
            ("flight", self.flight_h),
            ("toa", self.toa_h),
            ("customs", self.customs_h),
            ("lastMile", self.last_mile_h),
            ("lookup", self.lookup_h),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(LtError::InvalidParameter(format!(
                    "{name} must be a finite number >= 0, got {value}"
                )));
            }
        }
        if !self.resolution_h.is_finite() || self.resolution_h <= 0.0 {
            return Err(LtError::InvalidParameter(format!(
                "resolution must be > 0, got {}",
                self.resolution_h
            )));
        }
        if let OrderPattern::Normal { sigma_h, .. } = self.pattern {
            if !sigma_h.is_finite() || sigma_h <= 0.0 {
                return Err(LtError::InvalidParameter(format!(
                    "sigma must be > 0, got {sigma_h}"
                )));
            }
        }
        if self.flights.is_empty() {
            return Err(LtError::EmptySchedule);
        }
        Ok(())
    }
}

/// Everything produced by one run.
#[derive(Clone, Debug, Serialize)]
pub struct Analysis {
    pub params: Params,
    pub profile: OrderProfile,
    pub simulation: Simulation,
    pub service_curve: ServiceCurve,
    pub flight_shares: FlightShares,
    pub lookup_service_pct: f64,
    pub explain: ExplainMetrics,
}

impl Analysis {
    /// Service level (percent) for an ad-hoc target, reusing this run's data.
    pub fn service_level_at(&self, target_h: f64) -> f64 {
        service_level_at(
            target_h,
            self.simulation.lead_times(),
            self.profile.weights(),
        )
    }
}

/// Run the full pipeline for one parameter set.
pub fn analyze(params: &Params) -> Result<Analysis, LtError> {
    params.check()?;

    let profile = OrderProfile::build(&params.pattern);
    let simulation = Simulation::run(params)?;
    let service_curve = service_curve(
        simulation.lead_times(),
        profile.weights(),
        params.resolution_h,
    )?;
    let flight_shares = flight_shares(&params.flights, &simulation, &profile);
    let lookup_service_pct =
        service_level_at(params.lookup_h, simulation.lead_times(), profile.weights());
    let explain = ExplainMetrics::build(params, &profile, &simulation, &flight_shares);

    Ok(Analysis {
        params: params.clone(),
        profile,
        simulation,
        service_curve,
        flight_shares,
        lookup_service_pct,
        explain,
    })
}
