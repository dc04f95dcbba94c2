//! Aggregates over a simulated day: service-level curve, weighted quantiles
//! and per-flight traffic shares.

use ndarray::Array1;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::format::NEXT_DAY_LABEL;
use crate::{FlightSchedule, LtError, MinuteOfDay, OrderProfile, Simulation};

const ZERO_PCT_EPS: f64 = 1e-6;
const FULL_PCT_EPS: f64 = 100.0 - 1e-6;
/// Absorbs floating drift in `i * resolution` when comparing lead times.
const TARGET_EPS_H: f64 = 1e-9;
/// Resource limit on curve length. A valid but very fine resolution over a
/// long lead time is refused with `InvalidParameter` rather than allocated.
const MAX_CURVE_POINTS: usize = 1_000_000;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ServicePoint {
    pub target_h: f64,
    pub service_pct: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct ServiceCurve {
    pub points: Vec<ServicePoint>,
}

impl ServiceCurve {
    pub fn targets(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.target_h)
    }

    pub fn levels(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.service_pct)
    }
}

/// Percentage of order weight whose lead time is at or under `target_h`.
pub fn service_level_at(target_h: f64, lead_times: &Array1<f64>, weights: &Array1<f64>) -> f64 {
    let total: f64 = lead_times
        .iter()
        .zip(weights.iter())
        .filter(|(lead, _)| **lead <= target_h + TARGET_EPS_H)
        .map(|(_, w)| *w)
        .sum();
    total * 100.0
}

/// Service level at every multiple of `resolution_h` from 0 up to the first
/// multiple covering the longest lead time, trimmed to the rising part: from
/// the last ~0% target through the first ~100% target.
pub fn service_curve(
    lead_times: &Array1<f64>,
    weights: &Array1<f64>,
    resolution_h: f64,
) -> Result<ServiceCurve, LtError> {
    if !resolution_h.is_finite() || resolution_h <= 0.0 {
        return Err(LtError::InvalidParameter(format!(
            "resolution must be > 0, got {resolution_h}"
        )));
    }
    if lead_times.is_empty() {
        return Ok(ServiceCurve::default());
    }

    let max_lead = lead_times.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    let steps = ((max_lead + TARGET_EPS_H) / resolution_h).ceil().max(0.0);
    if steps >= MAX_CURVE_POINTS as f64 {
        return Err(LtError::InvalidParameter(format!(
            "resolution {resolution_h}h is too fine for a {max_lead:.2}h lead time"
        )));
    }
    let steps = steps as usize;

    let mut pairs: Vec<(f64, f64)> = lead_times
        .iter()
        .copied()
        .zip(weights.iter().copied())
        .collect();
    pairs.sort_by_key(|(lead, _)| OrderedFloat(*lead));

    let mut points = Vec::with_capacity(steps + 1);
    let mut cursor = 0usize;
    let mut covered = 0.0;
    for i in 0..=steps {
        let target_h = i as f64 * resolution_h;
        while cursor < pairs.len() && pairs[cursor].0 <= target_h + TARGET_EPS_H {
            covered += pairs[cursor].1;
            cursor += 1;
        }
        points.push(ServicePoint {
            target_h,
            service_pct: covered * 100.0,
        });
    }

    let (start, end) = trim_window(&points);
    Ok(ServiceCurve {
        points: points[start..=end].to_vec(),
    })
}

fn trim_window(points: &[ServicePoint]) -> (usize, usize) {
    let last = points.len().saturating_sub(1);
    let mut start = points
        .iter()
        .rposition(|p| p.service_pct <= ZERO_PCT_EPS)
        .unwrap_or(0);
    let end = points
        .iter()
        .position(|p| p.service_pct >= FULL_PCT_EPS)
        .unwrap_or(last);
    if start > end {
        start = 0;
    }
    (start, end)
}

/// Smallest value whose cumulative weight (values ascending, ties in input
/// order) reaches `quantile` of the total. `None` when there is no weight.
pub fn weighted_quantile(values: &[f64], weights: &[f64], quantile: f64) -> Option<f64> {
    debug_assert_eq!(values.len(), weights.len());
    let mut pairs: Vec<(f64, f64)> = values
        .iter()
        .copied()
        .zip(weights.iter().copied())
        .collect();
    pairs.sort_by_key(|(value, _)| OrderedFloat(*value));

    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return None;
    }
    let target = total * quantile;
    let mut acc = 0.0;
    for &(value, weight) in &pairs {
        acc += weight;
        if acc >= target {
            return Some(value);
        }
    }
    pairs.last().map(|(value, _)| *value)
}

/// Share of orders per departure. Same-day departures are counted per flight;
/// later days only count toward the rollover bucket when they leave on the
/// first flight of the day.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FlightShares {
    pub flights: Vec<MinuteOfDay>,
    pub same_day_pct: Vec<f64>,
    pub next_day_pct: f64,
    /// One label per flight, then the rollover label.
    pub labels: Vec<String>,
}

impl FlightShares {
    pub fn total_pct(&self) -> f64 {
        self.same_day_pct.iter().sum::<f64>() + self.next_day_pct
    }

    /// `(label, percent)` bars in display order, rollover last.
    pub fn bars(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.labels.iter().map(String::as_str).zip(
            self.same_day_pct
                .iter()
                .copied()
                .chain(std::iter::once(self.next_day_pct)),
        )
    }
}

pub fn flight_shares(
    flights: &FlightSchedule,
    simulation: &Simulation,
    profile: &OrderProfile,
) -> FlightShares {
    let first = flights.first();
    let mut same_day = vec![0.0; flights.len()];
    let mut next_day = 0.0;

    for assignment in simulation.assignments() {
        let weight = profile.weight(assignment.order_minute);
        let departure = assignment.departure;
        if departure.day_offset == 0 {
            if let Some(idx) = flights.position(departure.time_of_day) {
                same_day[idx] += weight;
            }
        } else if departure.time_of_day == first {
            next_day += weight;
        }
    }

    let labels = flights
        .times()
        .iter()
        .map(ToString::to_string)
        .chain(std::iter::once(NEXT_DAY_LABEL.to_string()))
        .collect();

    FlightShares {
        flights: flights.times().to_vec(),
        same_day_pct: same_day.into_iter().map(|s| s * 100.0).collect(),
        next_day_pct: next_day * 100.0,
        labels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OrderPattern, Params, RawInputs};

    fn run(raw: RawInputs) -> (Params, OrderProfile, Simulation) {
        let params = raw.validate().unwrap();
        let profile = OrderProfile::build(&params.pattern);
        let sim = Simulation::run(&params).unwrap();
        (params, profile, sim)
    }

    #[test]
    fn test_service_curve_is_monotone_and_complete() {
        for distribution in ["uniform", "normal", "cutoff"] {
            let (params, profile, sim) = run(RawInputs {
                distribution: distribution.into(),
                ..RawInputs::default()
            });
            let curve =
                service_curve(sim.lead_times(), profile.weights(), params.resolution_h).unwrap();
            let levels: Vec<f64> = curve.levels().collect();
            assert!(levels[0] >= 0.0);
            assert!(levels.windows(2).all(|w| w[1] >= w[0]));
            assert!(*levels.last().unwrap() >= 99.999);
            let targets: Vec<f64> = curve.targets().collect();
            assert!(targets
                .windows(2)
                .all(|w| (w[1] - w[0] - params.resolution_h).abs() < 1e-9));
            assert!(*targets.last().unwrap() <= sim.max_lead_time_h() + params.resolution_h);
        }
    }

    #[test]
    fn test_service_curve_trims_to_rising_region() {
        let (_, profile, sim) = run(RawInputs::default());
        let curve = service_curve(sim.lead_times(), profile.weights(), 0.5).unwrap();
        // Lead times span 20h..31.98h: keep the last 0% target and stop at the
        // first 100% target.
        let first = curve.points.first().unwrap();
        let last = curve.points.last().unwrap();
        assert_eq!(first.target_h, 19.5);
        assert_eq!(first.service_pct, 0.0);
        assert_eq!(last.target_h, 32.0);
        assert!((last.service_pct - 100.0).abs() < 1e-9);
        assert_eq!(curve.points.len(), 26);
    }

    #[test]
    fn test_trim_window_without_full_or_zero() {
        let points: Vec<ServicePoint> = [10.0, 50.0, 90.0]
            .iter()
            .enumerate()
            .map(|(i, &pct)| ServicePoint {
                target_h: i as f64,
                service_pct: pct,
            })
            .collect();
        assert_eq!(trim_window(&points), (0, 2));
    }

    #[test]
    fn test_service_curve_rejects_bad_resolution() {
        let (_, profile, sim) = run(RawInputs::default());
        assert!(service_curve(sim.lead_times(), profile.weights(), 0.0).is_err());
        assert!(service_curve(sim.lead_times(), profile.weights(), 1e-9).is_err());
    }

    #[test]
    fn test_service_curve_point_limit() {
        let (_, profile, sim) = run(RawInputs::default());
        // 32h at 0.0001h needs 320,000 targets: allowed.
        let fine = service_curve(sim.lead_times(), profile.weights(), 1e-4).unwrap();
        assert!((fine.points.last().unwrap().service_pct - 100.0).abs() < 1e-9);
        // 32h at 0.00001h would need 3.2 million targets.
        assert!(matches!(
            service_curve(sim.lead_times(), profile.weights(), 1e-5),
            Err(LtError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_service_level_at_matches_scenarios() {
        let (_, profile, sim) = run(RawInputs::default());
        assert_eq!(service_level_at(19.99, sim.lead_times(), profile.weights()), 0.0);
        assert!(
            (service_level_at(32.0, sim.lead_times(), profile.weights()) - 100.0).abs() < 1e-9
        );
        let at_24 = service_level_at(24.0, sim.lead_times(), profile.weights());
        assert!(at_24 > 0.0 && at_24 < 100.0);
    }

    #[test]
    fn test_weighted_quantile_basics() {
        let values = [3.0, 1.0, 2.0, 4.0];
        let weights = [0.25, 0.25, 0.25, 0.25];
        assert_eq!(weighted_quantile(&values, &weights, 0.5), Some(2.0));
        assert_eq!(weighted_quantile(&values, &weights, 0.51), Some(3.0));
        assert_eq!(weighted_quantile(&values, &weights, 0.95), Some(4.0));
        assert_eq!(weighted_quantile(&values, &[0.0; 4], 0.5), None);
        assert_eq!(weighted_quantile(&[], &[], 0.5), None);
    }

    #[test]
    fn test_weighted_median_under_uniform_weights() {
        let (params, profile, sim) = run(RawInputs::default());
        let leads = sim.lead_times().to_vec();
        let median =
            weighted_quantile(&leads, profile.weights().as_slice().unwrap(), 0.5).unwrap();
        let mut sorted = leads.clone();
        sorted.sort_by_key(|v| OrderedFloat(*v));
        let true_median = (sorted[719] + sorted[720]) / 2.0;
        assert!((median - true_median).abs() <= params.resolution_h);
    }

    #[test]
    fn test_flight_shares_sum_to_hundred() {
        for distribution in ["uniform", "normal", "cutoff"] {
            let (params, profile, sim) = run(RawInputs {
                distribution: distribution.into(),
                ..RawInputs::default()
            });
            let shares = flight_shares(&params.flights, &sim, &profile);
            assert!((shares.total_pct() - 100.0).abs() < 1e-6);
            assert_eq!(shares.labels, vec!["09:00", "21:00", NEXT_DAY_LABEL]);
        }
    }

    #[test]
    fn test_default_uniform_shares() {
        let (params, profile, sim) = run(RawInputs::default());
        let shares = flight_shares(&params.flights, &sim, &profile);
        // 00:00-04:00 -> 09:00 (241 min), 04:01-16:00 -> 21:00 (720 min),
        // the rest rolls into tomorrow morning (479 min).
        assert!((shares.same_day_pct[0] - 241.0 / 14.4).abs() < 1e-9);
        assert!((shares.same_day_pct[1] - 720.0 / 14.4).abs() < 1e-9);
        assert!((shares.next_day_pct - 479.0 / 14.4).abs() < 1e-9);
        let bars: Vec<(&str, f64)> = shares.bars().collect();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[2].0, NEXT_DAY_LABEL);
    }

    #[test]
    fn test_unreachable_same_day_rolls_everything_over() {
        // Acceptance closes 24h before departure, so nothing leaves the same day.
        let (params, profile, sim) = run(RawInputs {
            lat: "24".into(),
            flights: "23:00".into(),
            ..RawInputs::default()
        });
        let shares = flight_shares(&params.flights, &sim, &profile);
        assert_eq!(shares.same_day_pct, vec![0.0]);
        assert!((shares.next_day_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_later_day_non_first_flight_is_in_neither_bucket() {
        // 21h to the terminal: 00:00-10:00 reach day 1 09:00, 10:01-22:00
        // reach day 1 21:00, the rest day 2 09:00.
        let (params, profile, sim) = run(RawInputs {
            rfc: "20".into(),
            transit: "1".into(),
            ..RawInputs::default()
        });
        let late = sim.assignment(MinuteOfDay::new(601).unwrap()).departure;
        assert_eq!(late.day_offset, 1);
        assert_eq!(late.time_of_day.get(), 1260);

        let shares = flight_shares(&params.flights, &sim, &profile);
        assert_eq!(shares.same_day_pct, vec![0.0, 0.0]);
        // Only the 601 + 119 first-flight minutes are counted.
        assert!((shares.next_day_pct - 720.0 / 14.4).abs() < 1e-9);
        assert!((shares.total_pct() - 50.0).abs() < 1e-9);
        assert!(shares.total_pct() < 100.0);
    }

    #[test]
    fn test_cutoff_pattern_ignores_minutes_after_cutoff() {
        let (params, _, sim) = run(RawInputs::default());
        let profile = OrderProfile::build(&OrderPattern::Cutoff {
            cutoff: MinuteOfDay::new(240).unwrap(),
        });
        let shares = flight_shares(&params.flights, &sim, &profile);
        assert!((shares.same_day_pct[0] - 100.0).abs() < 1e-9);
        assert_eq!(shares.next_day_pct, 0.0);
    }
}
