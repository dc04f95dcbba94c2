//! Summary figures and the worst-case walkthrough.

use serde::Serialize;

use crate::schedule::Departure;
use crate::service::weighted_quantile;
use crate::{FlightShares, Incoterm, MinuteOfDay, OrderProfile, Params, Simulation};

/// Latest order time of day that still catches `departure`.
#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct FlightCutoff {
    pub departure: MinuteOfDay,
    /// Minutes from midnight of the departure day; negative means the day before.
    pub cutoff_tod_min: f64,
}

impl FlightCutoff {
    pub fn is_previous_day(&self) -> bool {
        self.cutoff_tod_min < 0.0
    }
}

/// The departure that was missed just before the one actually taken.
#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct MissedDeparture {
    pub departure: Departure,
    pub acceptance_close_abs_min: f64,
    /// Terminal arrival minus acceptance close.
    pub late_by_min: f64,
}

impl MissedDeparture {
    pub fn late_by_clamped_min(&self) -> f64 {
        self.late_by_min.max(0.0)
    }
}

/// Walkthrough of one order, anchored at the worst-case order minute.
#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct Narrative {
    pub order_minute: MinuteOfDay,
    pub readiness_abs_min: f64,
    pub terminal_abs_min: f64,
    pub chosen_departure: Departure,
    /// `None` when no earlier departure exists in the schedule.
    pub missed: Option<MissedDeparture>,
    pub wait_min: f64,
}

impl Narrative {
    pub fn wait_clamped_min(&self) -> f64 {
        self.wait_min.max(0.0)
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ExplainMetrics {
    pub best_lead_h: f64,
    pub best_minute: MinuteOfDay,
    pub worst_lead_h: f64,
    pub worst_minute: MinuteOfDay,
    pub mean_lead_h: f64,
    pub p50_lead_h: Option<f64>,
    pub p95_lead_h: Option<f64>,
    /// Fraction of order weight leaving on a later day.
    pub next_day_share: f64,
    pub top_flight: MinuteOfDay,
    /// Fraction of order weight on `top_flight` the same day.
    pub top_flight_share: f64,
    pub cutoffs: Vec<FlightCutoff>,
    pub pre_departure_h: f64,
    pub post_departure_h: f64,
    pub incoterm: Incoterm,
    pub incoterm_extra_h: f64,
    pub narrative: Narrative,
}

impl ExplainMetrics {
    pub fn build(
        params: &Params,
        profile: &OrderProfile,
        simulation: &Simulation,
        shares: &FlightShares,
    ) -> Self {
        let assignments = simulation.assignments();
        let (mut best, mut worst) = (assignments[0], assignments[0]);
        for a in &assignments[1..] {
            if a.lead_time_h < best.lead_time_h {
                best = *a;
            }
            if a.lead_time_h > worst.lead_time_h {
                worst = *a;
            }
        }

        let lead_times = simulation.lead_times();
        let weights = profile.weights();
        let mean_lead_h = weights.dot(lead_times);
        let (p50_lead_h, p95_lead_h) = match (lead_times.as_slice(), weights.as_slice()) {
            (Some(values), Some(w)) => (
                weighted_quantile(values, w, 0.5),
                weighted_quantile(values, w, 0.95),
            ),
            _ => {
                let values = lead_times.to_vec();
                let w = weights.to_vec();
                (
                    weighted_quantile(&values, &w, 0.5),
                    weighted_quantile(&values, &w, 0.95),
                )
            }
        };

        let next_day_share = assignments
            .iter()
            .filter(|a| a.departure.day_offset >= 1)
            .map(|a| profile.weight(a.order_minute))
            .sum::<f64>();

        let mut top = 0;
        for (i, &pct) in shares.same_day_pct.iter().enumerate().skip(1) {
            if pct > shares.same_day_pct[top] {
                top = i;
            }
        }
        let top_flight = params.flights.times()[top.min(params.flights.len() - 1)];
        let top_flight_share = shares.same_day_pct.get(top).copied().unwrap_or(0.0) / 100.0;

        let pre_departure = params.pre_departure_minutes();
        let acceptance = params.acceptance_minutes();
        let cutoffs = params
            .flights
            .times()
            .iter()
            .map(|&departure| FlightCutoff {
                departure,
                cutoff_tod_min: departure.get() as f64 - acceptance - pre_departure,
            })
            .collect();

        let order_abs = worst.order_minute.get() as f64;
        let terminal_abs_min = order_abs + pre_departure;
        let chosen = worst.departure;
        let missed = simulation
            .schedule()
            .latest_before(chosen.abs_minute)
            .map(|departure| {
                let close = departure.abs_minute as f64 - acceptance;
                MissedDeparture {
                    departure,
                    acceptance_close_abs_min: close,
                    late_by_min: terminal_abs_min - close,
                }
            });
        let narrative = Narrative {
            order_minute: worst.order_minute,
            readiness_abs_min: order_abs + params.rfc_h * 60.0,
            terminal_abs_min,
            chosen_departure: chosen,
            missed,
            wait_min: chosen.abs_minute as f64 - terminal_abs_min,
        };

        Self {
            best_lead_h: best.lead_time_h,
            best_minute: best.order_minute,
            worst_lead_h: worst.lead_time_h,
            worst_minute: worst.order_minute,
            mean_lead_h,
            p50_lead_h,
            p95_lead_h,
            next_day_share,
            top_flight,
            top_flight_share,
            cutoffs,
            pre_departure_h: params.rfc_h + params.transit_h,
            post_departure_h: params.post_departure_minutes() / 60.0,
            incoterm: params.incoterm,
            incoterm_extra_h: params.customs_h + params.last_mile_h,
            narrative,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{flight_shares, RawInputs};

    fn explain(raw: RawInputs) -> ExplainMetrics {
        let params = raw.validate().unwrap();
        let profile = OrderProfile::build(&params.pattern);
        let sim = Simulation::run(&params).unwrap();
        let shares = flight_shares(&params.flights, &sim, &profile);
        ExplainMetrics::build(&params, &profile, &sim, &shares)
    }

    #[test]
    fn test_default_summary_figures() {
        let m = explain(RawInputs::default());
        assert_eq!(m.best_minute.get(), 240);
        assert_eq!(m.worst_minute.get(), 241);
        assert!((m.next_day_share - 479.0 / 1440.0).abs() < 1e-9);
        assert_eq!(m.top_flight.get(), 1260);
        assert!((m.top_flight_share - 0.5).abs() < 1e-9);
        assert!(m.p50_lead_h.unwrap() <= m.p95_lead_h.unwrap());
        assert!(m.mean_lead_h > m.best_lead_h && m.mean_lead_h < m.worst_lead_h);
        assert_eq!(m.pre_departure_h, 3.0);
        assert_eq!(m.post_departure_h, 15.0);
        assert_eq!(m.incoterm_extra_h, 3.0);
    }

    #[test]
    fn test_cutoffs_can_fall_on_previous_day() {
        let m = explain(RawInputs {
            flights: "02:00, 09:00".into(),
            ..RawInputs::default()
        });
        // 02:00 - 2h LAT - 3h pickup = 21:00 the day before.
        assert_eq!(m.cutoffs[0].cutoff_tod_min, -180.0);
        assert!(m.cutoffs[0].is_previous_day());
        assert_eq!(m.cutoffs[1].cutoff_tod_min, 240.0);
        assert!(!m.cutoffs[1].is_previous_day());
    }

    #[test]
    fn test_narrative_for_worst_case() {
        let m = explain(RawInputs::default());
        let n = m.narrative;
        // Ordered 04:01, at the terminal 07:01, one minute after the 09:00
        // acceptance closed; waits until 21:00.
        assert_eq!(n.order_minute.get(), 241);
        assert_eq!(n.readiness_abs_min, 361.0);
        assert_eq!(n.terminal_abs_min, 421.0);
        assert_eq!(n.chosen_departure.abs_minute, 1260);
        let missed = n.missed.unwrap();
        assert_eq!(missed.departure.abs_minute, 540);
        assert_eq!(missed.acceptance_close_abs_min, 420.0);
        assert_eq!(missed.late_by_min, 1.0);
        assert_eq!(n.wait_min, 839.0);
    }

    #[test]
    fn test_narrative_without_earlier_departure() {
        let m = explain(RawInputs {
            rfc: "0".into(),
            transit: "0".into(),
            lat: "0".into(),
            flights: "00:00".into(),
            ..RawInputs::default()
        });
        // Minute 0 catches day 0 00:00 directly and has the best lead time;
        // minute 1 waits for day 1 and is the worst case.
        assert_eq!(m.best_minute.get(), 0);
        assert_eq!(m.worst_minute.get(), 1);
        let n = m.narrative;
        assert_eq!(n.chosen_departure.abs_minute, 1440);
        let missed = n.missed.unwrap();
        assert_eq!(missed.departure.abs_minute, 0);
        assert_eq!(missed.late_by_clamped_min(), 1.0);

        let uniform_wait = explain(RawInputs {
            rfc: "0".into(),
            transit: "0".into(),
            lat: "0".into(),
            flights: "23:59".into(),
            ..RawInputs::default()
        });
        // Every minute leaves on day 0, the worst case is minute 0 and there is
        // no earlier departure to have missed.
        let n = uniform_wait.narrative;
        assert_eq!(n.order_minute.get(), 0);
        assert!(n.missed.is_none());
        assert_eq!(n.wait_min, 1439.0);
        assert_eq!(n.wait_clamped_min(), 1439.0);
    }
}
