//! Flight selection for every order minute of the day.

use ndarray::Array1;
use serde::Serialize;

use crate::{FlightSchedule, LtError, MinuteOfDay, Params, MINUTES_PER_DAY};

/// Day offsets scanned after the order day (offsets `0..=LOOKAHEAD_DAYS`).
pub const LOOKAHEAD_DAYS: u32 = 3;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Departure {
    /// Minutes from the start of the order day.
    pub abs_minute: u32,
    pub day_offset: u32,
    pub time_of_day: MinuteOfDay,
}

/// Every departure over the lookahead window, in chronological order.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct DepartureSchedule {
    departures: Vec<Departure>,
}

impl DepartureSchedule {
    pub fn new(flights: &FlightSchedule) -> Self {
        let mut departures = Vec::with_capacity(flights.len() * (LOOKAHEAD_DAYS as usize + 1));
        for day_offset in 0..=LOOKAHEAD_DAYS {
            for &time_of_day in flights.times() {
                departures.push(Departure {
                    abs_minute: day_offset * MINUTES_PER_DAY + time_of_day.get(),
                    day_offset,
                    time_of_day,
                });
            }
        }
        departures.sort_by_key(|d| d.abs_minute);
        Self { departures }
    }

    pub fn departures(&self) -> &[Departure] {
        &self.departures
    }

    /// First departure whose acceptance is still open when the shipment
    /// reaches the terminal.
    pub fn first_catchable(&self, terminal_abs: f64, acceptance_minutes: f64) -> Option<Departure> {
        self.departures
            .iter()
            .find(|d| terminal_abs <= d.abs_minute as f64 - acceptance_minutes)
            .copied()
    }

    /// Latest departure strictly before `abs_minute`.
    pub fn latest_before(&self, abs_minute: u32) -> Option<Departure> {
        let idx = self.departures.partition_point(|d| d.abs_minute < abs_minute);
        idx.checked_sub(1).map(|i| self.departures[i])
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct Assignment {
    pub order_minute: MinuteOfDay,
    pub departure: Departure,
    pub lead_time_h: f64,
}

/// Per-minute flight choice and lead time for one parameter set.
#[derive(Clone, Debug, Serialize)]
pub struct Simulation {
    assignments: Vec<Assignment>,
    lead_times_h: Array1<f64>,
    #[serde(skip)]
    schedule: DepartureSchedule,
}

impl Simulation {
    /// Fails as a whole if any order minute has no catchable departure within
    /// the lookahead.
    pub fn run(params: &Params) -> Result<Self, LtError> {
        let schedule = DepartureSchedule::new(&params.flights);
        let pre_departure = params.pre_departure_minutes();
        let acceptance = params.acceptance_minutes();
        let post_departure = params.post_departure_minutes();

        let mut assignments = Vec::with_capacity(MINUTES_PER_DAY as usize);
        for order_minute in MinuteOfDay::all() {
            let terminal_abs = order_minute.get() as f64 + pre_departure;
            let departure = schedule
                .first_catchable(terminal_abs, acceptance)
                .ok_or(LtError::NoFeasibleFlight)?;
            let lead_time_h =
                (departure.abs_minute as f64 + post_departure - order_minute.get() as f64) / 60.0;
            assignments.push(Assignment {
                order_minute,
                departure,
                lead_time_h,
            });
        }

        let lead_times_h = assignments.iter().map(|a| a.lead_time_h).collect();
        Ok(Self {
            assignments,
            lead_times_h,
            schedule,
        })
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn assignment(&self, minute: MinuteOfDay) -> &Assignment {
        &self.assignments[minute.index()]
    }

    pub fn lead_times(&self) -> &Array1<f64> {
        &self.lead_times_h
    }

    pub fn schedule(&self) -> &DepartureSchedule {
        &self.schedule
    }

    pub fn max_lead_time_h(&self) -> f64 {
        self.lead_times_h.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v))
    }
}
