//! Order-time probability over the minutes of a day.

use ndarray::Array1;
use serde::Serialize;

use crate::inputs::{parse_hours, parse_time_of_day, DEFAULT_PEAK, DEFAULT_SIGMA_H};
use crate::{DistributionKind, MinuteOfDay, OrderPattern, RawInputs, MINUTES_PER_DAY};

const DAY: usize = MINUTES_PER_DAY as usize;

/// Per-minute order weights, always 1440 entries summing to 1.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct OrderProfile {
    weights: Array1<f64>,
}

impl OrderProfile {
    pub fn build(pattern: &OrderPattern) -> Self {
        match *pattern {
            OrderPattern::Uniform => Self::uniform(),
            OrderPattern::Normal { peak, sigma_h } => Self::normal(peak, sigma_h),
            OrderPattern::Cutoff { cutoff } => Self::cutoff(cutoff),
        }
    }

    pub fn uniform() -> Self {
        Self {
            weights: Array1::from_elem(DAY, 1.0 / DAY as f64),
        }
    }

    /// Gaussian on the circle of the day, so a peak near midnight spills into
    /// both ends of the vector.
    fn normal(peak: MinuteOfDay, sigma_h: f64) -> Self {
        let sigma_minutes = sigma_h * 60.0;
        let mu = peak.get() as i64;
        let raw = Array1::from_shape_fn(DAY, |m| {
            let delta = (m as i64 - mu).abs();
            let distance = delta.min(DAY as i64 - delta) as f64;
            (-0.5 * (distance / sigma_minutes).powi(2)).exp()
        });
        Self::normalized(raw)
    }

    /// Orders only strictly before `cutoff`; a 00:00 cutoff leaves no such
    /// minute and collapses onto minute 0.
    fn cutoff(cutoff: MinuteOfDay) -> Self {
        if cutoff == MinuteOfDay::MIDNIGHT {
            let mut weights = Array1::zeros(DAY);
            weights[0] = 1.0;
            return Self { weights };
        }
        let end = cutoff.index();
        let raw = Array1::from_shape_fn(DAY, |m| if m < end { 1.0 } else { 0.0 });
        Self::normalized(raw)
    }

    fn normalized(raw: Array1<f64>) -> Self {
        let total = raw.sum();
        let weights = if total > 0.0 { raw / total } else { raw };
        Self { weights }
    }

    /// Profile for live display of partially entered inputs. Invalid normal
    /// parameters fall back to the defaults; an invalid cutoff or an unknown
    /// mode gives `None`.
    pub fn preview(raw: &RawInputs) -> Option<Self> {
        let kind = raw.distribution.parse::<DistributionKind>().ok()?;
        match kind {
            DistributionKind::Uniform => Some(Self::uniform()),
            DistributionKind::Normal => {
                let peak = parse_time_of_day(&raw.peak).unwrap_or(DEFAULT_PEAK);
                let sigma_h = parse_hours(&raw.sigma)
                    .filter(|s| *s > 0.0)
                    .unwrap_or(DEFAULT_SIGMA_H);
                Some(Self::normal(peak, sigma_h))
            }
            DistributionKind::Cutoff => parse_time_of_day(&raw.cutoff).map(Self::cutoff),
        }
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn weight(&self, minute: MinuteOfDay) -> f64 {
        self.weights[minute.index()]
    }

    pub fn total(&self) -> f64 {
        self.weights.sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MinuteOfDay, f64)> + '_ {
        MinuteOfDay::all().zip(self.weights.iter().copied())
    }
}
