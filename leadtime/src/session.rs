//! Caller-owned cache of the last successful run.

use crate::inputs::parse_hours;
use crate::{analyze, Analysis, Incoterm, LtError, RawInputs};

/// When an input change triggers a new run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecomputePolicy {
    /// Revalidate and recompute on every change.
    Auto,
    /// Mark results stale; recompute only on [`Session::calculate`].
    OnDemand,
}

impl Default for RecomputePolicy {
    fn default() -> Self {
        RecomputePolicy::Auto
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionState {
    /// The cache matches the current inputs.
    Fresh,
    /// Inputs changed since the last run; nothing cached.
    Stale,
    /// The last run failed validation or computation.
    Invalid(LtError),
}

#[derive(Debug)]
pub struct Session {
    policy: RecomputePolicy,
    inputs: RawInputs,
    cached: Option<Analysis>,
    state: SessionState,
}

impl Session {
    pub fn new(inputs: RawInputs, policy: RecomputePolicy) -> Self {
        let mut session = Self {
            policy,
            inputs,
            cached: None,
            state: SessionState::Stale,
        };
        if policy == RecomputePolicy::Auto {
            let _ = session.calculate();
        }
        session
    }

    pub fn inputs(&self) -> &RawInputs {
        &self.inputs
    }

    pub fn policy(&self) -> RecomputePolicy {
        self.policy
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.cached.as_ref()
    }

    /// Replace the inputs. A change confined to the lookup target keeps a
    /// fresh cache; anything else, or any change while not fresh, drops it.
    pub fn update_inputs(&mut self, inputs: RawInputs) -> &SessionState {
        let lookup_only = self.inputs.same_simulation_inputs(&inputs);
        self.inputs = inputs;
        if lookup_only && self.state == SessionState::Fresh {
            return &self.state;
        }
        self.cached = None;
        self.state = SessionState::Stale;
        if self.policy == RecomputePolicy::Auto {
            let _ = self.calculate();
        }
        &self.state
    }

    pub fn set_lookup(&mut self, lookup: impl Into<String>) -> &SessionState {
        let mut inputs = self.inputs.clone();
        inputs.lookup = lookup.into();
        self.update_inputs(inputs)
    }

    /// Switch incoterm, resetting customs and last-mile to its defaults.
    pub fn set_incoterm(&mut self, incoterm: Incoterm) -> &SessionState {
        let inputs = self.inputs.clone().with_incoterm(incoterm);
        self.update_inputs(inputs)
    }

    /// Validate and run the current inputs. Failure clears the cache.
    pub fn calculate(&mut self) -> Result<&Analysis, LtError> {
        match self.inputs.validate().and_then(|params| analyze(&params)) {
            Ok(analysis) => {
                self.state = SessionState::Fresh;
                Ok(self.cached.insert(analysis))
            }
            Err(err) => {
                self.cached = None;
                self.state = SessionState::Invalid(err.clone());
                Err(err)
            }
        }
    }

    /// Service level for the current lookup text, answered from the cache.
    /// `None` before the first successful run or for an unusable target.
    pub fn lookup_service_pct(&self) -> Option<f64> {
        let target_h = parse_hours(&self.inputs.lookup).filter(|t| *t >= 0.0)?;
        self.service_level_at(target_h)
    }

    pub fn service_level_at(&self, target_h: f64) -> Option<f64> {
        self.cached
            .as_ref()
            .map(|analysis| analysis.service_level_at(target_h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_session_computes_immediately() {
        let session = Session::new(RawInputs::default(), RecomputePolicy::Auto);
        assert_eq!(session.state(), &SessionState::Fresh);
        assert_eq!(session.analysis().unwrap().explain.worst_minute.get(), 241);
        let cached_pct = session.analysis().unwrap().lookup_service_pct;
        assert_eq!(session.lookup_service_pct(), Some(cached_pct));
    }

    #[test]
    fn test_auto_session_recomputes_on_change() {
        let mut session = Session::new(RawInputs::default(), RecomputePolicy::Auto);
        let inputs = RawInputs {
            flights: "12:00".into(),
            ..RawInputs::default()
        };
        assert_eq!(session.update_inputs(inputs), &SessionState::Fresh);
        assert_eq!(session.analysis().unwrap().params.flights.len(), 1);
    }

    #[test]
    fn test_on_demand_session_waits_for_calculate() {
        let mut session = Session::new(RawInputs::default(), RecomputePolicy::OnDemand);
        assert_eq!(session.state(), &SessionState::Stale);
        assert!(session.analysis().is_none());
        assert!(session.lookup_service_pct().is_none());

        assert!(session.calculate().is_ok());
        assert_eq!(session.state(), &SessionState::Fresh);

        let mut inputs = session.inputs().clone();
        inputs.rfc = "3".into();
        assert_eq!(session.update_inputs(inputs), &SessionState::Stale);
        assert!(session.analysis().is_none());
        assert!(session.lookup_service_pct().is_none());

        let analysis = session.calculate().unwrap();
        assert_eq!(analysis.params.rfc_h, 3.0);
    }

    #[test]
    fn test_lookup_change_keeps_cache() {
        let mut session = Session::new(RawInputs::default(), RecomputePolicy::OnDemand);
        session.calculate().unwrap();

        session.set_lookup("1000");
        assert_eq!(session.state(), &SessionState::Fresh);
        assert!((session.lookup_service_pct().unwrap() - 100.0).abs() < 1e-6);

        let mut inputs = session.inputs().clone();
        inputs.lookup = "1:30".into();
        assert_eq!(session.update_inputs(inputs), &SessionState::Fresh);
        assert_eq!(session.lookup_service_pct(), Some(0.0));

        session.set_lookup("soon");
        assert!(session.analysis().is_some());
        assert!(session.lookup_service_pct().is_none());
        session.set_lookup("-4");
        assert!(session.lookup_service_pct().is_none());
    }

    #[test]
    fn test_fixing_bad_lookup_recovers_auto_session() {
        let inputs = RawInputs {
            lookup: "-4".into(),
            ..RawInputs::default()
        };
        let mut session = Session::new(inputs, RecomputePolicy::Auto);
        assert!(matches!(
            session.state(),
            SessionState::Invalid(LtError::Validation(_))
        ));
        assert!(session.analysis().is_none());

        assert_eq!(session.update_inputs(RawInputs::default()), &SessionState::Fresh);
        assert!(session.analysis().is_some());

        session.set_lookup("later");
        assert!(session.analysis().is_some());
        assert_eq!(session.set_lookup("26"), &SessionState::Fresh);
        let pct = session.lookup_service_pct().unwrap();
        assert!(pct > 0.0 && pct < 100.0);
    }

    #[test]
    fn test_lookup_change_while_stale_waits_for_calculate() {
        let mut session = Session::new(RawInputs::default(), RecomputePolicy::OnDemand);
        assert_eq!(session.set_lookup("30"), &SessionState::Stale);
        assert!(session.analysis().is_none());
        session.calculate().unwrap();
        assert_eq!(session.analysis().unwrap().params.lookup_h, 30.0);
    }

    #[test]
    fn test_failures_clear_cache() {
        let mut session = Session::new(RawInputs::default(), RecomputePolicy::Auto);

        let mut inputs = session.inputs().clone();
        inputs.rfc = "-1".into();
        match session.update_inputs(inputs) {
            SessionState::Invalid(LtError::Validation(errors)) => {
                assert_eq!(errors.errors().len(), 1)
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert!(session.analysis().is_none());

        let mut inputs = session.inputs().clone();
        inputs.rfc = "80".into();
        assert_eq!(
            session.update_inputs(inputs),
            &SessionState::Invalid(LtError::NoFeasibleFlight)
        );
        assert!(session.analysis().is_none());

        let mut inputs = session.inputs().clone();
        inputs.rfc = "2".into();
        assert_eq!(session.update_inputs(inputs), &SessionState::Fresh);
        assert!(session.analysis().is_some());
    }

    #[test]
    fn test_incoterm_switch_resets_post_arrival() {
        let mut session = Session::new(RawInputs::default(), RecomputePolicy::Auto);
        session.set_incoterm(Incoterm::Dpu);
        let analysis = session.analysis().unwrap();
        assert_eq!(analysis.params.incoterm, Incoterm::Dpu);
        assert_eq!(analysis.params.customs_h, 0.0);
        assert_eq!(analysis.params.last_mile_h, 0.0);
        assert_eq!(session.inputs().customs.as_deref(), Some("0"));
    }
}
