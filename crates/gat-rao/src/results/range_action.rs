use gat_crac::{RangeAction, RangeActionId, State};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Setpoints closer than this are considered equal.
pub const SETPOINT_TOLERANCE: f64 = 1e-6;

/// Setpoints of every range action before the perimeter is optimised
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeActionSetpointResult {
    setpoints: BTreeMap<RangeActionId, f64>,
}

impl RangeActionSetpointResult {
    pub fn new(setpoints: impl IntoIterator<Item = (RangeActionId, f64)>) -> Self {
        Self {
            setpoints: setpoints.into_iter().collect(),
        }
    }

    /// Initial network setpoints of the given range actions.
    pub fn from_initial<'a>(range_actions: impl IntoIterator<Item = &'a RangeAction>) -> Self {
        Self::new(
            range_actions
                .into_iter()
                .map(|ra| (ra.id().clone(), ra.initial_setpoint())),
        )
    }

    pub fn setpoint(&self, ra: &RangeActionId) -> Option<f64> {
        self.setpoints.get(ra).copied()
    }

    pub fn tap(&self, ra: &RangeAction) -> Option<i32> {
        self.setpoint(ra.id()).and_then(|s| ra.setpoint_to_tap(s))
    }

    pub fn range_actions(&self) -> impl Iterator<Item = &RangeActionId> {
        self.setpoints.keys()
    }
}

/// Optimised setpoint of each (range action, state) pair.
///
/// A range action without a setpoint on some state inherits the setpoint of
/// the latest upstream state that has one, and ultimately its pre-perimeter
/// setpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeActionActivationResult {
    pre_perimeter: RangeActionSetpointResult,
    setpoints: BTreeMap<State, BTreeMap<RangeActionId, f64>>,
}

impl RangeActionActivationResult {
    pub fn new(pre_perimeter: RangeActionSetpointResult) -> Self {
        Self {
            pre_perimeter,
            setpoints: BTreeMap::new(),
        }
    }

    pub fn pre_perimeter(&self) -> &RangeActionSetpointResult {
        &self.pre_perimeter
    }

    pub fn activate(&mut self, ra: &RangeActionId, state: &State, setpoint: f64) {
        self.setpoints
            .entry(state.clone())
            .or_default()
            .insert(ra.clone(), setpoint);
    }

    /// Setpoint explicitly stored for `state`, without chain fallback.
    pub fn stored_setpoint(&self, ra: &RangeActionId, state: &State) -> Option<f64> {
        self.setpoints.get(state).and_then(|m| m.get(ra)).copied()
    }

    pub fn optimized_setpoint(&self, ra: &RangeActionId, state: &State) -> f64 {
        self.setpoints
            .iter()
            .rev()
            .filter(|(s, _)| s.is_upstream_of(state))
            .find_map(|(_, m)| m.get(ra).copied())
            .or_else(|| self.pre_perimeter.setpoint(ra))
            .unwrap_or(0.0)
    }

    /// Setpoint in force just before `state`.
    fn previous_setpoint(&self, ra: &RangeActionId, state: &State) -> f64 {
        self.setpoints
            .iter()
            .rev()
            .filter(|(s, _)| *s != state && s.is_upstream_of(state))
            .find_map(|(_, m)| m.get(ra).copied())
            .or_else(|| self.pre_perimeter.setpoint(ra))
            .unwrap_or(0.0)
    }

    pub fn optimized_tap(&self, ra: &RangeAction, state: &State) -> Option<i32> {
        ra.setpoint_to_tap(self.optimized_setpoint(ra.id(), state))
    }

    /// Range actions whose setpoint on `state` differs from the one in force
    /// before it.
    pub fn activated_range_actions(&self, state: &State) -> Vec<RangeActionId> {
        self.setpoints
            .get(state)
            .into_iter()
            .flatten()
            .filter(|(ra, setpoint)| {
                (**setpoint - self.previous_setpoint(ra, state)).abs() > SETPOINT_TOLERANCE
            })
            .map(|(ra, _)| ra.clone())
            .collect()
    }

    /// (state, range action, setpoint) entries stored in this result.
    pub fn entries(&self) -> impl Iterator<Item = (&State, &RangeActionId, f64)> {
        self.setpoints
            .iter()
            .flat_map(|(state, m)| m.iter().map(move |(ra, s)| (state, ra, *s)))
    }

    /// Whether any setpoint differs from `other` by more than
    /// [`SETPOINT_TOLERANCE`], comparing effective setpoints over the states
    /// stored in either result.
    pub fn has_changed(&self, other: &RangeActionActivationResult) -> bool {
        self.entries()
            .chain(other.entries())
            .any(|(state, ra, _)| {
                (self.optimized_setpoint(ra, state) - other.optimized_setpoint(ra, state)).abs()
                    > SETPOINT_TOLERANCE
            })
    }
}
