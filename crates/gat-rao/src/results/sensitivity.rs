use super::ComputationStatus;
use gat_crac::{CnecId, FlowCnec, RangeActionId, Side, State, Unit};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Input of a sensitivity: a range action setpoint or a zonal GLSK shift
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityVariable {
    RangeAction(RangeActionId),
    Glsk(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SideSensitivities {
    range_actions: HashMap<RangeActionId, f64>,
    glsk: BTreeMap<String, f64>,
}

/// Linear sensitivities of CNEC flows, in MW per setpoint unit (degree for
/// PSTs, MW for HVDC and injections), with the status of each state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensitivityResult {
    values: HashMap<CnecId, BTreeMap<Side, SideSensitivities>>,
    state_statuses: BTreeMap<String, ComputationStatus>,
    status: ComputationStatus,
}

impl SensitivityResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result where every listed state failed.
    pub fn failed<'a>(states: impl IntoIterator<Item = &'a State>) -> Self {
        let mut result = Self::new();
        for state in states {
            result.set_state_status(state, ComputationStatus::Failure);
        }
        result.status = ComputationStatus::Failure;
        result
    }

    fn side_entry(&mut self, cnec: &CnecId, side: Side) -> &mut SideSensitivities {
        self.values
            .entry(cnec.clone())
            .or_default()
            .entry(side)
            .or_default()
    }

    fn side(&self, cnec: &CnecId, side: Side) -> Option<&SideSensitivities> {
        self.values.get(cnec).and_then(|sides| sides.get(&side))
    }

    pub fn set_sensitivity(
        &mut self,
        cnec: &CnecId,
        side: Side,
        variable: SensitivityVariable,
        mw_per_unit: f64,
    ) -> &mut Self {
        let entry = self.side_entry(cnec, side);
        match variable {
            SensitivityVariable::RangeAction(ra) => {
                entry.range_actions.insert(ra, mw_per_unit);
            }
            SensitivityVariable::Glsk(zone) => {
                entry.glsk.insert(zone, mw_per_unit);
            }
        }
        self
    }

    pub fn set_range_action_sensitivity(
        &mut self,
        cnec: &CnecId,
        side: Side,
        ra: &RangeActionId,
        mw_per_unit: f64,
    ) -> &mut Self {
        self.side_entry(cnec, side)
            .range_actions
            .insert(ra.clone(), mw_per_unit);
        self
    }

    /// Sensitivity of `cnec`'s flow on `side` to `ra`, in `unit` per
    /// setpoint unit. Zero when unknown.
    pub fn sensitivity(&self, cnec: &FlowCnec, side: Side, ra: &RangeActionId, unit: Unit) -> f64 {
        let mw = self
            .side(cnec.id(), side)
            .and_then(|s| s.range_actions.get(ra))
            .copied()
            .unwrap_or(0.0);
        mw * cnec.unit_multiplier(side, Unit::Megawatt, unit).unwrap_or(1.0)
    }

    pub fn glsk_sensitivity(&self, cnec: &CnecId, side: Side, zone: &str) -> f64 {
        self.side(cnec, side)
            .and_then(|s| s.glsk.get(zone))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn set_state_status(&mut self, state: &State, status: ComputationStatus) -> &mut Self {
        self.state_statuses.insert(state.id(), status);
        self
    }

    /// Registers `state` as computed, keeping any status already reported.
    pub fn register_state(&mut self, state: &State) -> &mut Self {
        self.state_statuses
            .entry(state.id())
            .or_insert(ComputationStatus::Default);
        self
    }

    /// Status of one state; states never reported count as successful.
    pub fn state_status(&self, state: &State) -> ComputationStatus {
        self.state_statuses
            .get(&state.id())
            .copied()
            .unwrap_or_default()
    }

    pub fn state_statuses(&self) -> impl Iterator<Item = ComputationStatus> + '_ {
        self.state_statuses.values().copied()
    }

    pub fn status(&self) -> ComputationStatus {
        self.status
    }

    /// Recomputes the overall status from the state statuses.
    pub fn finalize_status(&mut self, main_state: &State) {
        let main = self.state_status(main_state);
        self.status = ComputationStatus::overall(main, self.state_statuses());
    }

    pub fn any_state_failed(&self) -> bool {
        self.status == ComputationStatus::Failure
            || self
                .state_statuses
                .values()
                .any(|s| *s == ComputationStatus::Failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gat_crac::{BranchThreshold, Contingency, Instant};

    #[test]
    fn test_sensitivity_unit_conversion() {
        let cnec = FlowCnec::builder("cnec", State::preventive())
            .threshold(BranchThreshold::symmetric(Side::Left, Unit::Megawatt, 100.0))
            .nominal_voltage(Side::Left, 225.0)
            .build()
            .unwrap();
        let ra = RangeActionId::new("pst");
        let mut sensi = SensitivityResult::new();
        sensi.set_range_action_sensitivity(cnec.id(), Side::Left, &ra, 10.0);
        assert!((sensi.sensitivity(&cnec, Side::Left, &ra, Unit::Megawatt) - 10.0).abs() < 1e-12);
        let expected = 10.0 * 1000.0 / (3f64.sqrt() * 225.0);
        assert!((sensi.sensitivity(&cnec, Side::Left, &ra, Unit::Ampere) - expected).abs() < 1e-9);
        assert_eq!(sensi.sensitivity(&cnec, Side::Right, &ra, Unit::Megawatt), 0.0);
    }

    #[test]
    fn test_status_aggregation() {
        let prev = State::preventive();
        let cur = State::post_contingency(Instant::curative(), Contingency::new("co1")).unwrap();
        let mut sensi = SensitivityResult::new();
        sensi
            .set_state_status(&prev, ComputationStatus::Default)
            .set_state_status(&cur, ComputationStatus::Failure);
        sensi.finalize_status(&prev);
        assert_eq!(sensi.status(), ComputationStatus::PartialFailure);
        assert!(sensi.any_state_failed());

        sensi.finalize_status(&cur);
        assert_eq!(sensi.status(), ComputationStatus::Failure);

        let failed = SensitivityResult::failed([&prev]);
        assert_eq!(failed.status(), ComputationStatus::Failure);
    }

    #[test]
    fn test_registered_states_keep_reported_failures() {
        let prev = State::preventive();
        let cur = State::post_contingency(Instant::curative(), Contingency::new("co1")).unwrap();
        let mut sensi = SensitivityResult::new();
        sensi.set_state_status(&cur, ComputationStatus::Failure);
        sensi.finalize_status(&prev);
        assert_eq!(sensi.status(), ComputationStatus::Failure);

        sensi.register_state(&prev).register_state(&cur);
        sensi.finalize_status(&prev);
        assert_eq!(sensi.state_status(&cur), ComputationStatus::Failure);
        assert_eq!(sensi.status(), ComputationStatus::PartialFailure);
    }

    #[test]
    fn test_glsk_sensitivity() {
        let cnec = CnecId::new("c");
        let mut sensi = SensitivityResult::new();
        sensi.set_sensitivity(&cnec, Side::Left, SensitivityVariable::Glsk("FR".into()), 0.2);
        assert!((sensi.glsk_sensitivity(&cnec, Side::Left, "FR") - 0.2).abs() < 1e-12);
        assert_eq!(sensi.glsk_sensitivity(&cnec, Side::Left, "BE"), 0.0);
    }
}
