//! Sensitivity computation around the external load-flow engine.
//!
//! The engine is a black box behind [`SensitivityEngine`]: given the working
//! [`NetworkSnapshot`] it returns flows and linear sensitivities for the
//! requested CNECs. [`SensitivityComputer`] decides what to request, carries
//! fixed commercial flows and PTDF sums across iterations, and turns engine
//! errors and incomplete answers into failed states.
//!
//! ```text
//!   snapshot ──► engine.compute ──► (FlowResult, SensitivityResult)
//!                     │                      │
//!                     └─ Err / missing ──────┴─► state status = Failure
//! ```

use crate::results::{
    ComputationStatus, FlowResult, RangeActionActivationResult, SensitivityResult,
};
use gat_crac::{FlowCnec, OptimizationPerimeter, RangeAction, RangeActionId, State};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Exclusively owned working copy of the range action setpoints of one
/// optimisation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkSnapshot {
    initial: BTreeMap<RangeActionId, f64>,
    applied: BTreeMap<State, BTreeMap<RangeActionId, f64>>,
}

impl NetworkSnapshot {
    pub fn new(initial: impl IntoIterator<Item = (RangeActionId, f64)>) -> Self {
        Self {
            initial: initial.into_iter().collect(),
            applied: BTreeMap::new(),
        }
    }

    /// Snapshot whose setpoints are the initial ones of the perimeter's
    /// range actions.
    pub fn from_perimeter(perimeter: &OptimizationPerimeter) -> Self {
        Self::new(
            perimeter
                .range_actions()
                .map(|ra| (ra.id().clone(), ra.initial_setpoint())),
        )
    }

    pub fn apply(&mut self, state: &State, ra: &RangeActionId, setpoint: f64) {
        self.applied
            .entry(state.clone())
            .or_default()
            .insert(ra.clone(), setpoint);
    }

    /// Writes the setpoint of every (state, range action) pair of the
    /// perimeter.
    pub fn apply_activation(
        &mut self,
        activation: &RangeActionActivationResult,
        perimeter: &OptimizationPerimeter,
    ) {
        for (state, ra) in perimeter.state_range_actions() {
            self.apply(state, ra.id(), activation.optimized_setpoint(ra.id(), state));
        }
    }

    /// Setpoint in force on `state`: the latest applied on its chain, else
    /// the initial one.
    pub fn effective_setpoint(&self, ra: &RangeActionId, state: &State) -> f64 {
        self.applied
            .iter()
            .rev()
            .filter(|(s, _)| s.is_upstream_of(state))
            .find_map(|(_, m)| m.get(ra).copied())
            .or_else(|| self.initial.get(ra).copied())
            .unwrap_or(0.0)
    }

    pub fn initial_setpoint(&self, ra: &RangeActionId) -> Option<f64> {
        self.initial.get(ra).copied()
    }
}

/// What the engine must compute
#[derive(Debug, Clone)]
pub struct SensitivityRequest<'a> {
    pub cnecs: Vec<&'a FlowCnec>,
    pub range_actions: Vec<&'a RangeAction>,
    pub compute_ptdf_sums: bool,
    pub compute_commercial_flows: bool,
}

impl SensitivityRequest<'_> {
    /// States of the requested CNECs, sorted.
    pub fn states(&self) -> Vec<&State> {
        let mut states: Vec<&State> = self.cnecs.iter().map(|c| c.state()).collect();
        states.sort();
        states.dedup();
        states
    }
}

/// External load-flow and sensitivity engine.
///
/// Engines report non-convergence per state through
/// [`SensitivityResult::set_state_status`]; returning `Err` fails every
/// requested state.
pub trait SensitivityEngine: Send + Sync {
    fn id(&self) -> &str;

    fn compute(
        &self,
        snapshot: &NetworkSnapshot,
        request: &SensitivityRequest<'_>,
    ) -> anyhow::Result<(FlowResult, SensitivityResult)>;
}

/// Source of PTDF zonal sums or commercial flows
#[derive(Debug, Clone, Default)]
pub enum AuxiliarySource {
    /// Not needed by the objective
    #[default]
    Skip,
    /// Requested from the engine on every run
    Compute,
    /// Copied from a reference situation
    Fixed(FlowResult),
}

pub struct SensitivityComputer<'a> {
    engine: &'a dyn SensitivityEngine,
    main_state: State,
    cnecs: Vec<&'a FlowCnec>,
    range_actions: Vec<&'a RangeAction>,
    ptdf_sums: AuxiliarySource,
    commercial_flows: AuxiliarySource,
}

impl<'a> SensitivityComputer<'a> {
    pub fn builder(
        engine: &'a dyn SensitivityEngine,
        main_state: State,
    ) -> SensitivityComputerBuilder<'a> {
        SensitivityComputerBuilder {
            computer: SensitivityComputer {
                engine,
                main_state,
                cnecs: Vec::new(),
                range_actions: Vec::new(),
                ptdf_sums: AuxiliarySource::Skip,
                commercial_flows: AuxiliarySource::Skip,
            },
        }
    }

    fn request(&self) -> SensitivityRequest<'a> {
        SensitivityRequest {
            cnecs: self.cnecs.clone(),
            range_actions: self.range_actions.clone(),
            compute_ptdf_sums: matches!(self.ptdf_sums, AuxiliarySource::Compute),
            compute_commercial_flows: matches!(self.commercial_flows, AuxiliarySource::Compute),
        }
    }

    /// Runs the engine on `snapshot`. Never fails: engine errors come back
    /// as failed states.
    pub fn compute(&self, snapshot: &NetworkSnapshot) -> (FlowResult, SensitivityResult) {
        let request = self.request();
        let states = request.states();
        let (mut flows, mut sensitivities) = match self.engine.compute(snapshot, &request) {
            Ok(output) => output,
            Err(e) => {
                warn!("Sensitivity engine {} failed: {:#}", self.engine.id(), e);
                let mut failed = SensitivityResult::failed(states.iter().copied());
                failed.set_state_status(&self.main_state, ComputationStatus::Failure);
                return (FlowResult::new(), failed);
            }
        };

        for cnec in &request.cnecs {
            let complete = cnec
                .monitored_sides()
                .into_iter()
                .all(|side| flows.contains(cnec.id(), side));
            if !complete && sensitivities.state_status(cnec.state()) != ComputationStatus::Failure {
                warn!(
                    "Sensitivity engine {} returned no flow for cnec {}, state {} marked as failed",
                    self.engine.id(),
                    cnec.id(),
                    cnec.state()
                );
                sensitivities.set_state_status(cnec.state(), ComputationStatus::Failure);
            }
        }
        // every computed state takes part in the overall status
        for state in &states {
            sensitivities.register_state(state);
        }
        sensitivities.finalize_status(&self.main_state);

        if let AuxiliarySource::Fixed(reference) = &self.ptdf_sums {
            flows.carry_ptdf_sums_from(reference);
        }
        if let AuxiliarySource::Fixed(reference) = &self.commercial_flows {
            flows.carry_commercial_flows_from(reference);
        }

        debug!(
            "Sensitivity computation on {} cnecs and {} range actions: {:?}",
            request.cnecs.len(),
            request.range_actions.len(),
            sensitivities.status()
        );
        (flows, sensitivities)
    }
}

pub struct SensitivityComputerBuilder<'a> {
    computer: SensitivityComputer<'a>,
}

impl<'a> SensitivityComputerBuilder<'a> {
    pub fn with_cnecs(mut self, cnecs: impl IntoIterator<Item = &'a FlowCnec>) -> Self {
        self.computer.cnecs.extend(cnecs);
        self
    }

    pub fn with_range_actions(
        mut self,
        range_actions: impl IntoIterator<Item = &'a RangeAction>,
    ) -> Self {
        self.computer.range_actions.extend(range_actions);
        self
    }

    pub fn with_ptdf_sums(mut self, source: AuxiliarySource) -> Self {
        self.computer.ptdf_sums = source;
        self
    }

    pub fn with_commercial_flows(mut self, source: AuxiliarySource) -> Self {
        self.computer.commercial_flows = source;
        self
    }

    pub fn build(self) -> SensitivityComputer<'a> {
        self.computer
    }
}
