//! Deterministic stand-ins for the load-flow engine and the LP solver.
//!
//! [`LinearSensitivityEngine`] answers every request with flows that are
//! exactly linear in the range action setpoints, so the linear problem is a
//! perfect model of the network and optimiser runs are reproducible.
//! [`ScriptedLpBackend`] forces solver statuses on chosen calls.

use crate::linear_problem::{LinearProblem, LpBackend, LpSolution};
use crate::results::{ComputationStatus, FlowResult, LinearProblemStatus, SensitivityResult};
use crate::sensitivity::{NetworkSnapshot, SensitivityEngine, SensitivityRequest};
use gat_crac::{CnecId, OptimizationPerimeter, RangeActionId, Side, State};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
enum ScriptedFailure {
    Error,
    State(State),
}

/// Engine computing `flow = reference + Σ sensitivity · (setpoint − reference setpoint)`.
///
/// Reference setpoints default to the snapshot's initial setpoints. Calls
/// to [`SensitivityEngine::compute`] are numbered from 1.
#[derive(Debug, Default)]
pub struct LinearSensitivityEngine {
    reference_flows: BTreeMap<(CnecId, Side), f64>,
    reference_setpoints: BTreeMap<RangeActionId, f64>,
    sensitivities: BTreeMap<(CnecId, Side), BTreeMap<RangeActionId, f64>>,
    commercial_flows: BTreeMap<(CnecId, Side), f64>,
    ptdf_sums: BTreeMap<(CnecId, Side), f64>,
    failures: BTreeMap<usize, ScriptedFailure>,
    calls: AtomicUsize,
}

impl LinearSensitivityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flow(mut self, cnec: &str, side: Side, mw: f64) -> Self {
        self.reference_flows.insert((CnecId::new(cnec), side), mw);
        self
    }

    pub fn with_reference_setpoint(mut self, ra: &str, setpoint: f64) -> Self {
        self.reference_setpoints.insert(RangeActionId::new(ra), setpoint);
        self
    }

    /// MW of flow per setpoint unit
    pub fn with_sensitivity(mut self, cnec: &str, side: Side, ra: &str, value: f64) -> Self {
        self.sensitivities
            .entry((CnecId::new(cnec), side))
            .or_default()
            .insert(RangeActionId::new(ra), value);
        self
    }

    pub fn with_commercial_flow(mut self, cnec: &str, side: Side, mw: f64) -> Self {
        self.commercial_flows.insert((CnecId::new(cnec), side), mw);
        self
    }

    pub fn with_ptdf_zonal_sum(mut self, cnec: &str, side: Side, value: f64) -> Self {
        self.ptdf_sums.insert((CnecId::new(cnec), side), value);
        self
    }

    /// Makes the `call`-th computation return an engine error.
    pub fn fail_on_call(mut self, call: usize) -> Self {
        self.failures.insert(call, ScriptedFailure::Error);
        self
    }

    /// Makes the `call`-th computation report `state` as not converged.
    pub fn fail_state_on_call(mut self, call: usize, state: State) -> Self {
        self.failures.insert(call, ScriptedFailure::State(state));
        self
    }

    /// Number of computations run so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Flows and sensitivities of every CNEC of `perimeter` at the
    /// perimeter's initial setpoints, with commercial flows and PTDF sums.
    /// Not counted as a call.
    pub fn initial_results(
        &self,
        perimeter: &OptimizationPerimeter,
    ) -> (FlowResult, SensitivityResult) {
        let request = SensitivityRequest {
            cnecs: perimeter.flow_cnecs().iter().collect(),
            range_actions: perimeter.range_actions().collect(),
            compute_ptdf_sums: true,
            compute_commercial_flows: true,
        };
        let snapshot = NetworkSnapshot::from_perimeter(perimeter);
        let (flows, mut sensitivities) = self.evaluate(&snapshot, &request);
        for state in request.states() {
            sensitivities.register_state(state);
        }
        sensitivities.register_state(perimeter.main_state());
        sensitivities.finalize_status(perimeter.main_state());
        (flows, sensitivities)
    }

    fn reference_setpoint(&self, snapshot: &NetworkSnapshot, ra: &RangeActionId) -> f64 {
        self.reference_setpoints
            .get(ra)
            .copied()
            .or_else(|| snapshot.initial_setpoint(ra))
            .unwrap_or(0.0)
    }

    fn evaluate(
        &self,
        snapshot: &NetworkSnapshot,
        request: &SensitivityRequest<'_>,
    ) -> (FlowResult, SensitivityResult) {
        let mut flows = FlowResult::new();
        let mut sensitivities = SensitivityResult::new();
        for cnec in &request.cnecs {
            for side in cnec.monitored_sides() {
                let key = (cnec.id().clone(), side);
                let Some(reference) = self.reference_flows.get(&key) else {
                    continue;
                };
                let mut flow = *reference;
                if let Some(per_ra) = self.sensitivities.get(&key) {
                    for (ra, value) in per_ra {
                        let delta = snapshot.effective_setpoint(ra, cnec.state())
                            - self.reference_setpoint(snapshot, ra);
                        flow += value * delta;
                        sensitivities.set_range_action_sensitivity(cnec.id(), side, ra, *value);
                    }
                }
                flows.set_flow(cnec.id(), side, flow);
                if request.compute_commercial_flows {
                    if let Some(commercial) = self.commercial_flows.get(&key) {
                        flows.set_commercial_flow(cnec.id(), side, *commercial);
                    }
                }
                if request.compute_ptdf_sums {
                    if let Some(sum) = self.ptdf_sums.get(&key) {
                        flows.set_ptdf_zonal_sum(cnec.id(), side, *sum);
                    }
                }
            }
        }
        (flows, sensitivities)
    }
}

impl SensitivityEngine for LinearSensitivityEngine {
    fn id(&self) -> &str {
        "linear"
    }

    fn compute(
        &self,
        snapshot: &NetworkSnapshot,
        request: &SensitivityRequest<'_>,
    ) -> anyhow::Result<(FlowResult, SensitivityResult)> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.failures.get(&call) {
            Some(ScriptedFailure::Error) => anyhow::bail!("scripted failure on call {call}"),
            Some(ScriptedFailure::State(state)) => {
                let (flows, mut sensitivities) = self.evaluate(snapshot, request);
                sensitivities.set_state_status(state, ComputationStatus::Failure);
                Ok((flows, sensitivities))
            }
            None => Ok(self.evaluate(snapshot, request)),
        }
    }
}

/// Backend returning scripted statuses on chosen solve calls and delegating
/// to `inner` otherwise. Calls are numbered from 1.
///
/// A scripted status without a solution skips the inner solver; `Feasible`
/// keeps the inner solution and only relabels it.
#[derive(Debug)]
pub struct ScriptedLpBackend<B> {
    inner: B,
    script: BTreeMap<usize, LinearProblemStatus>,
    calls: AtomicUsize,
}

impl<B: LpBackend> ScriptedLpBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            script: BTreeMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_status_on_call(mut self, call: usize, status: LinearProblemStatus) -> Self {
        self.script.insert(call, status);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<B: LpBackend> LpBackend for ScriptedLpBackend<B> {
    fn id(&self) -> &str {
        "scripted"
    }

    fn solve(&self, problem: &LinearProblem) -> LpSolution {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.script.get(&call) {
            Some(&status) if !status.has_solution() => LpSolution::failed(status),
            Some(&status) => self.inner.solve(problem).with_status(status),
            None => self.inner.solve(problem),
        }
    }
}
