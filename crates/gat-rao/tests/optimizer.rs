//! End-to-end runs of the iterating optimiser on a linear network.
#![cfg(feature = "solver-clarabel")]

use gat_crac::{
    BranchThreshold, CnecId, Contingency, FlowCnec, Instant, OptimizationPerimeter, PerimeterKind,
    RangeAction, RangeActionId, RangeType, Side, StandardRange, State, TapTable, Unit,
};
use gat_rao::parameters::{LoopFlowParameters, MnecParameters, RelativeMarginParameters};
use gat_rao::test_utils::{LinearSensitivityEngine, ScriptedLpBackend};
use gat_rao::{
    optimize, ClarabelBackend, FlowResult, LinearOptimizationResult, LinearProblemStatus,
    LpBackend, NetworkSnapshot, OptimizerInput, PstModel, RangeActionSetpointResult,
    RaoParameters, SensitivityComputer, SensitivityResult,
};

const TOL: f64 = 1e-4;

fn line(id: &str, state: State, limit: f64) -> FlowCnec {
    FlowCnec::builder(id, state)
        .threshold(BranchThreshold::symmetric(Side::Left, Unit::Megawatt, limit))
        .build()
        .unwrap()
}

fn hvdc(id: &str) -> RangeAction {
    RangeAction::hvdc(id, 0.0).with_range(StandardRange {
        range_type: RangeType::Absolute,
        min: -50.0,
        max: 50.0,
    })
}

fn curative() -> State {
    State::post_contingency(Instant::curative(), Contingency::new("co1")).unwrap()
}

struct Case {
    perimeter: OptimizationPerimeter,
    engine: LinearSensitivityEngine,
    flows: FlowResult,
    sensitivities: SensitivityResult,
}

impl Case {
    fn new(perimeter: OptimizationPerimeter, engine: LinearSensitivityEngine) -> Self {
        let (flows, sensitivities) = engine.initial_results(&perimeter);
        Self {
            perimeter,
            engine,
            flows,
            sensitivities,
        }
    }

    fn run(
        &self,
        backend: &dyn LpBackend,
        params: &RaoParameters,
    ) -> (LinearOptimizationResult, NetworkSnapshot) {
        self.run_from(backend, params, &self.flows)
    }

    /// Runs with `initial` as the initial situation, the engine's flows
    /// standing for the pre-perimeter one.
    fn run_from(
        &self,
        backend: &dyn LpBackend,
        params: &RaoParameters,
        initial: &FlowResult,
    ) -> (LinearOptimizationResult, NetworkSnapshot) {
        let mut snapshot = NetworkSnapshot::from_perimeter(&self.perimeter);
        let setpoints = RangeActionSetpointResult::from_initial(self.perimeter.range_actions());
        let input = OptimizerInput {
            perimeter: &self.perimeter,
            pre_perimeter_setpoints: setpoints,
            pre_optim_flow_result: &self.flows,
            pre_optim_sensitivity_result: &self.sensitivities,
            initial_flow_result: initial,
            engine: &self.engine,
            backend,
        };
        let result = optimize(&input, &mut snapshot, params).unwrap();
        (result, snapshot)
    }
}

/// 120 MW on a ±100 MW line, relieved 1:1 by an HVDC limited to ±50 MW.
fn hvdc_case() -> Case {
    let perimeter = OptimizationPerimeter::builder(PerimeterKind::Preventive, State::preventive())
        .cnec(line("line", State::preventive(), 100.0))
        .range_action(State::preventive(), hvdc("hvdc"))
        .build()
        .unwrap();
    let engine = LinearSensitivityEngine::new()
        .with_flow("line", Side::Left, 120.0)
        .with_sensitivity("line", Side::Left, "hvdc", 1.0);
    Case::new(perimeter, engine)
}

fn hvdc_setpoint(result: &LinearOptimizationResult) -> f64 {
    result
        .activation()
        .optimized_setpoint(&RangeActionId::new("hvdc"), &State::preventive())
}

fn snapshot_setpoint(snapshot: &NetworkSnapshot, ra: &str) -> f64 {
    snapshot.effective_setpoint(&RangeActionId::new(ra), &State::preventive())
}

#[test]
fn test_hvdc_relieves_overload() {
    let case = hvdc_case();
    let (result, snapshot) = case.run(&ClarabelBackend, &RaoParameters::default());

    assert_eq!(result.status(), LinearProblemStatus::Optimal);
    assert_eq!(result.iterations(), 1);
    assert!((hvdc_setpoint(&result) + 50.0).abs() < TOL);
    // margin goes from -20 to 30
    assert!((result.functional_cost() + 30.0).abs() < TOL);
    assert_eq!(result.cost_history().len(), 2);
    assert!((result.cost_history()[0] - 20.0).abs() < TOL);
    assert!(result.cost_history().windows(2).all(|w| w[1] < w[0]));
    assert!((snapshot_setpoint(&snapshot, "hvdc") + 50.0).abs() < TOL);
    assert_eq!(case.engine.calls(), 1);
}

#[test]
fn test_setpoints_stay_within_range() {
    let case = hvdc_case();
    let (result, _) = case.run(&ClarabelBackend, &RaoParameters::default());
    let setpoint = hvdc_setpoint(&result);
    assert!((-50.0 - 1e-6..=50.0 + 1e-6).contains(&setpoint));
}

#[test]
fn test_rerun_from_converged_point_is_stable() {
    let case = hvdc_case();
    let params = RaoParameters::default();
    let (first, snapshot) = case.run(&ClarabelBackend, &params);

    let computer = SensitivityComputer::builder(&case.engine, State::preventive())
        .with_cnecs(case.perimeter.flow_cnecs())
        .with_range_actions(case.perimeter.range_actions())
        .build();
    let (flows, sensitivities) = computer.compute(&snapshot);
    let converged =
        RangeActionSetpointResult::new([(RangeActionId::new("hvdc"), hvdc_setpoint(&first))]);

    let mut rerun_snapshot = snapshot.clone();
    let input = OptimizerInput {
        perimeter: &case.perimeter,
        pre_perimeter_setpoints: converged,
        pre_optim_flow_result: &flows,
        pre_optim_sensitivity_result: &sensitivities,
        initial_flow_result: &case.flows,
        engine: &case.engine,
        backend: &ClarabelBackend,
    };
    let second = optimize(&input, &mut rerun_snapshot, &params).unwrap();

    assert_eq!(second.iterations(), 0);
    assert!((hvdc_setpoint(&second) - hvdc_setpoint(&first)).abs() < TOL);
    assert!((second.cost() - first.cost()).abs() < TOL);
    assert_eq!(rerun_snapshot, snapshot);
}

#[test]
fn test_max_iterations_reached() {
    let case = hvdc_case();
    let params = RaoParameters {
        max_iterations: 1,
        ..Default::default()
    };
    let (result, _) = case.run(&ClarabelBackend, &params);

    assert_eq!(result.status(), LinearProblemStatus::MaxIterationReached);
    assert_eq!(result.iterations(), 1);
    assert!((hvdc_setpoint(&result) + 50.0).abs() < TOL);
}

#[test]
fn test_infeasible_first_iteration_keeps_initial_situation() {
    let case = hvdc_case();
    let backend = ScriptedLpBackend::new(ClarabelBackend)
        .with_status_on_call(1, LinearProblemStatus::Infeasible);
    let (result, snapshot) = case.run(&backend, &RaoParameters::default());

    assert_eq!(result.status(), LinearProblemStatus::Infeasible);
    assert_eq!(result.iterations(), 0);
    assert!((result.functional_cost() - 20.0).abs() < TOL);
    assert_eq!(result.cost_history(), &[result.cost()]);
    assert_eq!(hvdc_setpoint(&result), 0.0);
    assert_eq!(snapshot_setpoint(&snapshot, "hvdc"), 0.0);
    assert_eq!(case.engine.calls(), 0);
}

#[test]
fn test_solver_failure_after_progress_is_feasible() {
    let case = hvdc_case();
    let backend = ScriptedLpBackend::new(ClarabelBackend)
        .with_status_on_call(2, LinearProblemStatus::Abnormal);
    let (result, snapshot) = case.run(&backend, &RaoParameters::default());

    assert_eq!(result.status(), LinearProblemStatus::Feasible);
    assert_eq!(result.iterations(), 1);
    assert!((hvdc_setpoint(&result) + 50.0).abs() < TOL);
    assert!((snapshot_setpoint(&snapshot, "hvdc") + 50.0).abs() < TOL);
}

#[test]
fn test_sensitivity_failure_first_iteration() {
    let case = Case::new(hvdc_case().perimeter, {
        LinearSensitivityEngine::new()
            .with_flow("line", Side::Left, 120.0)
            .with_sensitivity("line", Side::Left, "hvdc", 1.0)
            .fail_on_call(1)
    });
    let (result, snapshot) = case.run(&ClarabelBackend, &RaoParameters::default());

    assert_eq!(result.status(), LinearProblemStatus::SensitivityComputationFailed);
    assert_eq!(result.iterations(), 0);
    assert_eq!(hvdc_setpoint(&result), 0.0);
    let activated = result.activation().activated_range_actions(&State::preventive());
    assert!(activated.is_empty());
    assert_eq!(snapshot_setpoint(&snapshot, "hvdc"), 0.0);
}

#[test]
fn test_failed_curative_state_makes_candidate_worse() {
    let perimeter = OptimizationPerimeter::builder(PerimeterKind::Preventive, State::preventive())
        .cnec(line("line", State::preventive(), 100.0))
        .cnec(line("line-co1", curative(), 10_000.0))
        .range_action(State::preventive(), hvdc("hvdc"))
        .build()
        .unwrap();
    let engine = LinearSensitivityEngine::new()
        .with_flow("line", Side::Left, 120.0)
        .with_flow("line-co1", Side::Left, 0.0)
        .with_sensitivity("line", Side::Left, "hvdc", 1.0)
        .fail_state_on_call(1, curative());
    let case = Case::new(perimeter, engine);
    let (result, snapshot) = case.run(&ClarabelBackend, &RaoParameters::default());

    // the overcost outweighs the margin gain, so the seed is kept
    assert_eq!(result.status(), LinearProblemStatus::Optimal);
    assert_eq!(result.iterations(), 0);
    assert_eq!(hvdc_setpoint(&result), 0.0);
    assert_eq!(result.cost_history().len(), 1);
    assert_eq!(snapshot_setpoint(&snapshot, "hvdc"), 0.0);
}

#[test]
fn test_grouped_hvdcs_end_on_same_setpoint() {
    let perimeter = OptimizationPerimeter::builder(PerimeterKind::Preventive, State::preventive())
        .cnec(line("line", State::preventive(), 100.0))
        .range_action(State::preventive(), hvdc("h1").with_group("g"))
        .range_action(State::preventive(), hvdc("h2").with_group("g"))
        .build()
        .unwrap();
    let engine = LinearSensitivityEngine::new()
        .with_flow("line", Side::Left, 120.0)
        .with_sensitivity("line", Side::Left, "h1", 1.0)
        .with_sensitivity("line", Side::Left, "h2", 0.5);
    let case = Case::new(perimeter, engine);
    let (result, _) = case.run(&ClarabelBackend, &RaoParameters::default());

    let h1 = result
        .activation()
        .optimized_setpoint(&RangeActionId::new("h1"), &State::preventive());
    let h2 = result
        .activation()
        .optimized_setpoint(&RangeActionId::new("h2"), &State::preventive());
    assert!((h1 - h2).abs() < 1e-9);
    assert!((h1 + 50.0).abs() < TOL);
    // 120 - 1.5 * 50 = 45 MW
    assert!((result.functional_cost() + 55.0).abs() < TOL);
}

fn pst_case(flow: f64) -> Case {
    let pst = RangeAction::pst("pst", TapTable::linear(-16, 16, 0.5).unwrap(), 0).unwrap();
    let perimeter = OptimizationPerimeter::builder(PerimeterKind::Preventive, State::preventive())
        .cnec(line("line", State::preventive(), 100.0))
        .range_action(State::preventive(), pst)
        .build()
        .unwrap();
    let engine = LinearSensitivityEngine::new()
        .with_flow("line", Side::Left, flow)
        .with_sensitivity("line", Side::Left, "pst", -20.0);
    Case::new(perimeter, engine)
}

fn pst_tap(case: &Case, result: &LinearOptimizationResult) -> Option<i32> {
    let pst = case.perimeter.range_action(&RangeActionId::new("pst")).unwrap();
    result.activation().optimized_tap(pst, &State::preventive())
}

#[test]
fn test_pst_lands_on_tap() {
    let case = pst_case(120.0);
    let (result, _) = case.run(&ClarabelBackend, &RaoParameters::default());

    assert_eq!(pst_tap(&case, &result), Some(12));
    let angle = result
        .activation()
        .optimized_setpoint(&RangeActionId::new("pst"), &State::preventive());
    assert_eq!(angle, 6.0);
    assert!((result.functional_cost() + 100.0).abs() < TOL);
}

#[test]
fn test_approximated_integers_resolves_on_rounded_tap() {
    let case = pst_case(113.0);
    let params = RaoParameters {
        range_actions: gat_rao::parameters::RangeActionParameters {
            pst_model: PstModel::ApproximatedIntegers,
            ..Default::default()
        },
        ..Default::default()
    };
    let (result, _) = case.run(&ClarabelBackend, &params);

    // the LP aims at 5.65 degrees; tap 12 would only bring 93 MW of margin
    // against 97 MW at tap 11
    assert_eq!(pst_tap(&case, &result), Some(11));
    let angle = result
        .activation()
        .optimized_setpoint(&RangeActionId::new("pst"), &State::preventive());
    assert!((angle - 5.5).abs() < 1e-9);
    assert!((result.functional_cost() + 97.0).abs() < TOL);
}

#[test]
fn test_mnec_limits_relief() {
    let perimeter = OptimizationPerimeter::builder(PerimeterKind::Preventive, State::preventive())
        .cnec(line("line", State::preventive(), 100.0))
        .cnec(
            FlowCnec::builder("mnec", State::preventive())
                .threshold(BranchThreshold::symmetric(Side::Left, Unit::Megawatt, 100.0))
                .optimized(false)
                .monitored(true)
                .build()
                .unwrap(),
        )
        .range_action(State::preventive(), hvdc("hvdc"))
        .build()
        .unwrap();
    let engine = LinearSensitivityEngine::new()
        .with_flow("line", Side::Left, 120.0)
        .with_flow("mnec", Side::Left, 90.0)
        .with_sensitivity("line", Side::Left, "hvdc", 1.0)
        .with_sensitivity("mnec", Side::Left, "hvdc", -1.0);
    let case = Case::new(perimeter, engine);
    let params = RaoParameters {
        mnec: Some(MnecParameters {
            acceptable_margin_decrease: 20.0,
            ..Default::default()
        }),
        ..Default::default()
    };
    let (result, _) = case.run(&ClarabelBackend, &params);

    // the mnec may lose 20 MW of margin: 90 -> 110 MW
    assert!((hvdc_setpoint(&result) + 20.0).abs() < TOL);
    assert!(result.functional_cost().abs() < TOL);
    assert!(result.virtual_cost("mnec-cost") < 1e-2);
}

/// 120 MW on a ±100 MW line whose loop flow is limited to 50 MW, with
/// 130 MW of commercial flow before the perimeter and 100 MW initially.
fn loop_flow_case() -> (Case, FlowResult) {
    let line = FlowCnec::builder("line", State::preventive())
        .threshold(BranchThreshold::symmetric(Side::Left, Unit::Megawatt, 100.0))
        .loop_flow_threshold(50.0, Unit::Megawatt)
        .build()
        .unwrap();
    let perimeter = OptimizationPerimeter::builder(PerimeterKind::Preventive, State::preventive())
        .cnec(line)
        .range_action(State::preventive(), hvdc("hvdc"))
        .build()
        .unwrap();
    let engine = LinearSensitivityEngine::new()
        .with_flow("line", Side::Left, 120.0)
        .with_sensitivity("line", Side::Left, "hvdc", 1.0)
        .with_commercial_flow("line", Side::Left, 130.0);
    let case = Case::new(perimeter, engine);
    let mut initial = case.flows.clone();
    initial.set_commercial_flow(&CnecId::new("line"), Side::Left, 100.0);
    (case, initial)
}

#[test]
fn test_loop_flow_limits_relief() {
    let (case, initial) = loop_flow_case();
    let params = RaoParameters {
        loop_flow: Some(LoopFlowParameters {
            violation_cost: 10.0,
            ..Default::default()
        }),
        ..Default::default()
    };
    let (result, snapshot) = case.run_from(&ClarabelBackend, &params, &initial);

    // loop flow F - 130 may not go below -50, so F stays at 80 MW or more
    assert_eq!(result.status(), LinearProblemStatus::Optimal);
    assert!((hvdc_setpoint(&result) + 40.0).abs() < TOL);
    assert!((snapshot_setpoint(&snapshot, "hvdc") + 40.0).abs() < TOL);
    assert!((result.functional_cost() + 20.0).abs() < TOL);
    assert!(result.virtual_cost("loop-flow-cost") < 1e-2);
    let commercial = result.flow_result().commercial_flow(&CnecId::new("line"), Side::Left);
    assert!((commercial - 130.0).abs() < 1e-9);
}

#[test]
fn test_loop_flow_violation_priced_below_margin_gain() {
    let (case, initial) = loop_flow_case();
    let params = RaoParameters {
        loop_flow: Some(LoopFlowParameters {
            violation_cost: 0.5,
            ..Default::default()
        }),
        ..Default::default()
    };
    let (result, _) = case.run_from(&ClarabelBackend, &params, &initial);

    // each MW of margin is worth more than its loop-flow price
    assert!((hvdc_setpoint(&result) + 50.0).abs() < TOL);
    assert!((result.functional_cost() + 30.0).abs() < TOL);
    assert!((result.virtual_cost("loop-flow-cost") - 5.0).abs() < 1e-2);
}

/// Two ±100 MW lines pulled in opposite directions by one HVDC: `a` at
/// 60 MW with a PTDF sum of 0.5, `b` at 20 MW with a PTDF sum of 0.2.
fn relative_case() -> Case {
    let perimeter = OptimizationPerimeter::builder(PerimeterKind::Preventive, State::preventive())
        .cnec(line("a", State::preventive(), 100.0))
        .cnec(line("b", State::preventive(), 100.0))
        .range_action(State::preventive(), hvdc("hvdc"))
        .build()
        .unwrap();
    let engine = LinearSensitivityEngine::new()
        .with_flow("a", Side::Left, 60.0)
        .with_flow("b", Side::Left, 20.0)
        .with_sensitivity("a", Side::Left, "hvdc", 1.0)
        .with_sensitivity("b", Side::Left, "hvdc", -1.0)
        .with_ptdf_zonal_sum("a", Side::Left, 0.5)
        .with_ptdf_zonal_sum("b", Side::Left, 0.2);
    Case::new(perimeter, engine)
}

#[test]
fn test_relative_margins_balance_ptdf_sums() {
    let case = relative_case();
    let (absolute, _) = case.run(&ClarabelBackend, &RaoParameters::default());
    // margins 40 - h and 80 + h
    assert!((hvdc_setpoint(&absolute) + 20.0).abs() < TOL);
    assert!((absolute.functional_cost() + 60.0).abs() < TOL);

    let params = RaoParameters {
        relative_margins: true,
        ..Default::default()
    };
    let (relative, _) = case.run(&ClarabelBackend, &params);
    // relative margins (40 - h) / 0.5 and (80 + h) / 0.2 meet at h = -320 / 7
    let h = -320.0 / 7.0;
    assert_eq!(relative.status(), LinearProblemStatus::Optimal);
    assert_eq!(relative.iterations(), 1);
    assert!((hvdc_setpoint(&relative) - h).abs() < TOL);
    assert!((relative.functional_cost() + (40.0 - h) / 0.5).abs() < 1e-3);
    assert!((relative.cost_history()[0] + 80.0).abs() < TOL);
}

#[test]
fn test_negative_margin_penalised_then_relative_margin_maximised() {
    let perimeter = hvdc_case().perimeter;
    let engine = LinearSensitivityEngine::new()
        .with_flow("line", Side::Left, 120.0)
        .with_sensitivity("line", Side::Left, "hvdc", 1.0)
        .with_ptdf_zonal_sum("line", Side::Left, 0.5);
    let case = Case::new(perimeter, engine);
    let params = RaoParameters {
        relative_margins: true,
        relative_margin: RelativeMarginParameters {
            negative_relative_margin_cost: 10.0,
            ..Default::default()
        },
        ..Default::default()
    };
    let (result, _) = case.run(&ClarabelBackend, &params);

    // seed: margin -20 plus 10 * 20 / 0.5 of penalty
    assert!((result.cost_history()[0] - 420.0).abs() < TOL);
    assert!((hvdc_setpoint(&result) + 50.0).abs() < TOL);
    // margin 30 over a PTDF sum of 0.5
    assert!((result.functional_cost() + 60.0).abs() < TOL);
    assert_eq!(result.virtual_cost("relative-margin-cost"), 0.0);
    assert_eq!(result.status(), LinearProblemStatus::Optimal);
}
