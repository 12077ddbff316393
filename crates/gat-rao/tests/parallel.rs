#![cfg(feature = "solver-clarabel")]

use gat_crac::{
    BranchThreshold, FlowCnec, OptimizationPerimeter, PerimeterKind, RangeAction, RangeActionId,
    RangeType, Side, StandardRange, State, Unit,
};
use gat_rao::test_utils::LinearSensitivityEngine;
use gat_rao::{
    optimize_perimeters, ClarabelBackend, LinearProblemStatus, NetworkSnapshot, OptimizerInput,
    PerimeterJob, RangeActionSetpointResult, RaoParameters,
};

fn perimeter(limit: f64) -> OptimizationPerimeter {
    let cnec = FlowCnec::builder("line", State::preventive())
        .threshold(BranchThreshold::symmetric(Side::Left, Unit::Megawatt, limit))
        .build()
        .unwrap();
    let hvdc = RangeAction::hvdc("hvdc", 0.0).with_range(StandardRange {
        range_type: RangeType::Absolute,
        min: -50.0,
        max: 50.0,
    });
    OptimizationPerimeter::builder(PerimeterKind::Preventive, State::preventive())
        .cnec(cnec)
        .range_action(State::preventive(), hvdc)
        .build()
        .unwrap()
}

#[test]
fn test_outcomes_follow_job_order() {
    let params = RaoParameters::default();
    // second perimeter: 130 MW on ±100, the optimum sits inside the range
    let cases: Vec<(OptimizationPerimeter, LinearSensitivityEngine)> = vec![
        (
            perimeter(100.0),
            LinearSensitivityEngine::new()
                .with_flow("line", Side::Left, 120.0)
                .with_sensitivity("line", Side::Left, "hvdc", 1.0),
        ),
        (
            perimeter(100.0),
            LinearSensitivityEngine::new()
                .with_flow("line", Side::Left, 30.0)
                .with_sensitivity("line", Side::Left, "hvdc", 1.0),
        ),
    ];
    let initial: Vec<_> = cases
        .iter()
        .map(|(perimeter, engine)| engine.initial_results(perimeter))
        .collect();

    let jobs: Vec<PerimeterJob<'_>> = cases
        .iter()
        .zip(&initial)
        .map(|((perimeter, engine), (flows, sensitivities))| PerimeterJob {
            input: OptimizerInput {
                perimeter,
                pre_perimeter_setpoints: RangeActionSetpointResult::from_initial(
                    perimeter.range_actions(),
                ),
                pre_optim_flow_result: flows,
                pre_optim_sensitivity_result: sensitivities,
                initial_flow_result: flows,
                engine,
                backend: &ClarabelBackend,
            },
            snapshot: NetworkSnapshot::from_perimeter(perimeter),
        })
        .collect();

    let outcomes = optimize_perimeters(jobs, &params);
    assert_eq!(outcomes.len(), 2);

    let hvdc = RangeActionId::new("hvdc");
    let first = outcomes[0].result.as_ref().unwrap();
    let second = outcomes[1].result.as_ref().unwrap();
    let preventive = State::preventive();
    assert!((first.activation().optimized_setpoint(&hvdc, &preventive) + 50.0).abs() < 1e-4);
    assert!((second.activation().optimized_setpoint(&hvdc, &preventive) + 30.0).abs() < 1e-4);
    assert_eq!(first.status(), LinearProblemStatus::Optimal);
    assert!((outcomes[1].snapshot.effective_setpoint(&hvdc, &preventive) + 30.0).abs() < 1e-4);
}
