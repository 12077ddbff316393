use gat_rao::{PstModel, RaoError, RaoParameters};
use gat_crac::Unit;
use std::io::Write;

#[test]
fn test_load_partial_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
max_iterations = 4
objective_unit = "ampere"
relative_margins = true

[range_actions]
pst_model = "approximated_integers"

[tap_rounding]
relative_improvement_threshold = 0.2

[mnec]
acceptable_margin_decrease = 30.0
"#
    )
    .unwrap();

    let params = RaoParameters::load(file.path()).unwrap();
    assert_eq!(params.max_iterations, 4);
    assert_eq!(params.objective_unit, Unit::Ampere);
    assert!(params.relative_margins);
    assert_eq!(params.range_actions.pst_model, PstModel::ApproximatedIntegers);
    assert!((params.tap_rounding.relative_improvement_threshold - 0.2).abs() < 1e-12);
    assert!((params.tap_rounding.neighbor_search_min_distance - 0.15).abs() < 1e-12);
    let mnec = params.mnec.unwrap();
    assert!((mnec.acceptable_margin_decrease - 30.0).abs() < 1e-12);
    assert!((mnec.violation_cost - 10.0).abs() < 1e-12);
    assert!(params.loop_flow.is_none());
    assert!((params.sensitivity_failure_overcost - 10_000.0).abs() < 1e-12);
}

#[test]
fn test_written_parameters_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rao.toml");
    let params = RaoParameters {
        max_iterations: 3,
        ..Default::default()
    };
    std::fs::write(&path, params.to_toml_string().unwrap()).unwrap();
    assert_eq!(RaoParameters::load(&path).unwrap(), params);
}

#[test]
fn test_invalid_values_are_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "max_iterations = 0").unwrap();
    assert!(matches!(RaoParameters::load(file.path()), Err(RaoError::Config(_))));
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = RaoParameters::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, RaoError::ConfigIo { .. }));
}
