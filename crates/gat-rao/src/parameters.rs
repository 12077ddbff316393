//! Tunable parameters of the iterating linear optimiser.
//!
//! Every field has a default, so partial TOML files are accepted:
//!
//! ```toml
//! max_iterations = 5
//! objective_unit = "ampere"
//!
//! [range_actions]
//! pst_model = "approximated_integers"
//!
//! [mnec]
//! acceptable_margin_decrease = 30.0
//! ```

use crate::error::{RaoError, RaoResult};
use gat_crac::{RangeActionKind, Unit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// How PST setpoints are handled by the linear problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PstModel {
    /// Angles are continuous; taps are only recovered by rounding
    #[default]
    Continuous,
    /// After rounding, the problem is solved again with PSTs locked on their
    /// rounded taps
    ApproximatedIntegers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaoParameters {
    /// Maximum number of LP solves per run
    pub max_iterations: usize,
    /// Megawatt or Ampere
    pub objective_unit: Unit,
    /// Maximise the worst relative margin instead of the absolute one
    pub relative_margins: bool,
    /// Operators whose CNECs count in the worst margin only once their
    /// margin drops below the pre-perimeter one
    pub operators_not_to_optimize: BTreeSet<String>,
    pub range_actions: RangeActionParameters,
    pub tap_rounding: TapRoundingParameters,
    /// MNEC constraints and cost; disabled when absent
    pub mnec: Option<MnecParameters>,
    /// Loop-flow constraints and cost; disabled when absent
    pub loop_flow: Option<LoopFlowParameters>,
    pub relative_margin: RelativeMarginParameters,
    /// Cost added when the sensitivity computation failed on some state
    pub sensitivity_failure_overcost: f64,
}

impl Default for RaoParameters {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            objective_unit: Unit::Megawatt,
            relative_margins: false,
            operators_not_to_optimize: BTreeSet::new(),
            range_actions: RangeActionParameters::default(),
            tap_rounding: TapRoundingParameters::default(),
            mnec: None,
            loop_flow: None,
            relative_margin: RelativeMarginParameters::default(),
            sensitivity_failure_overcost: 10000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeActionParameters {
    pub pst_model: PstModel,
    /// Objective cost per degree of PST variation
    pub pst_penalty_cost: f64,
    /// Objective cost per MW of HVDC variation
    pub hvdc_penalty_cost: f64,
    /// Objective cost per MW of injection variation
    pub injection_penalty_cost: f64,
    /// Sensitivities below these absolute values are left out of the LP
    pub pst_sensitivity_threshold: f64,
    pub hvdc_sensitivity_threshold: f64,
    pub injection_sensitivity_threshold: f64,
}

impl Default for RangeActionParameters {
    fn default() -> Self {
        Self {
            pst_model: PstModel::Continuous,
            pst_penalty_cost: 0.01,
            hvdc_penalty_cost: 0.001,
            injection_penalty_cost: 0.001,
            pst_sensitivity_threshold: 0.0,
            hvdc_sensitivity_threshold: 0.0,
            injection_sensitivity_threshold: 0.0,
        }
    }
}

impl RangeActionParameters {
    pub fn penalty_cost(&self, kind: &RangeActionKind) -> f64 {
        match kind {
            RangeActionKind::Pst(_) => self.pst_penalty_cost,
            RangeActionKind::Hvdc => self.hvdc_penalty_cost,
            RangeActionKind::Injection => self.injection_penalty_cost,
        }
    }

    pub fn sensitivity_threshold(&self, kind: &RangeActionKind) -> f64 {
        match kind {
            RangeActionKind::Pst(_) => self.pst_sensitivity_threshold,
            RangeActionKind::Hvdc => self.hvdc_sensitivity_threshold,
            RangeActionKind::Injection => self.injection_sensitivity_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapRoundingParameters {
    /// Relative gain on the worst margin needed to prefer the farther tap
    pub relative_improvement_threshold: f64,
    /// Fraction of the tap step under which the LP target sits on the
    /// closest tap and no neighbour is evaluated
    pub neighbor_search_min_distance: f64,
}

impl Default for TapRoundingParameters {
    fn default() -> Self {
        Self {
            relative_improvement_threshold: 0.10,
            neighbor_search_min_distance: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MnecParameters {
    /// MW the MNEC margin may lose relative to the initial situation
    pub acceptable_margin_decrease: f64,
    /// Cost per MW of violation
    pub violation_cost: f64,
    /// MW by which LP constraints are tightened
    pub constraint_adjustment_coefficient: f64,
}

impl Default for MnecParameters {
    fn default() -> Self {
        Self {
            acceptable_margin_decrease: 50.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopFlowParameters {
    /// MW the loop flow may grow above the initial one
    pub acceptable_increase: f64,
    /// Cost per MW of excess loop flow
    pub violation_cost: f64,
    pub constraint_adjustment_coefficient: f64,
    /// Recompute commercial flows after each range action change instead of
    /// keeping the initial ones
    pub update_commercial_flows_with_pst_change: bool,
}

impl Default for LoopFlowParameters {
    fn default() -> Self {
        Self {
            acceptable_increase: 0.0,
            violation_cost: 0.0,
            constraint_adjustment_coefficient: 0.0,
            update_commercial_flows_with_pst_change: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelativeMarginParameters {
    /// Floor applied to PTDF zonal sums before dividing by them
    pub ptdf_sum_lower_bound: f64,
    /// Virtual cost per unit of negative margin, scaled by the PTDF sum
    pub negative_relative_margin_cost: f64,
}

impl Default for RelativeMarginParameters {
    fn default() -> Self {
        Self {
            ptdf_sum_lower_bound: 0.01,
            negative_relative_margin_cost: 0.0,
        }
    }
}

impl RaoParameters {
    pub fn from_toml_str(contents: &str) -> RaoResult<Self> {
        let params: Self = toml::from_str(contents)?;
        params.validate()?;
        Ok(params)
    }

    pub fn load(path: impl AsRef<Path>) -> RaoResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| RaoError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> RaoResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Whether PTDF zonal sums must be requested from the sensitivity engine.
    pub fn needs_ptdf_sums(&self) -> bool {
        self.relative_margins
    }

    /// Whether commercial flows must be requested from the sensitivity engine.
    pub fn needs_commercial_flows(&self) -> bool {
        self.loop_flow.is_some()
    }

    pub fn validate(&self) -> RaoResult<()> {
        if self.max_iterations == 0 {
            return Err(RaoError::Config("max_iterations must be at least 1".into()));
        }
        if !self.objective_unit.is_flow_unit() {
            return Err(RaoError::Config(format!(
                "objective_unit must be megawatt or ampere, got {}",
                self.objective_unit
            )));
        }
        let ra = &self.range_actions;
        check_non_negative("range_actions.pst_penalty_cost", ra.pst_penalty_cost)?;
        check_non_negative("range_actions.hvdc_penalty_cost", ra.hvdc_penalty_cost)?;
        check_non_negative("range_actions.injection_penalty_cost", ra.injection_penalty_cost)?;
        check_non_negative(
            "range_actions.pst_sensitivity_threshold",
            ra.pst_sensitivity_threshold,
        )?;
        check_non_negative(
            "range_actions.hvdc_sensitivity_threshold",
            ra.hvdc_sensitivity_threshold,
        )?;
        check_non_negative(
            "range_actions.injection_sensitivity_threshold",
            ra.injection_sensitivity_threshold,
        )?;
        check_fraction(
            "tap_rounding.relative_improvement_threshold",
            self.tap_rounding.relative_improvement_threshold,
        )?;
        check_fraction(
            "tap_rounding.neighbor_search_min_distance",
            self.tap_rounding.neighbor_search_min_distance,
        )?;
        if let Some(mnec) = &self.mnec {
            check_non_negative(
                "mnec.acceptable_margin_decrease",
                mnec.acceptable_margin_decrease,
            )?;
            check_non_negative("mnec.violation_cost", mnec.violation_cost)?;
            check_non_negative(
                "mnec.constraint_adjustment_coefficient",
                mnec.constraint_adjustment_coefficient,
            )?;
        }
        if let Some(lf) = &self.loop_flow {
            check_non_negative("loop_flow.acceptable_increase", lf.acceptable_increase)?;
            check_non_negative("loop_flow.violation_cost", lf.violation_cost)?;
            check_non_negative(
                "loop_flow.constraint_adjustment_coefficient",
                lf.constraint_adjustment_coefficient,
            )?;
        }
        if !(self.relative_margin.ptdf_sum_lower_bound > 0.0) {
            return Err(RaoError::Config(
                "relative_margin.ptdf_sum_lower_bound must be positive".into(),
            ));
        }
        check_non_negative(
            "relative_margin.negative_relative_margin_cost",
            self.relative_margin.negative_relative_margin_cost,
        )?;
        check_non_negative("sensitivity_failure_overcost", self.sensitivity_failure_overcost)?;
        Ok(())
    }
}

fn check_non_negative(name: &str, value: f64) -> RaoResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RaoError::Config(format!(
            "{name} must be a non-negative number, got {value}"
        )))
    }
}

fn check_fraction(name: &str, value: f64) -> RaoResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(RaoError::Config(format!("{name} must lie in [0, 1], got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = RaoParameters::default();
        assert_eq!(params.max_iterations, 10);
        assert_eq!(params.objective_unit, Unit::Megawatt);
        assert_eq!(params.range_actions.pst_model, PstModel::Continuous);
        assert!((params.range_actions.pst_penalty_cost - 0.01).abs() < 1e-12);
        assert!((params.tap_rounding.relative_improvement_threshold - 0.10).abs() < 1e-12);
        assert!(params.mnec.is_none());
        assert!(params.operators_not_to_optimize.is_empty());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let params = RaoParameters::from_toml_str(
            r#"
            max_iterations = 3
            objective_unit = "ampere"
            operators_not_to_optimize = ["FR", "BE"]

            [range_actions]
            pst_model = "approximated_integers"

            [mnec]
            violation_cost = 25.0
            "#,
        )
        .unwrap();
        assert_eq!(params.max_iterations, 3);
        assert_eq!(params.objective_unit, Unit::Ampere);
        assert_eq!(params.range_actions.pst_model, PstModel::ApproximatedIntegers);
        assert!((params.range_actions.hvdc_penalty_cost - 0.001).abs() < 1e-12);
        let mnec = params.mnec.unwrap();
        assert!((mnec.violation_cost - 25.0).abs() < 1e-12);
        assert!((mnec.acceptable_margin_decrease - 50.0).abs() < 1e-12);
        assert!(params.loop_flow.is_none());
        assert!(params.operators_not_to_optimize.contains("BE"));
        assert_eq!(params.operators_not_to_optimize.len(), 2);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(RaoParameters::from_toml_str("max_iterations = 0").is_err());
        assert!(RaoParameters::from_toml_str("objective_unit = \"tap\"").is_err());
        let threshold = "[tap_rounding]\nrelative_improvement_threshold = 1.5";
        assert!(RaoParameters::from_toml_str(threshold).is_err());
        let floor = "[relative_margin]\nptdf_sum_lower_bound = 0.0";
        assert!(RaoParameters::from_toml_str(floor).is_err());
        assert!(RaoParameters::from_toml_str("[loop_flow]\nviolation_cost = -1.0").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut params = RaoParameters::default();
        params.loop_flow = Some(LoopFlowParameters::default());
        let text = params.to_toml_string().unwrap();
        assert_eq!(RaoParameters::from_toml_str(&text).unwrap(), params);
    }

    #[test]
    fn test_penalty_lookup() {
        let table = gat_crac::TapTable::linear(-1, 1, 1.0).unwrap();
        let ra = RangeActionParameters::default();
        assert!((ra.penalty_cost(&RangeActionKind::Pst(table)) - 0.01).abs() < 1e-12);
        assert!((ra.penalty_cost(&RangeActionKind::Hvdc) - 0.001).abs() < 1e-12);
    }
}
