//! Flow CNECs: monitored branches at a given state.
//!
//! A CNEC carries one or more [`BranchThreshold`]s, each bounding the flow on
//! one side of the branch in MW, A or percent of Imax. Thresholds are
//! resolved on demand into the unit the optimiser works in:
//!
//! ```text
//!   margin(flow) = min( upper_bound - flow , flow - lower_bound )
//! ```
//!
//! A side without any threshold in one direction has an infinite bound in that
//! direction, so a CNEC without thresholds has an infinite margin.

use crate::units::{mw_to_a_factor, Amperes, Kilovolts, Unit};
use crate::{CnecId, CracError, CracResult, State};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Extremity of a monitored branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// Signed flow window on one side of a branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchThreshold {
    pub side: Side,
    pub unit: Unit,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl BranchThreshold {
    pub fn new(side: Side, unit: Unit, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            side,
            unit,
            min,
            max,
        }
    }

    /// Symmetric window `[-limit, limit]`.
    pub fn symmetric(side: Side, unit: Unit, limit: f64) -> Self {
        Self::new(side, unit, Some(-limit), Some(limit))
    }
}

/// Electrical data of one branch side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SideData {
    pub nominal_voltage: Kilovolts,
    #[serde(default)]
    pub imax: Option<Amperes>,
}

/// Loop-flow limit of a cross-border CNEC
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopFlowThreshold {
    pub value: f64,
    /// Megawatt or PercentImax
    pub unit: Unit,
}

/// Monitored network element under a given state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowCnec {
    id: CnecId,
    name: String,
    network_element_id: String,
    state: State,
    left: SideData,
    right: SideData,
    thresholds: Vec<BranchThreshold>,
    optimized: bool,
    monitored: bool,
    loop_flow_threshold: Option<LoopFlowThreshold>,
    /// System operator owning the element
    operator: Option<String>,
}

impl FlowCnec {
    pub fn builder(id: impl Into<String>, state: State) -> FlowCnecBuilder {
        FlowCnecBuilder::new(id, state)
    }

    pub fn id(&self) -> &CnecId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network_element_id(&self) -> &str {
        &self.network_element_id
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn thresholds(&self) -> &[BranchThreshold] {
        &self.thresholds
    }

    pub fn is_optimized(&self) -> bool {
        self.optimized
    }

    pub fn is_monitored(&self) -> bool {
        self.monitored
    }

    pub fn loop_flow_threshold(&self) -> Option<&LoopFlowThreshold> {
        self.loop_flow_threshold.as_ref()
    }

    pub fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    fn side_data(&self, side: Side) -> &SideData {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn nominal_voltage(&self, side: Side) -> Kilovolts {
        self.side_data(side).nominal_voltage
    }

    pub fn imax(&self, side: Side) -> Option<Amperes> {
        self.side_data(side).imax
    }

    /// Sides carrying at least one threshold, left first.
    pub fn monitored_sides(&self) -> Vec<Side> {
        let mut sides: Vec<Side> = self.thresholds.iter().map(|t| t.side).collect();
        sides.sort();
        sides.dedup();
        sides
    }

    /// Factor turning a flow in `from` into a flow in `to` on `side`.
    ///
    /// Only MW and A are flow units; any other pair is an error.
    pub fn unit_multiplier(&self, side: Side, from: Unit, to: Unit) -> CracResult<f64> {
        let factor = mw_to_a_factor(self.nominal_voltage(side));
        match (from, to) {
            (a, b) if a == b && a.is_flow_unit() => Ok(1.0),
            (Unit::Megawatt, Unit::Ampere) => Ok(factor),
            (Unit::Ampere, Unit::Megawatt) => Ok(1.0 / factor),
            _ => Err(CracError::UnitConversion {
                from: from.to_string(),
                to: to.to_string(),
                reason: format!("flows of cnec {} are only expressed in MW or A", self.id),
            }),
        }
    }

    /// Converts a threshold value into a flow unit. Validated at build time
    /// so that every declared threshold is convertible.
    fn convert_threshold(&self, value: f64, from: Unit, side: Side, to: Unit) -> f64 {
        let factor = mw_to_a_factor(self.nominal_voltage(side));
        let in_amperes = match from {
            Unit::Megawatt => value * factor,
            Unit::Ampere => value,
            Unit::PercentImax => value / 100.0 * self.imax(side).map(|i| i.value()).unwrap_or(0.0),
            Unit::Degree | Unit::Tap => value,
        };
        match to {
            Unit::Ampere => in_amperes,
            _ => in_amperes / factor,
        }
    }

    /// Most restrictive upper bound on `side`, in `unit`.
    pub fn upper_bound(&self, side: Side, unit: Unit) -> Option<f64> {
        self.thresholds
            .iter()
            .filter(|t| t.side == side)
            .filter_map(|t| t.max.map(|max| self.convert_threshold(max, t.unit, side, unit)))
            .reduce(f64::min)
    }

    /// Most restrictive lower bound on `side`, in `unit`.
    pub fn lower_bound(&self, side: Side, unit: Unit) -> Option<f64> {
        self.thresholds
            .iter()
            .filter(|t| t.side == side)
            .filter_map(|t| t.min.map(|min| self.convert_threshold(min, t.unit, side, unit)))
            .reduce(f64::max)
    }

    /// Distance of `flow` to the closest bound on `side`; negative when violated.
    pub fn compute_margin(&self, flow: f64, side: Side, unit: Unit) -> f64 {
        let upper = self.upper_bound(side, unit).map_or(f64::INFINITY, |ub| ub - flow);
        let lower = self.lower_bound(side, unit).map_or(f64::INFINITY, |lb| flow - lb);
        upper.min(lower)
    }

    /// Largest absolute bound over all sides, in `unit`.
    pub fn highest_threshold(&self, unit: Unit) -> f64 {
        self.monitored_sides()
            .into_iter()
            .flat_map(|side| [self.upper_bound(side, unit), self.lower_bound(side, unit)])
            .flatten()
            .map(f64::abs)
            .fold(0.0, f64::max)
    }

    /// Loop-flow limit in MW on `side`, if the CNEC is loop-flow constrained.
    pub fn loop_flow_threshold_mw(&self, side: Side) -> Option<f64> {
        self.loop_flow_threshold
            .map(|lf| self.convert_threshold(lf.value, lf.unit, side, Unit::Megawatt))
    }
}

impl fmt::Display for FlowCnec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.state)
    }
}

/// Builder for [`FlowCnec`], validating thresholds against the side data
#[derive(Debug, Clone)]
pub struct FlowCnecBuilder {
    cnec: FlowCnec,
}

impl FlowCnecBuilder {
    pub fn new(id: impl Into<String>, state: State) -> Self {
        let id = id.into();
        let side = SideData {
            nominal_voltage: Kilovolts(400.0),
            imax: None,
        };
        Self {
            cnec: FlowCnec {
                id: CnecId::new(id.clone()),
                name: id.clone(),
                network_element_id: id,
                state,
                left: side,
                right: side,
                thresholds: Vec::new(),
                optimized: true,
                monitored: false,
                loop_flow_threshold: None,
                operator: None,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.cnec.name = name.into();
        self
    }

    pub fn network_element(mut self, id: impl Into<String>) -> Self {
        self.cnec.network_element_id = id.into();
        self
    }

    pub fn nominal_voltage(mut self, side: Side, kv: f64) -> Self {
        match side {
            Side::Left => self.cnec.left.nominal_voltage = Kilovolts(kv),
            Side::Right => self.cnec.right.nominal_voltage = Kilovolts(kv),
        }
        self
    }

    pub fn imax(mut self, side: Side, amperes: f64) -> Self {
        match side {
            Side::Left => self.cnec.left.imax = Some(Amperes(amperes)),
            Side::Right => self.cnec.right.imax = Some(Amperes(amperes)),
        }
        self
    }

    pub fn threshold(mut self, threshold: BranchThreshold) -> Self {
        self.cnec.thresholds.push(threshold);
        self
    }

    pub fn optimized(mut self, optimized: bool) -> Self {
        self.cnec.optimized = optimized;
        self
    }

    pub fn monitored(mut self, monitored: bool) -> Self {
        self.cnec.monitored = monitored;
        self
    }

    pub fn loop_flow_threshold(mut self, value: f64, unit: Unit) -> Self {
        self.cnec.loop_flow_threshold = Some(LoopFlowThreshold { value, unit });
        self
    }

    pub fn operator(mut self, operator: impl Into<String>) -> Self {
        self.cnec.operator = Some(operator.into());
        self
    }

    pub fn build(self) -> CracResult<FlowCnec> {
        let cnec = self.cnec;
        for side in [Side::Left, Side::Right] {
            let kv = cnec.nominal_voltage(side).value();
            if !(kv.is_finite() && kv > 0.0) {
                return Err(CracError::Validation(format!(
                    "cnec {}: nominal voltage on {} side must be positive, got {}",
                    cnec.id, side, kv
                )));
            }
        }
        for t in &cnec.thresholds {
            match t.unit {
                Unit::Megawatt | Unit::Ampere => {}
                Unit::PercentImax if cnec.imax(t.side).is_some() => {}
                Unit::PercentImax => {
                    return Err(CracError::Validation(format!(
                        "cnec {}: percent-of-Imax threshold on {} side without Imax",
                        cnec.id, t.side
                    )))
                }
                other => {
                    return Err(CracError::Validation(format!(
                        "cnec {}: threshold unit {} is not a flow unit",
                        cnec.id, other
                    )))
                }
            }
            if let (Some(min), Some(max)) = (t.min, t.max) {
                if min > max {
                    return Err(CracError::Validation(format!(
                        "cnec {}: threshold min {} above max {}",
                        cnec.id, min, max
                    )));
                }
            }
        }
        if let Some(lf) = &cnec.loop_flow_threshold {
            let convertible = match lf.unit {
                Unit::Megawatt => true,
                Unit::PercentImax => {
                    cnec.imax(Side::Left).is_some() && cnec.imax(Side::Right).is_some()
                }
                _ => false,
            };
            if !convertible || lf.value < 0.0 {
                return Err(CracError::Validation(format!(
                    "cnec {}: invalid loop-flow threshold {} {}",
                    cnec.id, lf.value, lf.unit
                )));
            }
        }
        if !cnec.optimized && !cnec.monitored {
            return Err(CracError::Validation(format!(
                "cnec {} is neither optimized nor monitored",
                cnec.id
            )));
        }
        Ok(cnec)
    }
}
