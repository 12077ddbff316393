use gat_crac::{CnecId, FlowCnec, Side, Unit};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
struct SideFlow {
    mw: f64,
    amperes: Option<f64>,
    commercial_mw: Option<f64>,
    ptdf_zonal_sum: Option<f64>,
}

/// Flows of every CNEC side, as computed for one network situation.
///
/// Flows are stored in MW; ampere flows are kept when the engine provides
/// them and derived from the nominal voltage otherwise. Unknown entries read
/// as zero: the sensitivity computer only hands out complete results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowResult {
    flows: HashMap<CnecId, BTreeMap<Side, SideFlow>>,
}

impl FlowResult {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, cnec: &CnecId, side: Side) -> &mut SideFlow {
        self.flows
            .entry(cnec.clone())
            .or_default()
            .entry(side)
            .or_default()
    }

    fn get(&self, cnec: &CnecId, side: Side) -> Option<&SideFlow> {
        self.flows.get(cnec).and_then(|sides| sides.get(&side))
    }

    pub fn set_flow(&mut self, cnec: &CnecId, side: Side, mw: f64) -> &mut Self {
        self.entry(cnec, side).mw = mw;
        self
    }

    pub fn set_flow_amperes(&mut self, cnec: &CnecId, side: Side, amperes: f64) -> &mut Self {
        self.entry(cnec, side).amperes = Some(amperes);
        self
    }

    pub fn set_commercial_flow(&mut self, cnec: &CnecId, side: Side, mw: f64) -> &mut Self {
        self.entry(cnec, side).commercial_mw = Some(mw);
        self
    }

    pub fn set_ptdf_zonal_sum(&mut self, cnec: &CnecId, side: Side, value: f64) -> &mut Self {
        self.entry(cnec, side).ptdf_zonal_sum = Some(value);
        self
    }

    pub fn contains(&self, cnec: &CnecId, side: Side) -> bool {
        self.get(cnec, side).is_some()
    }

    pub fn flow(&self, cnec: &FlowCnec, side: Side, unit: Unit) -> f64 {
        let Some(entry) = self.get(cnec.id(), side) else {
            return 0.0;
        };
        match unit {
            Unit::Ampere => entry.amperes.unwrap_or_else(|| {
                let factor = cnec
                    .unit_multiplier(side, Unit::Megawatt, Unit::Ampere)
                    .unwrap_or(1.0);
                entry.mw * factor
            }),
            _ => entry.mw,
        }
    }

    /// Worst margin over the monitored sides of `cnec`.
    pub fn margin(&self, cnec: &FlowCnec, unit: Unit) -> f64 {
        cnec.monitored_sides()
            .into_iter()
            .map(|side| self.side_margin(cnec, side, unit))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn side_margin(&self, cnec: &FlowCnec, side: Side, unit: Unit) -> f64 {
        cnec.compute_margin(self.flow(cnec, side, unit), side, unit)
    }

    /// Margin divided by the PTDF zonal sum when positive, plain margin
    /// otherwise.
    pub fn relative_margin(&self, cnec: &FlowCnec, unit: Unit, ptdf_floor: f64) -> f64 {
        cnec.monitored_sides()
            .into_iter()
            .map(|side| self.relative_side_margin(cnec, side, unit, ptdf_floor))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn relative_side_margin(
        &self,
        cnec: &FlowCnec,
        side: Side,
        unit: Unit,
        ptdf_floor: f64,
    ) -> f64 {
        let margin = self.side_margin(cnec, side, unit);
        if margin > 0.0 {
            margin / self.ptdf_zonal_sum(cnec.id(), side).max(ptdf_floor)
        } else {
            margin
        }
    }

    pub fn commercial_flow(&self, cnec: &CnecId, side: Side) -> f64 {
        self.get(cnec, side)
            .and_then(|e| e.commercial_mw)
            .unwrap_or(0.0)
    }

    pub fn has_commercial_flow(&self, cnec: &CnecId, side: Side) -> bool {
        self.get(cnec, side).is_some_and(|e| e.commercial_mw.is_some())
    }

    /// Part of the MW flow not explained by commercial exchanges.
    pub fn loop_flow(&self, cnec: &FlowCnec, side: Side) -> f64 {
        self.flow(cnec, side, Unit::Megawatt) - self.commercial_flow(cnec.id(), side)
    }

    pub fn ptdf_zonal_sum(&self, cnec: &CnecId, side: Side) -> f64 {
        self.get(cnec, side)
            .and_then(|e| e.ptdf_zonal_sum)
            .unwrap_or(0.0)
    }

    pub fn has_ptdf_zonal_sum(&self, cnec: &CnecId, side: Side) -> bool {
        self.get(cnec, side).is_some_and(|e| e.ptdf_zonal_sum.is_some())
    }

    /// Overwrites commercial flows with those of `reference`.
    pub fn carry_commercial_flows_from(&mut self, reference: &FlowResult) {
        for (cnec, sides) in &reference.flows {
            for (side, flow) in sides {
                if let Some(mw) = flow.commercial_mw {
                    self.entry(cnec, *side).commercial_mw = Some(mw);
                }
            }
        }
    }

    /// Copies the commercial flows of `reference` where none is set.
    pub fn fill_commercial_flows_from(&mut self, reference: &FlowResult) {
        for (cnec, sides) in &reference.flows {
            for (side, flow) in sides {
                if let Some(mw) = flow.commercial_mw {
                    let entry = self.entry(cnec, *side);
                    entry.commercial_mw.get_or_insert(mw);
                }
            }
        }
    }

    /// Overwrites PTDF zonal sums with those of `reference`.
    pub fn carry_ptdf_sums_from(&mut self, reference: &FlowResult) {
        for (cnec, sides) in &reference.flows {
            for (side, flow) in sides {
                if let Some(sum) = flow.ptdf_zonal_sum {
                    self.entry(cnec, *side).ptdf_zonal_sum = Some(sum);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gat_crac::{BranchThreshold, State};

    fn cnec() -> FlowCnec {
        FlowCnec::builder("cnec", State::preventive())
            .threshold(BranchThreshold::symmetric(Side::Left, Unit::Megawatt, 1000.0))
            .threshold(BranchThreshold::new(Side::Right, Unit::Megawatt, None, Some(800.0)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_margin_takes_worst_side() {
        let cnec = cnec();
        let mut flows = FlowResult::new();
        flows
            .set_flow(cnec.id(), Side::Left, 700.0)
            .set_flow(cnec.id(), Side::Right, 690.0);
        assert!((flows.margin(&cnec, Unit::Megawatt) - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_ampere_flow_derived_from_mw() {
        let cnec = cnec();
        let mut flows = FlowResult::new();
        flows.set_flow(cnec.id(), Side::Left, 1000.0);
        assert!((flows.flow(&cnec, Side::Left, Unit::Ampere) - 1443.375).abs() < 1e-3);
        flows.set_flow_amperes(cnec.id(), Side::Left, 1500.0);
        assert!((flows.flow(&cnec, Side::Left, Unit::Ampere) - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn test_relative_margin_and_loop_flow() {
        let cnec = cnec();
        let mut flows = FlowResult::new();
        flows
            .set_flow(cnec.id(), Side::Left, 500.0)
            .set_flow(cnec.id(), Side::Right, 500.0)
            .set_ptdf_zonal_sum(cnec.id(), Side::Left, 0.5)
            .set_ptdf_zonal_sum(cnec.id(), Side::Right, 0.001)
            .set_commercial_flow(cnec.id(), Side::Left, 200.0);
        // left: 500 / 0.5 = 1000, right: 300 / max(0.001, 0.01) = 30000
        assert!((flows.relative_margin(&cnec, Unit::Megawatt, 0.01) - 1000.0).abs() < 1e-6);
        assert!((flows.loop_flow(&cnec, Side::Left) - 300.0).abs() < 1e-9);
        assert!((flows.loop_flow(&cnec, Side::Right) - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_carry_fixed_values() {
        let cnec = cnec();
        let mut initial = FlowResult::new();
        initial
            .set_flow(cnec.id(), Side::Left, 10.0)
            .set_commercial_flow(cnec.id(), Side::Left, 4.0)
            .set_ptdf_zonal_sum(cnec.id(), Side::Left, 0.3);
        let mut fresh = FlowResult::new();
        fresh.set_flow(cnec.id(), Side::Left, 20.0);
        fresh.carry_commercial_flows_from(&initial);
        fresh.carry_ptdf_sums_from(&initial);
        assert!((fresh.commercial_flow(cnec.id(), Side::Left) - 4.0).abs() < 1e-12);
        assert!((fresh.ptdf_zonal_sum(cnec.id(), Side::Left) - 0.3).abs() < 1e-12);
        assert!((fresh.flow(&cnec, Side::Left, Unit::Megawatt) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_fill_commercial_flows_keeps_existing_values() {
        let cnec = cnec();
        let mut initial = FlowResult::new();
        initial
            .set_commercial_flow(cnec.id(), Side::Left, 4.0)
            .set_commercial_flow(cnec.id(), Side::Right, 6.0);
        let mut pre_optim = FlowResult::new();
        pre_optim
            .set_flow(cnec.id(), Side::Left, 20.0)
            .set_commercial_flow(cnec.id(), Side::Left, 9.0);
        pre_optim.fill_commercial_flows_from(&initial);
        assert!((pre_optim.commercial_flow(cnec.id(), Side::Left) - 9.0).abs() < 1e-12);
        assert!((pre_optim.commercial_flow(cnec.id(), Side::Right) - 6.0).abs() < 1e-12);
        assert!((pre_optim.flow(&cnec, Side::Left, Unit::Megawatt) - 20.0).abs() < 1e-12);
    }
}
