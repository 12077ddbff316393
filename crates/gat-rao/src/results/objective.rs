use gat_crac::CnecId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cost breakdown of one evaluated network situation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveFunctionResult {
    functional_cost: f64,
    virtual_costs: BTreeMap<String, f64>,
    /// Optimised CNECs, margin ascending then id
    limiting_elements: Vec<CnecId>,
    costly_elements: BTreeMap<String, Vec<CnecId>>,
}

impl ObjectiveFunctionResult {
    pub fn new(functional_cost: f64, limiting_elements: Vec<CnecId>) -> Self {
        Self {
            functional_cost,
            limiting_elements,
            ..Self::default()
        }
    }

    pub fn add_virtual_cost(
        &mut self,
        name: impl Into<String>,
        cost: f64,
        costly_elements: Vec<CnecId>,
    ) {
        let name = name.into();
        self.virtual_costs.insert(name.clone(), cost);
        self.costly_elements.insert(name, costly_elements);
    }

    pub fn functional_cost(&self) -> f64 {
        self.functional_cost
    }

    pub fn virtual_cost(&self, name: &str) -> f64 {
        self.virtual_costs.get(name).copied().unwrap_or(0.0)
    }

    pub fn total_virtual_cost(&self) -> f64 {
        self.virtual_costs.values().sum()
    }

    pub fn virtual_costs(&self) -> &BTreeMap<String, f64> {
        &self.virtual_costs
    }

    pub fn cost(&self) -> f64 {
        self.functional_cost + self.total_virtual_cost()
    }

    /// The `n` optimised CNECs with the smallest margins.
    pub fn most_limiting_elements(&self, n: usize) -> &[CnecId] {
        &self.limiting_elements[..n.min(self.limiting_elements.len())]
    }

    pub fn costly_elements(&self, name: &str, n: usize) -> &[CnecId] {
        self.costly_elements
            .get(name)
            .map(|elements| &elements[..n.min(elements.len())])
            .unwrap_or(&[])
    }
}
