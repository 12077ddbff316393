//! Optimisation perimeter: the scope of one optimiser run.
//!
//! A perimeter holds one main state, the CNECs whose flows are evaluated and
//! the range actions available on each optimised state. Preventive and
//! curative perimeters optimise a single state; global perimeters also
//! optimise range actions of states downstream of the main one.
//!
//! The perimeter is immutable once built. [`PerimeterBuilder::build`] is the
//! only place where malformed scopes are rejected.

use crate::range_action::validate_group;
use crate::{CnecId, CracError, CracResult, FlowCnec, GroupId, RangeAction, RangeActionId, State};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerimeterKind {
    Preventive,
    Curative,
    Global,
}

#[derive(Debug, Clone)]
pub struct OptimizationPerimeter {
    kind: PerimeterKind,
    main_state: State,
    flow_cnecs: Vec<FlowCnec>,
    range_actions: BTreeMap<RangeActionId, RangeAction>,
    range_actions_per_state: BTreeMap<State, Vec<RangeActionId>>,
}

impl OptimizationPerimeter {
    pub fn builder(kind: PerimeterKind, main_state: State) -> PerimeterBuilder {
        PerimeterBuilder {
            kind,
            main_state,
            flow_cnecs: Vec::new(),
            range_actions: BTreeMap::new(),
            range_actions_per_state: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> PerimeterKind {
        self.kind
    }

    pub fn main_state(&self) -> &State {
        &self.main_state
    }

    /// All CNECs, sorted by id.
    pub fn flow_cnecs(&self) -> &[FlowCnec] {
        &self.flow_cnecs
    }

    pub fn cnec(&self, id: &CnecId) -> Option<&FlowCnec> {
        self.flow_cnecs.iter().find(|c| c.id() == id)
    }

    pub fn optimized_cnecs(&self) -> impl Iterator<Item = &FlowCnec> {
        self.flow_cnecs.iter().filter(|c| c.is_optimized())
    }

    pub fn monitored_cnecs(&self) -> impl Iterator<Item = &FlowCnec> {
        self.flow_cnecs.iter().filter(|c| c.is_monitored())
    }

    pub fn loop_flow_cnecs(&self) -> impl Iterator<Item = &FlowCnec> {
        self.flow_cnecs
            .iter()
            .filter(|c| c.loop_flow_threshold().is_some())
    }

    pub fn range_action(&self, id: &RangeActionId) -> Option<&RangeAction> {
        self.range_actions.get(id)
    }

    /// Every range action of the perimeter, sorted by id.
    pub fn range_actions(&self) -> impl Iterator<Item = &RangeAction> {
        self.range_actions.values()
    }

    pub fn range_actions_per_state(&self) -> &BTreeMap<State, Vec<RangeActionId>> {
        &self.range_actions_per_state
    }

    /// Optimised states, in state order.
    pub fn range_action_states(&self) -> impl Iterator<Item = &State> {
        self.range_actions_per_state.keys()
    }

    /// Range actions available on `state`, sorted by id.
    pub fn range_actions_on<'a>(&'a self, state: &State) -> impl Iterator<Item = &'a RangeAction> {
        self.range_actions_per_state
            .get(state)
            .into_iter()
            .flatten()
            .filter_map(|id| self.range_actions.get(id))
    }

    /// (state, range action) pairs in state then id order.
    pub fn state_range_actions(&self) -> impl Iterator<Item = (&State, &RangeAction)> {
        self.range_actions_per_state.iter().flat_map(move |(state, ids)| {
            ids.iter()
                .filter_map(move |id| self.range_actions.get(id).map(|ra| (state, ra)))
        })
    }

    /// Latest optimised state where `ra` is available and whose setpoint is
    /// still in force on `target`.
    pub fn latest_state_of(&self, ra: &RangeActionId, target: &State) -> Option<&State> {
        self.range_actions_per_state
            .iter()
            .rev()
            .find(|(state, ids)| state.is_upstream_of(target) && ids.contains(ra))
            .map(|(state, _)| state)
    }

    /// Latest optimised state strictly before `state` where `ra` is available.
    pub fn previous_state_of(&self, ra: &RangeActionId, state: &State) -> Option<&State> {
        self.range_actions_per_state
            .iter()
            .rev()
            .find(|(s, ids)| *s != state && s.is_upstream_of(state) && ids.contains(ra))
            .map(|(s, _)| s)
    }

    /// Members of each group available on `state`.
    pub fn groups_on(&self, state: &State) -> BTreeMap<GroupId, Vec<&RangeAction>> {
        let mut groups: BTreeMap<GroupId, Vec<&RangeAction>> = BTreeMap::new();
        for ra in self.range_actions_on(state) {
            if let Some(group) = ra.group_id() {
                groups.entry(group.clone()).or_default().push(ra);
            }
        }
        groups
    }
}

#[derive(Debug, Clone)]
pub struct PerimeterBuilder {
    kind: PerimeterKind,
    main_state: State,
    flow_cnecs: Vec<FlowCnec>,
    range_actions: BTreeMap<RangeActionId, RangeAction>,
    range_actions_per_state: BTreeMap<State, BTreeSet<RangeActionId>>,
}

impl PerimeterBuilder {
    pub fn cnec(mut self, cnec: FlowCnec) -> Self {
        self.flow_cnecs.push(cnec);
        self
    }

    pub fn cnecs(mut self, cnecs: impl IntoIterator<Item = FlowCnec>) -> Self {
        self.flow_cnecs.extend(cnecs);
        self
    }

    /// Makes `ra` available on `state`. The same range action may be
    /// registered on several states of a global perimeter.
    pub fn range_action(mut self, state: State, ra: RangeAction) -> Self {
        self.range_actions_per_state
            .entry(state)
            .or_default()
            .insert(ra.id().clone());
        self.range_actions.insert(ra.id().clone(), ra);
        self
    }

    /// Declares an optimised state without attaching any range action yet.
    pub fn state(mut self, state: State) -> Self {
        self.range_actions_per_state.entry(state).or_default();
        self
    }

    pub fn build(self) -> CracResult<OptimizationPerimeter> {
        let PerimeterBuilder {
            kind,
            main_state,
            mut flow_cnecs,
            range_actions,
            mut range_actions_per_state,
        } = self;

        match kind {
            PerimeterKind::Preventive if !main_state.is_preventive() => {
                return Err(CracError::InvalidPerimeter(format!(
                    "preventive perimeter on post-contingency state {main_state}"
                )))
            }
            PerimeterKind::Curative if main_state.is_preventive() => {
                return Err(CracError::InvalidPerimeter(
                    "curative perimeter on the preventive state".into(),
                ))
            }
            _ => {}
        }

        range_actions_per_state.entry(main_state.clone()).or_default();

        let main_has_ras = range_actions_per_state
            .get(&main_state)
            .is_some_and(|ids| !ids.is_empty());
        if !main_has_ras && flow_cnecs.is_empty() {
            return Err(CracError::InvalidPerimeter(format!(
                "main state {main_state} has neither range actions nor cnecs"
            )));
        }

        for state in range_actions_per_state.keys() {
            let allowed = match kind {
                PerimeterKind::Global => main_state.is_upstream_of(state),
                _ => *state == main_state,
            };
            if !allowed {
                return Err(CracError::InvalidPerimeter(format!(
                    "state {state} cannot be optimised in a {kind:?} perimeter on {main_state}"
                )));
            }
        }

        let mut seen = BTreeSet::new();
        for cnec in &flow_cnecs {
            if !seen.insert(cnec.id().clone()) {
                return Err(CracError::InvalidPerimeter(format!(
                    "duplicate cnec {}",
                    cnec.id()
                )));
            }
            if !main_state.is_upstream_of(cnec.state()) {
                return Err(CracError::InvalidPerimeter(format!(
                    "cnec {} on state {} is not reachable from {main_state}",
                    cnec.id(),
                    cnec.state()
                )));
            }
        }
        flow_cnecs.sort_by(|a, b| a.id().cmp(b.id()));

        for ra in range_actions.values() {
            ra.validate()?;
        }

        let range_actions_per_state: BTreeMap<State, Vec<RangeActionId>> = range_actions_per_state
            .into_iter()
            .map(|(state, ids)| (state, ids.into_iter().collect()))
            .collect();

        let perimeter = OptimizationPerimeter {
            kind,
            main_state,
            flow_cnecs,
            range_actions,
            range_actions_per_state,
        };
        for state in perimeter.range_action_states() {
            for (group, members) in perimeter.groups_on(state) {
                validate_group(&group, &members)?;
            }
        }
        Ok(perimeter)
    }
}
