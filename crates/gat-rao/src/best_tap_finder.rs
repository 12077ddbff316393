//! Rounding of continuous PST angles onto taps.
//!
//! For every PST the LP target sits between two taps: the closest one and
//! its neighbour in the direction of the target. Margins at both taps are
//! predicted with the sensitivities already computed, and the farther tap is
//! kept as a candidate only when it improves the worst margin by more than
//! the configured relative threshold. Grouped PSTs then agree on the tap
//! maximising the minimum of their members' predicted margins.

use crate::arena::ScratchArena;
use crate::error::{RaoError, RaoResult};
use crate::parameters::TapRoundingParameters;
use crate::results::{FlowResult, RangeActionActivationResult, SensitivityResult};
use crate::sensitivity::NetworkSnapshot;
use gat_crac::{
    CracError, FlowCnec, GroupId, OptimizationPerimeter, RangeAction, RangeActionId, State,
    TapTable, Unit,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Margin of a tap that was not evaluated because it is the only candidate.
pub const UNEVALUATED_MARGIN: f64 = f64::MAX;

/// Admissibility slack on tap angles
const ANGLE_TOLERANCE: f64 = 1e-6;

/// Linearisation data the predicted margins are computed from
#[derive(Debug, Clone, Copy)]
pub struct RoundingContext<'a> {
    pub snapshot: &'a NetworkSnapshot,
    pub flow_result: &'a FlowResult,
    pub sensitivity_result: &'a SensitivityResult,
}

pub struct BestTapFinder<'a> {
    perimeter: &'a OptimizationPerimeter,
    params: &'a TapRoundingParameters,
    unit: Unit,
}

impl<'a> BestTapFinder<'a> {
    pub fn new(
        perimeter: &'a OptimizationPerimeter,
        params: &'a TapRoundingParameters,
        unit: Unit,
    ) -> Self {
        Self {
            perimeter,
            params,
            unit,
        }
    }

    /// Replaces the setpoint of every PST of `candidate` by the angle of its
    /// chosen tap; other range actions pass through unchanged.
    pub fn round(
        &self,
        candidate: &RangeActionActivationResult,
        ctx: &RoundingContext<'_>,
        arena: &mut ScratchArena,
    ) -> RaoResult<RangeActionActivationResult> {
        arena.reset();
        let arena = &*arena;
        let mut rounded = candidate.clone();

        for state in self.perimeter.range_action_states() {
            let mut margins_per_pst =
                arena.alloc_hashmap::<&RangeActionId, (&RangeAction, BTreeMap<i32, f64>)>();
            for ra in self.perimeter.range_actions_on(state) {
                if !ra.is_discrete() {
                    continue;
                }
                let mut cnecs = arena.alloc_vec::<&FlowCnec>();
                cnecs.extend(self.affected_cnecs(ra, state));
                let bounds = ra.admissible_range(self.previous_setpoint(ra, state, &rounded))?;
                let margins = self.min_margins_for_best_taps(
                    ra,
                    candidate.optimized_setpoint(ra.id(), state),
                    ctx.snapshot.effective_setpoint(ra.id(), state),
                    bounds,
                    &cnecs,
                    ctx,
                )?;
                margins_per_pst.insert(ra.id(), (ra, margins));
            }

            let mut groups = arena.alloc_hashmap::<&GroupId, _>();
            for (ra, margins) in margins_per_pst.values() {
                match ra.group_id() {
                    Some(group) => groups
                        .entry(group)
                        .or_insert_with(|| arena.alloc_vec::<&RangeAction>())
                        .push(*ra),
                    None => {
                        if let Some(tap) = best_tap(margins) {
                            rounded.activate(ra.id(), state, ra.tap_to_setpoint(tap)?);
                        }
                    }
                }
            }

            for (group, members) in &groups {
                let ranked = rank_group_taps(
                    members
                        .iter()
                        .filter_map(|ra| margins_per_pst.get(ra.id()).map(|(_, m)| m)),
                );
                let mut chosen = None;
                for (tap, _) in ranked {
                    if self.admissible_for_all(members, tap, state, &rounded)? {
                        chosen = Some(tap);
                        break;
                    }
                }
                let tap = match chosen {
                    Some(tap) => tap,
                    None => self.nearest_common_tap(group, members, state, candidate, &rounded)?,
                };
                for ra in members {
                    rounded.activate(ra.id(), state, ra.tap_to_setpoint(tap)?);
                }
            }
        }
        Ok(rounded)
    }

    /// Worst predicted margin at the closest tap and, when worth it, at the
    /// neighbouring one.
    ///
    /// Returns `{closest: UNEVALUATED_MARGIN}` when the target sits close to
    /// the closest tap or when the neighbour does not improve the worst
    /// margin enough.
    pub fn min_margins_for_best_taps(
        &self,
        ra: &RangeAction,
        target: f64,
        current_setpoint: f64,
        (min, max): (f64, f64),
        cnecs: &[&FlowCnec],
        ctx: &RoundingContext<'_>,
    ) -> RaoResult<BTreeMap<i32, f64>> {
        let Some(table) = ra.tap_table() else {
            return Ok(BTreeMap::new());
        };
        let admissible =
            |angle: f64| angle >= min - ANGLE_TOLERANCE && angle <= max + ANGLE_TOLERANCE;

        let closest = table.angle_to_tap(target);
        let closest_angle = table.tap_to_angle(closest)?;
        let other = neighbour_towards(table, closest, closest_angle, target)
            .filter(|(_, a)| admissible(*a));

        if !admissible(closest_angle) {
            let tap = other.map_or(closest, |(tap, _)| tap);
            return Ok(BTreeMap::from([(tap, UNEVALUATED_MARGIN)]));
        }
        let Some((other_tap, other_angle)) = other else {
            return Ok(BTreeMap::from([(closest, UNEVALUATED_MARGIN)]));
        };

        let distance = (closest_angle - target).abs() / (other_angle - closest_angle).abs();
        if distance < self.params.neighbor_search_min_distance {
            return Ok(BTreeMap::from([(closest, UNEVALUATED_MARGIN)]));
        }

        let closest_margin =
            self.predicted_min_margin(ra, closest_angle, current_setpoint, cnecs, ctx);
        let other_margin = self.predicted_min_margin(ra, other_angle, current_setpoint, cnecs, ctx);
        let improvement = self.params.relative_improvement_threshold * closest_margin.abs();
        if other_margin > closest_margin + improvement {
            Ok(BTreeMap::from([(closest, closest_margin), (other_tap, other_margin)]))
        } else {
            Ok(BTreeMap::from([(closest, UNEVALUATED_MARGIN)]))
        }
    }

    /// Worst margin over `cnecs` with `ra` moved from `current_setpoint` to
    /// `angle`, using linear sensitivities.
    fn predicted_min_margin(
        &self,
        ra: &RangeAction,
        angle: f64,
        current_setpoint: f64,
        cnecs: &[&FlowCnec],
        ctx: &RoundingContext<'_>,
    ) -> f64 {
        let shift = angle - current_setpoint;
        cnecs
            .iter()
            .flat_map(|cnec| cnec.monitored_sides().into_iter().map(move |side| (*cnec, side)))
            .map(|(cnec, side)| {
                let flow = ctx.flow_result.flow(cnec, side, self.unit)
                    + ctx.sensitivity_result.sensitivity(cnec, side, ra.id(), self.unit) * shift;
                cnec.compute_margin(flow, side, self.unit)
            })
            .fold(f64::INFINITY, f64::min)
    }

    /// Optimised CNECs whose flow depends on the setpoint of `ra` on `state`.
    fn affected_cnecs<'p>(
        &'p self,
        ra: &'p RangeAction,
        state: &'p State,
    ) -> impl Iterator<Item = &'a FlowCnec> + 'p {
        self.perimeter.optimized_cnecs().filter(move |cnec| {
            self.perimeter.latest_state_of(ra.id(), cnec.state()) == Some(state)
        })
    }

    fn previous_setpoint(
        &self,
        ra: &RangeAction,
        state: &State,
        activation: &RangeActionActivationResult,
    ) -> f64 {
        match self.perimeter.previous_state_of(ra.id(), state) {
            Some(prev) => activation.optimized_setpoint(ra.id(), prev),
            None => activation
                .pre_perimeter()
                .setpoint(ra.id())
                .unwrap_or_else(|| ra.initial_setpoint()),
        }
    }

    /// Tap admissible for every member of `group` that is closest to the
    /// members' mean target.
    fn nearest_common_tap(
        &self,
        group: &GroupId,
        members: &[&RangeAction],
        state: &State,
        candidate: &RangeActionActivationResult,
        activation: &RangeActionActivationResult,
    ) -> RaoResult<i32> {
        let inconsistent = |reason: &str| {
            RaoError::Crac(CracError::InconsistentGroup {
                group: group.to_string(),
                reason: reason.to_string(),
            })
        };
        let Some(table) = members.first().and_then(|ra| ra.tap_table()) else {
            return Err(inconsistent("group has no PST member"));
        };
        let target = members
            .iter()
            .map(|ra| candidate.optimized_setpoint(ra.id(), state))
            .sum::<f64>()
            / members.len() as f64;

        let mut best: Option<(i32, f64)> = None;
        for (tap, angle) in table.taps() {
            if !self.admissible_for_all(members, tap, state, activation)? {
                continue;
            }
            let distance = (angle - target).abs();
            if best.map_or(true, |(_, d)| distance < d - ANGLE_TOLERANCE) {
                best = Some((tap, distance));
            }
        }
        match best {
            Some((tap, _)) => {
                debug!(
                    "Group {group}: no evaluated tap is admissible for every member, tap {tap} used"
                );
                Ok(tap)
            }
            None => Err(inconsistent(&format!("no tap is admissible for every member on {state}"))),
        }
    }

    fn admissible_for_all(
        &self,
        members: &[&RangeAction],
        tap: i32,
        state: &State,
        activation: &RangeActionActivationResult,
    ) -> RaoResult<bool> {
        for ra in members {
            let Some(table) = ra.tap_table() else {
                return Ok(false);
            };
            let Ok(angle) = table.tap_to_angle(tap) else {
                return Ok(false);
            };
            let (min, max) = ra.admissible_range(self.previous_setpoint(ra, state, activation))?;
            if angle < min - ANGLE_TOLERANCE || angle > max + ANGLE_TOLERANCE {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Tap next to `closest` on the side of `target`, with its angle.
fn neighbour_towards(
    table: &TapTable,
    closest: i32,
    closest_angle: f64,
    target: f64,
) -> Option<(i32, f64)> {
    let direction = target - closest_angle;
    if direction == 0.0 {
        return None;
    }
    [closest - 1, closest + 1]
        .into_iter()
        .filter_map(|tap| table.tap_to_angle(tap).ok().map(|angle| (tap, angle)))
        .find(|(_, angle)| (angle - closest_angle).signum() == direction.signum())
}

/// Higher margin first, then smaller absolute tap.
fn compare_candidates(a: &(i32, f64), b: &(i32, f64)) -> Ordering {
    b.1.total_cmp(&a.1)
        .then_with(|| a.0.abs().cmp(&b.0.abs()))
        .then_with(|| a.0.cmp(&b.0))
}

/// Tap with the highest margin; ties go to the smaller absolute tap.
pub fn best_tap(margins: &BTreeMap<i32, f64>) -> Option<i32> {
    margins
        .iter()
        .map(|(tap, margin)| (*tap, *margin))
        .min_by(compare_candidates)
        .map(|(tap, _)| tap)
}

/// Candidate taps of a group, best first. The score of a tap is the minimum
/// margin over the members that evaluated it.
pub fn rank_group_taps<'m>(
    members: impl IntoIterator<Item = &'m BTreeMap<i32, f64>>,
) -> Vec<(i32, f64)> {
    let mut per_tap: BTreeMap<i32, f64> = BTreeMap::new();
    for margins in members {
        for (tap, margin) in margins {
            per_tap
                .entry(*tap)
                .and_modify(|m| *m = m.min(*margin))
                .or_insert(*margin);
        }
    }
    let mut ranked: Vec<(i32, f64)> = per_tap.into_iter().collect();
    ranked.sort_by(compare_candidates);
    ranked
}
