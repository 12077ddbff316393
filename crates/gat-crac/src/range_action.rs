//! Range actions: PSTs, HVDC lines and injections with a bounded setpoint.
//!
//! Setpoints are angles (degrees) for PSTs and MW for HVDC and injections.
//! A PST additionally carries a [`TapTable`] mapping its discrete tap
//! positions to angles, so any admissible angle range is also a tap range.
//!
//! Ranges come in three flavours ([`RangeType`]), all intersected to give
//! the admissible domain:
//!
//! ```text
//!   Absolute                  [min, max]
//!   RelativeToInitialNetwork  [initial + min, initial + max]
//!   RelativeToPreviousInstant [previous + min, previous + max]
//! ```

use crate::{CracError, CracResult, GroupId, RangeActionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Strictly monotonic tap → angle table of a PST
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapTable {
    taps: BTreeMap<i32, f64>,
}

impl TapTable {
    pub fn new(entries: impl IntoIterator<Item = (i32, f64)>) -> CracResult<Self> {
        let taps: BTreeMap<i32, f64> = entries.into_iter().collect();
        if taps.is_empty() {
            return Err(CracError::InvalidTapTable("table is empty".into()));
        }
        if taps.values().any(|a| !a.is_finite()) {
            return Err(CracError::InvalidTapTable("angles must be finite".into()));
        }
        let angles: Vec<f64> = taps.values().copied().collect();
        let increasing = angles.windows(2).all(|w| w[1] > w[0]);
        let decreasing = angles.windows(2).all(|w| w[1] < w[0]);
        if !increasing && !decreasing {
            return Err(CracError::InvalidTapTable(
                "angles must be strictly monotonic in tap".into(),
            ));
        }
        Ok(Self { taps })
    }

    /// Evenly spaced table, `step` degrees per tap.
    pub fn linear(min_tap: i32, max_tap: i32, step: f64) -> CracResult<Self> {
        Self::new((min_tap..=max_tap).map(|tap| (tap, tap as f64 * step)))
    }

    pub fn min_tap(&self) -> i32 {
        self.taps.keys().next().copied().unwrap_or_default()
    }

    pub fn max_tap(&self) -> i32 {
        self.taps.keys().next_back().copied().unwrap_or_default()
    }

    pub fn taps(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.taps.iter().map(|(t, a)| (*t, *a))
    }

    pub fn tap_to_angle(&self, tap: i32) -> CracResult<f64> {
        self.taps
            .get(&tap)
            .copied()
            .ok_or(CracError::TapOutOfRange {
                tap,
                min: self.min_tap(),
                max: self.max_tap(),
            })
    }

    /// Closest tap to `angle`; equidistant taps resolve to the smaller |tap|.
    pub fn angle_to_tap(&self, angle: f64) -> i32 {
        let mut best = (self.min_tap(), f64::INFINITY);
        for (tap, a) in self.taps() {
            let distance = (a - angle).abs();
            let closer = distance < best.1 - 1e-9;
            let tie = (distance - best.1).abs() <= 1e-9 && tap.abs() < best.0.abs();
            if closer || tie {
                best = (tap, distance);
            }
        }
        best.0
    }

    fn angle_span(&self, min_tap: i32, max_tap: i32) -> Option<(f64, f64)> {
        let a = self.taps.get(&min_tap)?;
        let b = self.taps.get(&max_tap)?;
        Some((a.min(*b), a.max(*b)))
    }

    pub fn min_angle(&self) -> f64 {
        self.taps.values().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max_angle(&self) -> f64 {
        self.taps.values().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Reference a range is expressed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeType {
    Absolute,
    RelativeToInitialNetwork,
    RelativeToPreviousInstant,
}

/// Setpoint range (degrees for PSTs, MW otherwise)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardRange {
    pub range_type: RangeType,
    pub min: f64,
    pub max: f64,
}

/// Tap range of a PST
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapRange {
    pub range_type: RangeType,
    pub min_tap: i32,
    pub max_tap: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Range {
    Standard(StandardRange),
    Tap(TapRange),
}

/// Physical device behind a range action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeActionKind {
    Pst(TapTable),
    Hvdc,
    Injection,
}

impl RangeActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            RangeActionKind::Pst(_) => "pst",
            RangeActionKind::Hvdc => "hvdc",
            RangeActionKind::Injection => "injection",
        }
    }

    fn same_variant(&self, other: &RangeActionKind) -> bool {
        self.label() == other.label()
    }
}

/// Continuous control with a bounded setpoint domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeAction {
    id: RangeActionId,
    name: String,
    #[serde(default)]
    network_elements: Vec<String>,
    #[serde(default)]
    group_id: Option<GroupId>,
    initial_setpoint: f64,
    kind: RangeActionKind,
    ranges: Vec<Range>,
}

impl RangeAction {
    pub fn pst(id: impl Into<String>, table: TapTable, initial_tap: i32) -> CracResult<Self> {
        let initial_setpoint = table.tap_to_angle(initial_tap)?;
        Ok(Self::with_kind(id, RangeActionKind::Pst(table), initial_setpoint))
    }

    pub fn hvdc(id: impl Into<String>, initial_setpoint: f64) -> Self {
        Self::with_kind(id, RangeActionKind::Hvdc, initial_setpoint)
    }

    pub fn injection(id: impl Into<String>, initial_setpoint: f64) -> Self {
        Self::with_kind(id, RangeActionKind::Injection, initial_setpoint)
    }

    fn with_kind(id: impl Into<String>, kind: RangeActionKind, initial_setpoint: f64) -> Self {
        let id = id.into();
        Self {
            id: RangeActionId::new(id.clone()),
            name: id.clone(),
            network_elements: vec![id],
            group_id: None,
            initial_setpoint,
            kind,
            ranges: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_network_elements(
        mut self,
        elements: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.network_elements = elements.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group_id = Some(GroupId::new(group));
        self
    }

    pub fn with_range(mut self, range: StandardRange) -> Self {
        self.ranges.push(Range::Standard(range));
        self
    }

    /// Only meaningful for PSTs; checked by [`RangeAction::validate`].
    pub fn with_tap_range(mut self, range: TapRange) -> Self {
        self.ranges.push(Range::Tap(range));
        self
    }

    pub fn id(&self) -> &RangeActionId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network_elements(&self) -> &[String] {
        &self.network_elements
    }

    pub fn group_id(&self) -> Option<&GroupId> {
        self.group_id.as_ref()
    }

    pub fn kind(&self) -> &RangeActionKind {
        &self.kind
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn initial_setpoint(&self) -> f64 {
        self.initial_setpoint
    }

    pub fn tap_table(&self) -> Option<&TapTable> {
        match &self.kind {
            RangeActionKind::Pst(table) => Some(table),
            _ => None,
        }
    }

    pub fn is_discrete(&self) -> bool {
        self.tap_table().is_some()
    }

    /// Tap closest to a PST angle; `None` for continuous devices.
    pub fn setpoint_to_tap(&self, setpoint: f64) -> Option<i32> {
        self.tap_table().map(|t| t.angle_to_tap(setpoint))
    }

    /// Angle of a PST tap. Fails for continuous devices and unknown taps.
    pub fn tap_to_setpoint(&self, tap: i32) -> CracResult<f64> {
        match self.tap_table() {
            Some(table) => table.tap_to_angle(tap),
            None => Err(CracError::Validation(format!(
                "range action {} has no tap table",
                self.id
            ))),
        }
    }

    fn tap_bounds(&self, table: &TapTable, previous_setpoint: f64) -> (i32, i32) {
        let initial_tap = table.angle_to_tap(self.initial_setpoint);
        let previous_tap = table.angle_to_tap(previous_setpoint);
        let mut lo = table.min_tap();
        let mut hi = table.max_tap();
        for range in &self.ranges {
            if let Range::Tap(r) = range {
                let offset = match r.range_type {
                    RangeType::Absolute => 0,
                    RangeType::RelativeToInitialNetwork => initial_tap,
                    RangeType::RelativeToPreviousInstant => previous_tap,
                };
                lo = lo.max(offset + r.min_tap);
                hi = hi.min(offset + r.max_tap);
            }
        }
        (lo, hi)
    }

    /// Intersection of every range, given the setpoint in force at the
    /// previous instant. May be empty (`min > max`) for inconsistent data.
    fn raw_admissible_range(&self, previous_setpoint: f64) -> (f64, f64) {
        let mut lo = f64::NEG_INFINITY;
        let mut hi = f64::INFINITY;
        if let Some(table) = self.tap_table() {
            let (min_tap, max_tap) = self.tap_bounds(table, previous_setpoint);
            match table.angle_span(min_tap, max_tap) {
                Some((a, b)) if min_tap <= max_tap => {
                    lo = a;
                    hi = b;
                }
                _ => return (f64::INFINITY, f64::NEG_INFINITY),
            }
        }
        for range in &self.ranges {
            if let Range::Standard(r) = range {
                let offset = match r.range_type {
                    RangeType::Absolute => 0.0,
                    RangeType::RelativeToInitialNetwork => self.initial_setpoint,
                    RangeType::RelativeToPreviousInstant => previous_setpoint,
                };
                lo = lo.max(offset + r.min);
                hi = hi.min(offset + r.max);
            }
        }
        (lo, hi)
    }

    pub fn min_admissible_setpoint(&self, previous_setpoint: f64) -> f64 {
        self.raw_admissible_range(previous_setpoint).0
    }

    pub fn max_admissible_setpoint(&self, previous_setpoint: f64) -> f64 {
        self.raw_admissible_range(previous_setpoint).1
    }

    /// Admissible `[min, max]`, failing when the ranges do not intersect.
    pub fn admissible_range(&self, previous_setpoint: f64) -> CracResult<(f64, f64)> {
        let (lo, hi) = self.raw_admissible_range(previous_setpoint);
        if lo > hi + 1e-9 || !lo.is_finite() || !hi.is_finite() {
            return Err(CracError::Validation(format!(
                "range action {} has no admissible setpoint (ranges give [{}, {}])",
                self.id, lo, hi
            )));
        }
        Ok((lo, hi))
    }

    /// Structural checks on the ranges. The initial setpoint itself may lie
    /// outside the admissible domain.
    pub fn validate(&self) -> CracResult<()> {
        for range in &self.ranges {
            match range {
                Range::Tap(_) if !self.is_discrete() => {
                    return Err(CracError::Validation(format!(
                        "range action {}: tap range on a {} device",
                        self.id,
                        self.kind.label()
                    )))
                }
                Range::Tap(r) if r.min_tap > r.max_tap => {
                    return Err(CracError::Validation(format!(
                        "range action {}: tap range [{}, {}] is inverted",
                        self.id, r.min_tap, r.max_tap
                    )))
                }
                Range::Standard(r) if r.min > r.max => {
                    return Err(CracError::Validation(format!(
                        "range action {}: range [{}, {}] is inverted",
                        self.id, r.min, r.max
                    )))
                }
                _ => {}
            }
        }
        self.admissible_range(self.initial_setpoint)?;
        Ok(())
    }
}

impl fmt::Display for RangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.kind.label())
    }
}

/// Checks that the members of one group can share a setpoint: same kind,
/// identical tap tables for PSTs and intersecting admissible ranges.
pub fn validate_group(group: &GroupId, members: &[&RangeAction]) -> CracResult<()> {
    let Some(first) = members.first() else {
        return Ok(());
    };
    let mut lo = f64::NEG_INFINITY;
    let mut hi = f64::INFINITY;
    for ra in members {
        if !ra.kind.same_variant(&first.kind) {
            return Err(CracError::InconsistentGroup {
                group: group.to_string(),
                reason: format!(
                    "{} is a {} while {} is a {}",
                    ra.id,
                    ra.kind.label(),
                    first.id,
                    first.kind.label()
                ),
            });
        }
        if ra.tap_table() != first.tap_table() {
            return Err(CracError::InconsistentGroup {
                group: group.to_string(),
                reason: format!("{} and {} have different tap tables", ra.id, first.id),
            });
        }
        let (a, b) = ra.admissible_range(ra.initial_setpoint)?;
        lo = lo.max(a);
        hi = hi.min(b);
    }
    if lo > hi + 1e-9 {
        return Err(CracError::InconsistentGroup {
            group: group.to_string(),
            reason: format!("admissible ranges do not intersect ([{lo}, {hi}])"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TapTable {
        TapTable::new([(-2, -2.5), (-1, -0.75), (0, 0.0), (1, 0.75), (2, 2.5)]).unwrap()
    }

    #[test]
    fn test_tap_table_validation() {
        assert!(TapTable::new(Vec::<(i32, f64)>::new()).is_err());
        assert!(TapTable::new([(0, 0.0), (1, 1.0), (2, 0.5)]).is_err());
        assert!(TapTable::new([(0, 1.0), (1, 0.0)]).is_ok());
    }

    #[test]
    fn test_tap_conversion() {
        let t = table();
        assert_eq!(t.tap_to_angle(2).unwrap(), 2.5);
        assert!(matches!(t.tap_to_angle(3), Err(CracError::TapOutOfRange { tap: 3, .. })));
        assert_eq!(t.angle_to_tap(0.8), 1);
        assert_eq!(t.angle_to_tap(1.7), 2);
        assert_eq!(t.angle_to_tap(-10.0), -2);
        for (tap, angle) in t.taps() {
            assert_eq!(t.angle_to_tap(angle), tap);
        }
    }

    #[test]
    fn test_tap_tie_prefers_smaller_magnitude() {
        let t = TapTable::linear(-3, 3, 1.0).unwrap();
        assert_eq!(t.angle_to_tap(0.5), 0);
        assert_eq!(t.angle_to_tap(-0.5), 0);
    }

    #[test]
    fn test_pst_admissible_range() {
        let pst = RangeAction::pst("pst", table(), 0)
            .unwrap()
            .with_tap_range(TapRange {
                range_type: RangeType::Absolute,
                min_tap: -1,
                max_tap: 5,
            })
            .with_tap_range(TapRange {
                range_type: RangeType::RelativeToPreviousInstant,
                min_tap: -3,
                max_tap: 1,
            });
        assert_eq!(pst.admissible_range(0.0).unwrap(), (-0.75, 0.75));
        // previous at tap 1: relative range allows [-2, 2], absolute [-1, 2]
        assert_eq!(pst.admissible_range(0.75).unwrap(), (-0.75, 2.5));
        assert!(pst.validate().is_ok());
    }

    #[test]
    fn test_standard_ranges() {
        let hvdc = RangeAction::hvdc("hvdc", 100.0)
            .with_range(StandardRange {
                range_type: RangeType::Absolute,
                min: -1000.0,
                max: 1000.0,
            })
            .with_range(StandardRange {
                range_type: RangeType::RelativeToInitialNetwork,
                min: -200.0,
                max: 300.0,
            });
        assert_eq!(hvdc.min_admissible_setpoint(0.0), -100.0);
        assert_eq!(hvdc.max_admissible_setpoint(0.0), 400.0);
        assert!(hvdc.validate().is_ok());
    }

    #[test]
    fn test_unbounded_or_inconsistent_device() {
        assert!(RangeAction::injection("inj", 0.0).validate().is_err());
        let hvdc = RangeAction::hvdc("hvdc", 0.0).with_tap_range(TapRange {
            range_type: RangeType::Absolute,
            min_tap: -1,
            max_tap: 1,
        });
        assert!(hvdc.validate().is_err());
    }

    #[test]
    fn test_group_validation() {
        let g = GroupId::new("G1");
        let a = RangeAction::pst("a", table(), 0).unwrap().with_tap_range(TapRange {
            range_type: RangeType::Absolute,
            min_tap: -2,
            max_tap: -1,
        });
        let b = RangeAction::pst("b", table(), 0).unwrap().with_tap_range(TapRange {
            range_type: RangeType::Absolute,
            min_tap: 1,
            max_tap: 2,
        });
        let c = RangeAction::hvdc("c", 0.0).with_range(StandardRange {
            range_type: RangeType::Absolute,
            min: -1.0,
            max: 1.0,
        });
        assert!(matches!(
            validate_group(&g, &[&a, &b]),
            Err(CracError::InconsistentGroup { .. })
        ));
        assert!(validate_group(&g, &[&a, &c]).is_err());
        assert!(validate_group(&g, &[&a, &a]).is_ok());
    }
}
