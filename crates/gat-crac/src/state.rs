//! Instants, contingencies and the states they combine into.
//!
//! A [`State`] is the pair `(instant, contingency)`. The preventive state is
//! the only one without a contingency; every later instant is tied to one
//! outage. States sharing a contingency form a chain ordered by instant:
//!
//! ```text
//!   preventive ──► co1 - outage ──► co1 - auto ──► co1 - curative
//!              └─► co2 - outage ──► co2 - curative
//! ```
//!
//! A range action available on a state can influence the flows of every
//! state downstream of it in the same chain.

use crate::ContingencyId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Stage of the grid operation timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstantKind {
    Preventive,
    Outage,
    Auto,
    Curative,
}

/// Named point of the operation timeline with a strict order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instant {
    pub id: String,
    pub kind: InstantKind,
    pub order: u32,
}

impl Instant {
    pub fn new(id: impl Into<String>, kind: InstantKind, order: u32) -> Self {
        Self {
            id: id.into(),
            kind,
            order,
        }
    }

    /// The standard four-instant timeline.
    pub fn preventive() -> Self {
        Self::new("preventive", InstantKind::Preventive, 0)
    }

    pub fn outage() -> Self {
        Self::new("outage", InstantKind::Outage, 1)
    }

    pub fn auto() -> Self {
        Self::new("auto", InstantKind::Auto, 2)
    }

    pub fn curative() -> Self {
        Self::new("curative", InstantKind::Curative, 3)
    }

    pub fn is_preventive(&self) -> bool {
        self.kind == InstantKind::Preventive
    }

    pub fn comes_before(&self, other: &Instant) -> bool {
        self.order < other.order
    }
}

/// Outage event: the network elements it disconnects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contingency {
    pub id: ContingencyId,
    #[serde(default)]
    pub network_elements: Vec<String>,
}

impl Contingency {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ContingencyId::new(id),
            network_elements: Vec::new(),
        }
    }

    pub fn with_elements(mut self, elements: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.network_elements = elements.into_iter().map(Into::into).collect();
        self
    }
}

impl PartialEq for Contingency {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Contingency {}

impl Hash for Contingency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// (Instant, optional Contingency) pair
///
/// Ordered by instant order, then by contingency id. Equality and hashing
/// only look at the instant id and the contingency id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    instant: Instant,
    contingency: Option<Contingency>,
}

impl State {
    pub fn preventive() -> Self {
        Self {
            instant: Instant::preventive(),
            contingency: None,
        }
    }

    /// Post-contingency state. Preventive instants are rejected because the
    /// base case never carries a contingency.
    pub fn post_contingency(instant: Instant, contingency: Contingency) -> crate::CracResult<Self> {
        if instant.is_preventive() {
            return Err(crate::CracError::Validation(format!(
                "contingency {} cannot be attached to preventive instant {}",
                contingency.id, instant.id
            )));
        }
        Ok(Self {
            instant,
            contingency: Some(contingency),
        })
    }

    pub fn instant(&self) -> &Instant {
        &self.instant
    }

    pub fn contingency(&self) -> Option<&Contingency> {
        self.contingency.as_ref()
    }

    pub fn contingency_id(&self) -> Option<&ContingencyId> {
        self.contingency.as_ref().map(|c| &c.id)
    }

    pub fn is_preventive(&self) -> bool {
        self.contingency.is_none()
    }

    /// `"preventive"` or `"<contingency> - <instant>"`.
    pub fn id(&self) -> String {
        match &self.contingency {
            None => self.instant.id.clone(),
            Some(co) => format!("{} - {}", co.id, self.instant.id),
        }
    }

    /// Whether setpoints applied on `self` are still in force on `other`:
    /// same chain and not after it.
    pub fn is_upstream_of(&self, other: &State) -> bool {
        if self.instant.order > other.instant.order {
            return false;
        }
        match (&self.contingency, &other.contingency) {
            (None, _) => true,
            (Some(a), Some(b)) => a.id == b.id,
            (Some(_), None) => false,
        }
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.instant.id == other.instant.id && self.contingency_id() == other.contingency_id()
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.instant.id.hash(state);
        self.contingency_id().hash(state);
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant
            .order
            .cmp(&other.instant.order)
            .then_with(|| self.contingency_id().cmp(&other.contingency_id()))
            .then_with(|| self.instant.id.cmp(&other.instant.id))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curative(co: &str) -> State {
        State::post_contingency(Instant::curative(), Contingency::new(co)).unwrap()
    }

    #[test]
    fn test_state_ids() {
        assert_eq!(State::preventive().id(), "preventive");
        assert_eq!(curative("co1").id(), "co1 - curative");
    }

    #[test]
    fn test_state_ordering() {
        let outage = State::post_contingency(Instant::outage(), Contingency::new("co2")).unwrap();
        let mut states = vec![
            curative("co2"),
            curative("co1"),
            outage.clone(),
            State::preventive(),
        ];
        states.sort();
        assert_eq!(states[0], State::preventive());
        assert_eq!(states[1], outage);
        assert_eq!(states[2], curative("co1"));
        assert_eq!(states[3], curative("co2"));
    }

    #[test]
    fn test_preventive_instant_rejects_contingency() {
        assert!(State::post_contingency(Instant::preventive(), Contingency::new("co1")).is_err());
    }

    #[test]
    fn test_chain_membership() {
        let prev = State::preventive();
        let out1 = State::post_contingency(Instant::outage(), Contingency::new("co1")).unwrap();
        assert!(prev.is_upstream_of(&curative("co1")));
        assert!(out1.is_upstream_of(&curative("co1")));
        assert!(!curative("co1").is_upstream_of(&out1));
        assert!(!out1.is_upstream_of(&curative("co2")));
        assert!(!out1.is_upstream_of(&prev));
    }

    #[test]
    fn test_contingency_equality_ignores_elements() {
        let a = Contingency::new("co1").with_elements(["line-a"]);
        let b = Contingency::new("co1");
        assert_eq!(a, b);
    }
}
