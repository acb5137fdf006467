//! The lead transition graph.
//!
//! [`TRANSITIONS`] is the one place the graph is written down. Behaviors read
//! their destinations from it. The engine additionally derives every successor
//! with the [`stepper`]/[`switcher`] arithmetic and refuses to commit if the
//! two ever disagree.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::workflow::{Capability, StateId};

/// Every legal `(origin, capability) -> destination` edge. Pairs missing from
/// this table are unsupported transitions.
pub const TRANSITIONS: &[(StateId, Capability, StateId)] = &[
    (StateId::New, Capability::Forward, StateId::InProgress),
    (StateId::InProgress, Capability::Forward, StateId::Done),
    (StateId::InProgress, Capability::Switch, StateId::Postponed),
    (StateId::Postponed, Capability::Forward, StateId::Done),
    (StateId::Postponed, Capability::Switch, StateId::InProgress),
];

/// Looks up the destination of `capability` taken from `state`.
pub fn destination(state: StateId, capability: Capability) -> Option<StateId> {
    TRANSITIONS
        .iter()
        .find(|(origin, cap, _)| *origin == state && *cap == capability)
        .map(|(_, _, to)| *to)
}

/// One taken transition. Not persisted; only its label is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: StateId,
    pub to: StateId,
}

impl Transition {
    pub fn new(from: StateId, to: StateId) -> Self {
        Self { from, to }
    }

    /// Audit label stored in `Lead::transit`, e.g. `"2->3"`.
    pub fn label(&self) -> String {
        format!("{}->{}", self.from.as_i64(), self.to.as_i64())
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Successor after `forward`: DONE stays put, even ids jump by two, odd ids by one.
pub fn stepper(state: StateId) -> StateId {
    let id = state.as_i64();
    let next = match id {
        4 => id,
        _ if id % 2 == 0 => id + 2,
        _ => id + 1,
    };
    // 1->2, 2->4, 3->4; never leaves 1..=4
    StateId::try_from(next).unwrap_or(state)
}

/// Successor after `switch`: 2 <-> 3, anything else unchanged.
pub fn switcher(state: StateId) -> StateId {
    match state {
        StateId::InProgress => StateId::Postponed,
        StateId::Postponed => StateId::InProgress,
        other => other,
    }
}

/// The successor rule belonging to `capability`.
pub fn successor(state: StateId, capability: Capability) -> StateId {
    match capability {
        Capability::Forward => stepper(state),
        Capability::Switch => switcher(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_match_table() {
        let labels: Vec<_> = TRANSITIONS
            .iter()
            .map(|(from, _, to)| Transition::new(*from, *to).label())
            .collect();
        assert_eq!(labels, vec!["1->2", "2->4", "2->3", "3->4", "3->2"]);
    }

    #[test]
    fn test_stepper() {
        assert_eq!(stepper(StateId::New), StateId::InProgress);
        assert_eq!(stepper(StateId::InProgress), StateId::Done);
        assert_eq!(stepper(StateId::Postponed), StateId::Done);
        assert_eq!(stepper(StateId::Done), StateId::Done);
    }

    #[test]
    fn test_switcher() {
        assert_eq!(switcher(StateId::New), StateId::New);
        assert_eq!(switcher(StateId::InProgress), StateId::Postponed);
        assert_eq!(switcher(StateId::Postponed), StateId::InProgress);
        assert_eq!(switcher(StateId::Done), StateId::Done);
    }

    #[test]
    fn test_successor_rules_agree_with_table() {
        for state in StateId::ALL {
            for capability in [Capability::Forward, Capability::Switch] {
                if let Some(to) = destination(state, capability) {
                    assert_eq!(
                        successor(state, capability),
                        to,
                        "{} from {}",
                        capability,
                        state
                    );
                }
            }
        }
    }

    #[test]
    fn test_done_has_no_outgoing_edges() {
        assert_eq!(destination(StateId::Done, Capability::Forward), None);
        assert_eq!(destination(StateId::Done, Capability::Switch), None);
        assert_eq!(destination(StateId::New, Capability::Switch), None);
    }
}
