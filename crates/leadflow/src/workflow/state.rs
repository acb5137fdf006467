use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Error;

/// Identifier of one of the four fixed lead workflow states.
///
/// The discriminants are the persisted ids. Every value of this type is a
/// valid state, so anything holding a `StateId` never needs to re-check range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
#[repr(i64)]
pub enum StateId {
    New = 1,
    InProgress = 2,
    Postponed = 3,
    Done = 4,
}

impl StateId {
    pub const ALL: [StateId; 4] = [
        StateId::New,
        StateId::InProgress,
        StateId::Postponed,
        StateId::Done,
    ];

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    /// Canonical display name, matching the seeded `lead_states` rows.
    pub fn name(self) -> &'static str {
        match self {
            StateId::New => "NEW",
            StateId::InProgress => "IN_PROGRESS",
            StateId::Postponed => "POSTPONED",
            StateId::Done => "DONE",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == StateId::Done
    }

    pub(crate) fn index(self) -> usize {
        self as usize - 1
    }
}

impl TryFrom<i64> for StateId {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(StateId::New),
            2 => Ok(StateId::InProgress),
            3 => Ok(StateId::Postponed),
            4 => Ok(StateId::Done),
            other => Err(Error::InvalidStateValue(other)),
        }
    }
}

impl From<StateId> for i64 {
    fn from(id: StateId) -> Self {
        id.as_i64()
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for StateId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = s.parse::<i64>() {
            return StateId::try_from(id);
        }
        match s.to_ascii_uppercase().as_str() {
            "NEW" => Ok(StateId::New),
            "IN_PROGRESS" => Ok(StateId::InProgress),
            "POSTPONED" => Ok(StateId::Postponed),
            "DONE" => Ok(StateId::Done),
            _ => Err(Error::Validation(format!("Unknown workflow state: {}", s))),
        }
    }
}

/// The two operations a state may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Advance toward DONE.
    Forward,
    /// Toggle between IN_PROGRESS and POSTPONED.
    Switch,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Forward => "forward",
            Capability::Switch => "switch",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_id_range() {
        assert!(matches!(StateId::try_from(0), Err(Error::InvalidStateValue(0))));
        assert!(matches!(StateId::try_from(5), Err(Error::InvalidStateValue(5))));
        for id in 1..=4 {
            assert_eq!(StateId::try_from(id).unwrap().as_i64(), id);
        }
    }

    #[test]
    fn test_state_id_parses_names_and_numbers() {
        assert_eq!("in_progress".parse::<StateId>().unwrap(), StateId::InProgress);
        assert_eq!("3".parse::<StateId>().unwrap(), StateId::Postponed);
        assert!("7".parse::<StateId>().is_err());
        assert!("ARCHIVED".parse::<StateId>().is_err());
    }

    #[test]
    fn test_only_done_is_terminal() {
        let terminal: Vec<_> = StateId::ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![&StateId::Done]);
    }

    #[test]
    fn test_state_id_serde_uses_numeric_id() {
        assert_eq!(serde_json::to_string(&StateId::Postponed).unwrap(), "3");
        assert_eq!(serde_json::from_str::<StateId>("2").unwrap(), StateId::InProgress);
        assert!(serde_json::from_str::<StateId>("9").is_err());
    }
}
