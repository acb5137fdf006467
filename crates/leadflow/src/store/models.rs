use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{workflow::StateId, Error, Result};

/// Upper bound on lead names and transit labels, matching the column limits.
pub const MAX_TEXT_LEN: usize = 255;

// Static workflow configuration row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: StateId,
    pub name: String,
}

impl WorkflowState {
    /// The row seeded for `id`.
    pub fn seeded(id: StateId) -> Self {
        Self {
            id,
            name: id.name().to_string(),
        }
    }

    /// All four seeded rows in id order.
    pub fn defaults() -> Vec<WorkflowState> {
        StateId::ALL.iter().copied().map(WorkflowState::seeded).collect()
    }
}

// Workflow-tracked business entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub name: String,
    /// Label of the most recent transition, e.g. `"2->3"`. Only the last one is kept.
    pub transit: Option<String>,
    pub state: WorkflowState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn state_id(&self) -> StateId {
        self.state.id
    }

    /// Checks the length limits before the lead is handed to a store.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if let Some(transit) = &self.transit {
            if transit.chars().count() > MAX_TEXT_LEN {
                return Err(Error::Validation(format!(
                    "Transit label exceeds {} characters",
                    MAX_TEXT_LEN
                )));
            }
        }
        Ok(())
    }
}

pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("Lead name must not be empty".into()));
    }
    if name.chars().count() > MAX_TEXT_LEN {
        return Err(Error::Validation(format!(
            "Lead name exceeds {} characters",
            MAX_TEXT_LEN
        )));
    }
    Ok(())
}
