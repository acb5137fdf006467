use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::workflow::Capability;

lazy_static! {
    pub static ref TRANSITIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "leadflow_transitions_total",
            "Lead transitions attempted, by capability and outcome."
        ),
        &["capability", "outcome"]
    )
    .unwrap();
    pub static ref STATE_ASSIGNMENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "leadflow_state_assignments_total",
            "Direct state assignments, by outcome."
        ),
        &["outcome"]
    )
    .unwrap();
    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        registry
            .register(Box::new(TRANSITIONS_TOTAL.clone()))
            .unwrap();
        registry
            .register(Box::new(STATE_ASSIGNMENTS_TOTAL.clone()))
            .unwrap();
        registry
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    Unsupported,
    Rejected,
    RolledBack,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Committed => "committed",
            Outcome::Unsupported => "unsupported",
            Outcome::Rejected => "rejected",
            Outcome::RolledBack => "rolled_back",
        }
    }
}

pub fn record_transition(capability: Capability, outcome: Outcome) {
    TRANSITIONS_TOTAL
        .with_label_values(&[capability.as_str(), outcome.as_str()])
        .inc();
}

pub fn record_state_assignment(outcome: Outcome) {
    STATE_ASSIGNMENTS_TOTAL
        .with_label_values(&[outcome.as_str()])
        .inc();
}

// Function to gather metrics for exposition
pub fn gather_metrics() -> crate::Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| crate::Error::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| crate::Error::Internal(format!("Metrics are not valid UTF-8: {}", e)))
}
