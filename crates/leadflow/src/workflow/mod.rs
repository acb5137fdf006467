pub mod behavior;
pub mod engine;
pub mod registry;
pub mod state;
pub mod transition;

pub use behavior::StateBehavior;
pub use engine::TransitionEngine;
pub use registry::StateRegistry;
pub use state::{Capability, StateId};
pub use transition::Transition;
