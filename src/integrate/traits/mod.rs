//! Trait definitions for integration algorithms.

pub mod events;
pub mod state;
pub mod steppable;

pub use events::{EventFn, EventFunction};
pub use state::OdeState;
pub use steppable::{AdaptiveSteppable, EventCapable, StepOutput, Steppable, TrialStep};
