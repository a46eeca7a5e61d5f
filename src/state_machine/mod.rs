// State machine module for tenant movements
//
// Movements advance along a single forward path, may fail into an error sink, and carry an
// abort sub-state once a client asks to cancel them. Guards keep the rules in one place.

pub mod errors;
pub mod events;
pub mod guards;
pub mod movement_state_machine;
pub mod states;

// Re-export main types for convenient access
pub use errors::{GuardError, StateMachineError, StateMachineResult};
pub use events::MovementEvent;
pub use guards::{abort_outcome_for, StateGuard};
pub use movement_state_machine::MovementStateMachine;
pub use states::{AbortState, MovementState};
