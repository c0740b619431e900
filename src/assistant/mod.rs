//! Interaction controller
//!
//! Drives one listen, think, speak cycle at a time over the external
//! speech and completion services.

mod controller;
mod machine;
mod state;

pub use controller::{ControllerHandle, InteractionController};
pub use machine::{Effect, InteractionMachine};
pub use state::{ControllerEvent, CycleId, InteractionState};
