//! The `Script` record and its lifecycle.

mod model;
mod state;

pub use model::{Script, ScriptPatch};
pub use state::{InvalidTransition, ScriptState, Transition, UnknownState};
