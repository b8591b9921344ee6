pub mod config;
pub mod dialogue;
pub mod lease;
pub mod notify;
pub mod pipeline;
pub mod providers;
pub mod queue;
pub mod script;
pub mod store;

mod error;

pub use error::PipelineError;
pub use pipeline::{Dispatch, Pipeline};
pub use script::{Script, ScriptPatch, ScriptState, Transition};
pub use store::{ScriptStore, SqliteScriptStore, StoreError};
