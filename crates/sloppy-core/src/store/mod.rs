//! Script persistence.
//!
//! [`ScriptStore`] is the repository interface; [`sqlite::SqliteScriptStore`]
//! is the default implementation. Every call is a round trip to the backing
//! store, nothing is cached in process.
//!
//! Trait methods use `impl Future` in their signatures so no boxing or
//! `async-trait` is needed.

pub mod sqlite;

use std::future::Future;

use thiserror::Error;

use crate::script::{Script, ScriptPatch, ScriptState, Transition};

pub use sqlite::SqliteScriptStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("script {0} not found")]
    NotFound(String),

    #[error("script {0} already exists")]
    DuplicateKey(String),

    #[error("script {id} is {actual}, expected {expected}")]
    InvalidState {
        id: String,
        expected: ScriptState,
        actual: ScriptState,
    },

    #[error("script {id} is owned by task {active_task_id}")]
    Busy { id: String, active_task_id: String },

    #[error("corrupt script row {id}: {message}")]
    Corrupt { id: String, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub trait ScriptStore: Send + Sync + 'static {
    /// Insert a new record, failing with [`StoreError::DuplicateKey`] if the
    /// id is taken. Returns the id.
    fn create(&self, script: Script) -> impl Future<Output = Result<String, StoreError>> + Send;

    fn get(&self, id: &str) -> impl Future<Output = Result<Option<Script>, StoreError>> + Send;

    /// Merge the supplied fields. Returns `false` when no record matched or
    /// no field actually changed.
    fn update(
        &self,
        id: &str,
        patch: &ScriptPatch,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Like [`ScriptStore::update`] but only applies while the record is
    /// still in `expected`.
    fn update_in_state(
        &self,
        id: &str,
        expected: ScriptState,
        patch: &ScriptPatch,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn list_by_state(
        &self,
        state: ScriptState,
    ) -> impl Future<Output = Result<Vec<Script>, StoreError>> + Send;

    fn list_not_in_state(
        &self,
        state: ScriptState,
    ) -> impl Future<Output = Result<Vec<Script>, StoreError>> + Send;

    fn list_all(&self) -> impl Future<Output = Result<Vec<Script>, StoreError>> + Send;

    /// Unset `active_task_id`. Returns `false` if there was nothing to clear.
    fn clear_active_task(&self, id: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Apply a forward transition and claim the record for `task_id` in one
    /// conditional statement. Fails with `InvalidState` when the record is
    /// not in the transition's predecessor state and with `Busy` when another
    /// task already owns it.
    fn begin_task(
        &self,
        id: &str,
        transition: Transition,
        task_id: &str,
    ) -> impl Future<Output = Result<Script, StoreError>> + Send;

    /// Apply a terminal transition together with `patch`. When `release` is
    /// set the active-task marker is cleared in the same statement.
    fn finish_task(
        &self,
        id: &str,
        transition: Transition,
        patch: &ScriptPatch,
        release: bool,
    ) -> impl Future<Output = Result<Script, StoreError>> + Send;

    /// Liveness check against the backing store.
    fn health_check(&self) -> impl Future<Output = bool> + Send;
}
