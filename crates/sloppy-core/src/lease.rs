//! Scoped ownership of a script by one task.
//!
//! Acquiring a lease is a single conditional update that both applies the
//! forward transition and writes `active_task_id`. Consuming it applies the
//! terminal transition and clears the marker in one statement. A lease that
//! is dropped without being consumed schedules a release on the runtime.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::script::{Script, ScriptPatch, Transition};
use crate::store::{ScriptStore, StoreError};

#[must_use = "dropping a lease releases the script"]
pub struct ActiveTaskLease<S: ScriptStore> {
    store: Arc<S>,
    script_id: String,
    task_id: String,
    armed: bool,
}

impl<S: ScriptStore> ActiveTaskLease<S> {
    /// Claim `script_id` for `task_id`, moving it along `transition`.
    pub async fn acquire(
        store: Arc<S>,
        script_id: &str,
        transition: Transition,
        task_id: &str,
    ) -> Result<(Self, Script), StoreError> {
        let script = store.begin_task(script_id, transition, task_id).await?;
        debug!(script_id, task_id, %transition, "active task lease acquired");
        Ok((Self::adopt(store, script_id, task_id), script))
    }

    /// Take over a marker that was written together with the record itself.
    pub fn adopt(store: Arc<S>, script_id: &str, task_id: &str) -> Self {
        Self {
            store,
            script_id: script_id.to_owned(),
            task_id: task_id.to_owned(),
            armed: true,
        }
    }

    pub fn script_id(&self) -> &str {
        &self.script_id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Apply the terminal `transition` with `patch` and clear the marker.
    ///
    /// If the transition is refused the marker is still cleared before the
    /// error is returned.
    pub async fn complete(
        mut self,
        transition: Transition,
        patch: &ScriptPatch,
    ) -> Result<Script, StoreError> {
        self.armed = false;
        match self
            .store
            .finish_task(&self.script_id, transition, patch, true)
            .await
        {
            Ok(script) => Ok(script),
            Err(e) => {
                if let Err(clear) = self.store.clear_active_task(&self.script_id).await {
                    error!(script_id = %self.script_id, error = %clear, "failed to clear active task");
                }
                Err(e)
            }
        }
    }

    /// Clear the marker without touching state.
    pub async fn release(mut self) -> Result<bool, StoreError> {
        self.armed = false;
        self.store.clear_active_task(&self.script_id).await
    }

    /// Leave the marker in place on purpose.
    pub fn retain(mut self) {
        self.armed = false;
        info!(
            script_id = %self.script_id,
            task_id = %self.task_id,
            "active task marker retained"
        );
    }
}

impl<S: ScriptStore> Drop for ActiveTaskLease<S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let store = Arc::clone(&self.store);
        let script_id = std::mem::take(&mut self.script_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(script_id = %script_id, task_id = %self.task_id, "lease dropped; releasing");
                handle.spawn(async move {
                    if let Err(e) = store.clear_active_task(&script_id).await {
                        error!(script_id = %script_id, error = %e, "failed to release dropped lease");
                    }
                });
            }
            Err(_) => {
                error!(script_id = %script_id, "lease dropped outside a runtime; marker left set");
            }
        }
    }
}
