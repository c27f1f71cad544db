use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per project. Holding the guard for the whole of a mutation
/// queues any other mutation of the same project behind it, in arrival order.
#[derive(Debug, Default)]
pub(crate) struct ProjectLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ProjectLocks {
    fn lock_for(&self, project_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(project_id.to_string()).or_default().clone()
    }

    pub(crate) async fn acquire(&self, project_id: &str) -> OwnedMutexGuard<()> {
        let lock = self.lock_for(project_id);
        if lock.try_lock().is_err() {
            tracing::debug!(project = project_id, "mutation queued behind in-flight mutation");
        }
        lock.lock_owned().await
    }

    /// True while a mutation of `project_id` is in flight.
    #[cfg(test)]
    fn is_busy(&self, project_id: &str) -> bool {
        self.lock_for(project_id).try_lock().is_err()
    }
}
