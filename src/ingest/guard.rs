use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Single-flight registry: at most one ingestion run per repository.
///
/// Full runs and delta updates both delete-then-insert chunks per file, so two
/// overlapping runs on the same repository would race.
#[derive(Default)]
pub struct RepoGuards {
    active: Mutex<HashSet<String>>,
}

/// Held for the duration of a run; releases the repository on drop.
pub struct RepoGuard {
    guards: Arc<RepoGuards>,
    key: String,
}

impl RepoGuards {
    /// `None` if a run for `key` is already active.
    pub fn try_acquire(self: &Arc<Self>, key: &str) -> Option<RepoGuard> {
        let mut active = self.active.lock();
        if !active.insert(key.to_string()) {
            return None;
        }
        Some(RepoGuard {
            guards: Arc::clone(self),
            key: key.to_string(),
        })
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.active.lock().contains(key)
    }
}

impl Drop for RepoGuard {
    fn drop(&mut self) {
        self.guards.active.lock().remove(&self.key);
    }
}
