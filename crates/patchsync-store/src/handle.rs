use patchsync_connection::{AugmentedPatch, Patch, PatchId};
use std::sync::{Arc, RwLock};

/// Shared reference to one cached patch.
///
/// The store refreshes a patch by writing through its handle, so every clone
/// handed out earlier observes the new data without re-subscribing.
#[derive(Clone, Debug)]
pub struct PatchHandle(Arc<RwLock<AugmentedPatch>>);

impl PatchHandle {
    pub(crate) fn new(patch: Patch, last_fetched_ts: u64) -> Self {
        Self(Arc::new(RwLock::new(AugmentedPatch {
            patch,
            last_fetched_ts,
        })))
    }

    pub fn id(&self) -> PatchId {
        self.read(|augmented| augmented.patch.id.clone())
    }

    pub fn last_fetched_ts(&self) -> u64 {
        self.read(|augmented| augmented.last_fetched_ts)
    }

    /// Owned copy of the current value.
    pub fn snapshot(&self) -> AugmentedPatch {
        self.read(AugmentedPatch::clone)
    }

    pub fn read<R>(&self, f: impl FnOnce(&AugmentedPatch) -> R) -> R {
        let guard = self.0.read().expect("patch handle lock poisoned");
        f(&guard)
    }

    /// Whether both handles point at the same cache slot.
    pub fn same_as(&self, other: &PatchHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn overwrite(&self, patch: Patch, last_fetched_ts: u64) {
        let mut guard = self.0.write().expect("patch handle lock poisoned");
        guard.patch = patch;
        guard.last_fetched_ts = last_fetched_ts;
    }

    pub(crate) fn id_contains(&self, fragment: &str) -> bool {
        self.read(|augmented| augmented.patch.id.contains(fragment))
    }

    /// Timestamp of the newest revision, 0 for a patch without revisions.
    pub(crate) fn latest_revision_ts(&self) -> u64 {
        self.read(|augmented| {
            augmented
                .patch
                .latest_revision()
                .map(|revision| revision.timestamp)
                .unwrap_or_default()
        })
    }
}
