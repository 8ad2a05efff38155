use crate::checkout::checked_out_patch_id;
use crate::events::{SharedStoreObserver, StoreEvent, StoreEventSender, StoreEventSink};
use crate::handle::PatchHandle;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use patchsync_connection::{Connection, ConnectionResult, Patch, PatchId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

type InFlightFetch = Shared<BoxFuture<'static, bool>>;

/// In-memory cache of the active project's patches.
///
/// Cloning is cheap; clones share the same cache, in-flight fetch and
/// subscribers.
#[derive(Clone)]
pub struct PatchStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    connection: Arc<dyn Connection>,
    state: RwLock<StoreState>,
    in_flight: Mutex<Option<InFlightFetch>>,
    sink: Mutex<StoreEventSink>,
}

#[derive(Default)]
struct StoreState {
    /// Every live handle keyed by patch id. Survives a reset so a later
    /// fetch refreshes the same slots.
    arena: BTreeMap<PatchId, PatchHandle>,
    /// Collection order; `None` until the first successful full fetch.
    loaded: Option<Vec<PatchId>>,
    last_fetched_ts: Option<u64>,
    current_branch: Option<String>,
    checked_out: Option<PatchId>,
}

impl StoreState {
    fn collection(&self) -> Option<Vec<PatchHandle>> {
        self.loaded.as_ref().map(|ids| {
            ids.iter()
                .filter_map(|id| self.arena.get(id).cloned())
                .collect()
        })
    }

    fn find(&self, fragment: &str) -> Option<PatchHandle> {
        let ids = self.loaded.as_ref()?;
        let mut matches = ids
            .iter()
            .filter_map(|id| self.arena.get(id))
            .filter(|handle| handle.id_contains(fragment));
        let first = matches.next()?.clone();
        let others = matches.count();
        if others > 0 {
            tracing::debug!(
                fragment,
                patch_id = %first.id(),
                others,
                "patch id fragment is ambiguous; using first match"
            );
        }
        Some(first)
    }

    /// Re-derives the checked-out patch and reports whether it changed.
    fn recompute_checked_out(&mut self) -> Option<StoreEvent> {
        let next = self
            .current_branch
            .as_deref()
            .and_then(checked_out_patch_id)
            .and_then(|fragment| self.find(fragment))
            .map(|handle| handle.id());
        if next == self.checked_out {
            return None;
        }
        self.checked_out = next.clone();
        Some(StoreEvent::CheckedOutPatchChanged { id: next })
    }
}

impl PatchStore {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                connection,
                state: RwLock::new(StoreState::default()),
                in_flight: Mutex::new(None),
                sink: Mutex::new(StoreEventSink::default()),
            }),
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.inner.connection
    }

    pub fn subscribe(&self, observer: SharedStoreObserver) {
        self.inner.sink().add_observer(observer);
    }

    pub fn subscribe_channel(&self, sender: StoreEventSender) {
        self.inner.sink().add_sender(sender);
    }

    /// Current collection, `None` until the first successful full fetch.
    pub fn patches(&self) -> Option<Vec<PatchHandle>> {
        self.inner.read_state().collection()
    }

    pub fn last_fetched_ts(&self) -> Option<u64> {
        self.inner.read_state().last_fetched_ts
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.read_state().loaded.is_some()
    }

    /// Fetches every patch of the current project and swaps the collection
    /// in one step. Concurrent callers share one fetch and one outcome.
    ///
    /// Returns `false`, leaving the cache untouched, when the project cannot
    /// be resolved or any part of the batch fails.
    pub async fn fetch_all_patches(&self) -> bool {
        let fetch = {
            let mut in_flight = self.inner.in_flight_fetch();
            match in_flight.as_ref() {
                Some(existing) => {
                    tracing::debug!("joining in-flight patch fetch");
                    existing.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let fetch = async move {
                        let outcome = inner.fetch_and_replace().await;
                        inner.in_flight_fetch().take();
                        outcome
                    }
                    .boxed()
                    .shared();
                    *in_flight = Some(fetch.clone());
                    fetch
                }
            }
        };
        fetch.await
    }

    /// Fetches one patch and merges it by id: an existing entry is
    /// overwritten in place and its handle returned, otherwise the patch is
    /// appended.
    pub async fn refetch_patch(&self, patch_id: &str) -> ConnectionResult<PatchHandle> {
        let connection = &self.inner.connection;
        let rid = connection.current_project_id().await?;
        let patch = connection.fetch_patch(&rid, patch_id).await.inspect_err(|error| {
            tracing::warn!(rid = %rid, patch_id, %error, "patch refetch failed");
        })?;
        Ok(self.inner.merge_patch(patch, now_millis()))
    }

    /// First cached patch whose id contains `fragment`.
    pub fn find_patch_by_id(&self, fragment: &str) -> Option<PatchHandle> {
        self.inner.read_state().find(fragment)
    }

    /// Drops the collection; the next [`PatchStore::init_if_needed`] fetches
    /// again.
    pub fn reset_all_patches(&self) {
        let events = {
            let mut state = self.inner.write_state();
            state.loaded = None;
            state.last_fetched_ts = None;
            let mut events = vec![StoreEvent::PatchesReset];
            events.extend(state.recompute_checked_out());
            events
        };
        self.inner.emit(events);
    }

    /// Fetches only while the collection is unloaded.
    pub async fn init_if_needed(&self) -> bool {
        if self.is_loaded() {
            return true;
        }
        self.fetch_all_patches().await
    }

    /// Feeds the externally observed branch name into the checked-out
    /// derivation.
    pub fn set_current_branch(&self, branch: Option<String>) {
        let events = {
            let mut state = self.inner.write_state();
            if state.current_branch == branch {
                return;
            }
            state.current_branch = branch;
            state.recompute_checked_out().into_iter().collect::<Vec<_>>()
        };
        self.inner.emit(events);
    }

    pub fn current_branch(&self) -> Option<String> {
        self.inner.read_state().current_branch.clone()
    }

    pub fn checked_out_patch(&self) -> Option<PatchHandle> {
        let state = self.inner.read_state();
        state
            .checked_out
            .as_ref()
            .and_then(|id| state.arena.get(id).cloned())
    }

    /// Collection ordered for display: newest latest revision first, ties by
    /// id.
    pub fn sorted_patches(&self) -> Option<Vec<PatchHandle>> {
        let mut keyed = self
            .patches()?
            .into_iter()
            .map(|handle| (handle.latest_revision_ts(), handle.id(), handle))
            .collect::<Vec<_>>();
        keyed.sort_by(|(ts_a, id_a, _), (ts_b, id_b, _)| {
            ts_b.cmp(ts_a).then_with(|| id_a.cmp(id_b))
        });
        Some(keyed.into_iter().map(|(_, _, handle)| handle).collect())
    }
}

impl StoreInner {
    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, StoreState> {
        self.state.read().expect("patch store state lock poisoned")
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, StoreState> {
        self.state.write().expect("patch store state lock poisoned")
    }

    fn in_flight_fetch(&self) -> std::sync::MutexGuard<'_, Option<InFlightFetch>> {
        self.in_flight
            .lock()
            .expect("patch store in-flight mutex poisoned")
    }

    fn sink(&self) -> std::sync::MutexGuard<'_, StoreEventSink> {
        self.sink.lock().expect("patch store sink mutex poisoned")
    }

    /// Observers run with neither the state lock nor the sink lock held, so
    /// they may read the store and call back into it.
    fn emit(&self, events: Vec<StoreEvent>) {
        if events.is_empty() {
            return;
        }
        let targets = self.sink().clone();
        for event in &events {
            targets.emit(event);
        }
        self.sink().prune_closed();
    }

    async fn fetch_and_replace(&self) -> bool {
        let rid = match self.connection.current_project_id().await {
            Ok(rid) => rid,
            Err(error) => {
                tracing::warn!(%error, "cannot fetch patches without a current project");
                return false;
            }
        };

        let mut fetched = Vec::new();
        let mut failures = 0usize;
        for result in self.connection.fetch_all_patches(&rid).await {
            match result {
                Ok(patches) => fetched.extend(patches),
                Err(error) => {
                    failures += 1;
                    tracing::warn!(rid = %rid, %error, "patch listing request failed");
                }
            }
        }
        if failures > 0 {
            tracing::warn!(
                rid = %rid,
                failures,
                "keeping cached patches after partial fetch failure"
            );
            return false;
        }

        let count = self.replace_all(fetched, now_millis());
        tracing::debug!(rid = %rid, count, "patch collection replaced");
        true
    }

    fn replace_all(&self, fetched: Vec<Patch>, fetched_ts: u64) -> usize {
        let (count, events) = {
            let mut state = self.write_state();
            let mut arena = BTreeMap::new();
            let mut order = Vec::with_capacity(fetched.len());
            let mut seen = BTreeSet::new();

            for patch in fetched {
                if !seen.insert(patch.id.clone()) {
                    tracing::debug!(patch_id = %patch.id, "skipping duplicate patch in batch");
                    continue;
                }
                let id = patch.id.clone();
                let handle = match state.arena.remove(&id) {
                    Some(existing) => {
                        existing.overwrite(patch, fetched_ts);
                        existing
                    }
                    None => PatchHandle::new(patch, fetched_ts),
                };
                arena.insert(id.clone(), handle);
                order.push(id);
            }

            let count = order.len();
            state.arena = arena;
            state.loaded = Some(order);
            state.last_fetched_ts = Some(fetched_ts);

            let mut events = vec![StoreEvent::PatchesReplaced { count }];
            events.extend(state.recompute_checked_out());
            (count, events)
        };
        self.emit(events);
        count
    }

    fn merge_patch(&self, patch: Patch, fetched_ts: u64) -> PatchHandle {
        let id = patch.id.clone();
        let (handle, events) = {
            let mut state = self.write_state();
            let handle = match state.arena.get(&id) {
                Some(existing) => {
                    existing.overwrite(patch, fetched_ts);
                    existing.clone()
                }
                None => {
                    let handle = PatchHandle::new(patch, fetched_ts);
                    state.arena.insert(id.clone(), handle.clone());
                    handle
                }
            };
            if let Some(order) = state.loaded.as_mut() {
                if !order.contains(&id) {
                    order.push(id.clone());
                }
            }

            let mut events = vec![StoreEvent::PatchUpdated { id }];
            events.extend(state.recompute_checked_out());
            (handle, events)
        };
        self.emit(events);
        handle
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
