//! Reactive list cache: optimistic edits, confirmed-state reconciliation and
//! push-driven updates over one owner-scoped remote collection.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::watch;

use super::cache_model::{
    CacheRecord, FetchOutcome, ListCacheConfig, MutationOutcome, OptimisticHandle,
    ReconcileOutcome,
};
use super::cache_traits::RecordSource;
use crate::errors::{Error, Result};
use crate::events::{PushBus, PushEvent, PushHandler, Subscription};

type KeyedFuture<R> = BoxFuture<'static, Result<MutationOutcome<R>>>;

/// Rollback target of an unconfirmed optimistic edit.
struct PendingEdit<R> {
    seq: u64,
    previous: Option<R>,
    previous_index: Option<usize>,
}

/// The map holds only a weak handle: once every caller has dropped its
/// future the operation is cancelled and the key counts as free.
struct KeyedSubmission<R> {
    seq: u64,
    future: WeakShared<KeyedFuture<R>>,
}

struct CacheState<R> {
    owner_id: Option<String>,
    /// Bumped on bind/unbind; invalidates handles and push handlers.
    epoch: u64,
    /// Bumped on bind/unbind/fetch_all; invalidates in-flight fetches.
    generation: u64,
    next_seq: u64,
    items: Vec<R>,
    /// Unconfirmed edits per id, oldest first. Never holds an empty chain.
    pending: HashMap<String, Vec<PendingEdit<R>>>,
    in_flight: HashMap<String, KeyedSubmission<R>>,
    fetch_in_flight: bool,
    /// Pushes applied while the current fetch was in flight, replayed onto
    /// its response.
    pushes_during_fetch: Vec<PushEvent<R>>,
    subscription: Option<Subscription>,
    revision: u64,
}

impl<R: CacheRecord> CacheState<R> {
    fn new() -> Self {
        Self {
            owner_id: None,
            epoch: 0,
            generation: 0,
            next_seq: 0,
            items: Vec::new(),
            pending: HashMap::new(),
            in_flight: HashMap::new(),
            fetch_in_flight: false,
            pushes_during_fetch: Vec::new(),
            subscription: None,
            revision: 0,
        }
    }

    /// Clears everything owned by the current binding and advances the
    /// counters. Returns the old subscription so the caller can drop it
    /// outside the lock.
    fn reset(&mut self) -> Option<Subscription> {
        self.owner_id = None;
        self.epoch += 1;
        self.generation += 1;
        self.items.clear();
        self.pending.clear();
        self.in_flight.clear();
        self.fetch_in_flight = false;
        self.pushes_during_fetch.clear();
        self.subscription.take()
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    fn get(&self, id: &str) -> Option<&R> {
        self.items.iter().find(|item| item.id() == id)
    }

    fn sort(&mut self, config: &ListCacheConfig<R>) {
        if config.sort_order.is_positional() {
            return;
        }
        let order = &config.sort_order;
        self.items
            .sort_by(|a, b| order.compare(a, b).unwrap_or(std::cmp::Ordering::Equal));
    }

    fn is_ordered_at(&self, index: usize, config: &ListCacheConfig<R>) -> bool {
        let order = &config.sort_order;
        let current = &self.items[index];
        let after_previous = index == 0
            || order.compare(&self.items[index - 1], current) != Some(std::cmp::Ordering::Greater);
        let before_next = index + 1 >= self.items.len()
            || order.compare(current, &self.items[index + 1]) != Some(std::cmp::Ordering::Greater);
        after_previous && before_next
    }

    /// Replace in place when present, otherwise append and re-sort.
    fn upsert(&mut self, record: R, config: &ListCacheConfig<R>) {
        match self.position(record.id()) {
            Some(index) => {
                self.items[index] = record;
                if !self.is_ordered_at(index, config) {
                    self.sort(config);
                }
            }
            None => {
                self.items.push(record);
                self.sort(config);
            }
        }
    }

    /// Re-insert a record at its former position, then re-sort.
    fn restore(&mut self, record: R, index: Option<usize>, config: &ListCacheConfig<R>) {
        if self.position(record.id()).is_some() {
            self.upsert(record, config);
            return;
        }
        let index = index.unwrap_or(self.items.len()).min(self.items.len());
        self.items.insert(index, record);
        self.sort(config);
    }

    fn remove(&mut self, id: &str) -> Option<R> {
        self.position(id).map(|index| self.items.remove(index))
    }

    /// Applies one owner-checked push. Returns whether visible state changed.
    fn apply_push(&mut self, event: PushEvent<R>, config: &ListCacheConfig<R>) -> bool {
        match event {
            PushEvent::Insert(record) => {
                if !config.admits(&record) {
                    return false;
                }
                self.retarget_pending(&record);
                self.upsert(record, config);
                true
            }
            PushEvent::Update(record) => {
                if self.position(record.id()).is_none() {
                    return false;
                }
                if !config.admits(&record) {
                    self.pending.remove(record.id());
                    self.remove(record.id());
                    return true;
                }
                self.retarget_pending(&record);
                self.upsert(record, config);
                true
            }
            PushEvent::Delete(key) => {
                self.pending.remove(&key.id);
                self.remove(&key.id).is_some()
            }
        }
    }

    /// A remote value arriving for an id with unconfirmed edits becomes the
    /// rollback target of every edit in its chain.
    fn retarget_pending(&mut self, record: &R) {
        if let Some(chain) = self.pending.get_mut(record.id()) {
            for edit in chain {
                edit.previous = Some(record.clone());
            }
        }
    }

    /// Replaces the items with a fetch response, replays pushes that arrived
    /// while the fetch was in flight, and rebases pending optimistic edits.
    fn replace_all(
        &mut self,
        records: Vec<R>,
        owner_id: &str,
        replay: Vec<PushEvent<R>>,
        config: &ListCacheConfig<R>,
    ) -> usize {
        let local = std::mem::take(&mut self.items);

        for record in records {
            if record.owner_id() != owner_id {
                warn!(
                    "[{}] fetch returned record {} for another owner; dropped",
                    config.name,
                    record.id()
                );
                continue;
            }
            if !config.admits(&record) {
                continue;
            }
            match self.position(record.id()) {
                Some(index) => self.items[index] = record,
                None => self.items.push(record),
            }
        }

        for event in replay {
            self.apply_push(event, config);
        }

        let pending_ids: Vec<String> = self.pending.keys().cloned().collect();
        for id in pending_ids {
            let server_index = self.position(&id);
            let server_value = server_index.map(|index| self.items[index].clone());
            let optimistic = local.iter().find(|item| item.id() == id).cloned();
            if let Some(chain) = self.pending.get_mut(&id) {
                for edit in chain {
                    edit.previous = server_value.clone();
                    edit.previous_index = server_index;
                }
            }
            match optimistic {
                Some(record) => match server_index {
                    Some(index) => self.items[index] = record,
                    None => self.items.push(record),
                },
                None => {
                    self.remove(&id);
                }
            }
        }

        self.sort(config);
        self.items.len()
    }
}

struct CacheInner<R> {
    source: Arc<dyn RecordSource<R>>,
    bus: Arc<dyn PushBus<R>>,
    config: ListCacheConfig<R>,
    state: Mutex<CacheState<R>>,
    changes: watch::Sender<u64>,
}

impl<R: CacheRecord> CacheInner<R> {
    fn notify(&self, state: &mut CacheState<R>) {
        state.revision += 1;
        self.changes.send_replace(state.revision);
    }

    /// `epoch` is `Some` for bus deliveries, which are dropped once the
    /// binding that subscribed them is gone.
    fn handle_push(&self, epoch: Option<u64>, event: PushEvent<R>) -> bool {
        let mut state = self.state.lock();
        if let Some(epoch) = epoch {
            if epoch != state.epoch {
                debug!(
                    "[{}] dropping push {} from stale binding",
                    self.config.name,
                    event.record_id()
                );
                return false;
            }
        }
        let Some(owner_id) = state.owner_id.as_deref() else {
            debug!("[{}] push received while unbound", self.config.name);
            return false;
        };
        if event.owner_id() != owner_id {
            debug!(
                "[{}] ignoring {:?} push {} for another owner",
                self.config.name,
                event.kind(),
                event.record_id()
            );
            return false;
        }

        if state.fetch_in_flight {
            state.pushes_during_fetch.push(event.clone());
        }
        let changed = state.apply_push(event, &self.config);
        if changed {
            self.notify(&mut state);
        }
        changed
    }
}

/// Owner-scoped, de-duplicated, ordered view of a remote collection.
///
/// All state transitions are synchronous steps under one lock; network calls
/// happen outside it. Cloning yields another handle to the same cache.
pub struct ListCache<R> {
    inner: Arc<CacheInner<R>>,
}

impl<R> Clone for ListCache<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: CacheRecord> ListCache<R> {
    pub fn new(
        source: Arc<dyn RecordSource<R>>,
        bus: Arc<dyn PushBus<R>>,
        config: ListCacheConfig<R>,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(CacheInner {
                source,
                bus,
                config,
                state: Mutex::new(CacheState::new()),
                changes,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Scope the cache to `owner_id`, subscribe to its pushes and repopulate
    /// it with a full fetch.
    ///
    /// The previous owner's subscription is cancelled before the fetch
    /// starts. Pushes delivered while the fetch is in flight are replayed onto
    /// its response.
    pub async fn bind(&self, owner_id: Option<&str>) -> Result<FetchOutcome> {
        let owner_id = match owner_id.map(str::trim) {
            Some(owner_id) if !owner_id.is_empty() => owner_id.to_string(),
            _ => return Err(Error::NotAuthenticated),
        };

        let (previous, epoch) = {
            let mut state = self.inner.state.lock();
            let previous = state.reset();
            state.owner_id = Some(owner_id.clone());
            self.inner.notify(&mut state);
            (previous, state.epoch)
        };
        drop(previous);
        info!("[{}] bound to owner {}", self.name(), owner_id);

        let subscription = self
            .inner
            .bus
            .subscribe(&owner_id, self.push_handler(epoch));
        let orphaned = {
            let mut state = self.inner.state.lock();
            if state.epoch == epoch {
                state.subscription = Some(subscription);
                None
            } else {
                Some(subscription)
            }
        };
        if let Some(orphaned) = orphaned {
            debug!("[{}] binding replaced during subscribe", self.name());
            orphaned.unsubscribe();
            return Ok(FetchOutcome::Stale);
        }

        self.fetch_all().await
    }

    /// Unsubscribe and discard all state. Safe to call repeatedly or before
    /// any bind.
    pub fn unbind(&self) {
        let subscription = {
            let mut state = self.inner.state.lock();
            let was_bound = state.owner_id.is_some();
            let subscription = state.reset();
            if was_bound {
                self.inner.notify(&mut state);
            }
            subscription
        };
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            info!("[{}] unbound", self.name());
        }
    }

    /// Replace the held items with the service's complete collection.
    ///
    /// On failure the previous items are left untouched and the error is
    /// returned. A response overtaken by a newer bind/unbind/fetch is
    /// discarded.
    pub async fn fetch_all(&self) -> Result<FetchOutcome> {
        let (owner_id, generation) = {
            let mut state = self.inner.state.lock();
            let owner_id = state.owner_id.clone().ok_or(Error::NotAuthenticated)?;
            state.generation += 1;
            state.fetch_in_flight = true;
            state.pushes_during_fetch.clear();
            (owner_id, state.generation)
        };

        let result = self.inner.source.fetch_all(&owner_id).await;

        let mut state = self.inner.state.lock();
        if state.generation != generation {
            debug!(
                "[{}] discarding stale fetch response (generation {} < {})",
                self.name(),
                generation,
                state.generation
            );
            return Ok(FetchOutcome::Stale);
        }
        state.fetch_in_flight = false;
        let replay = std::mem::take(&mut state.pushes_during_fetch);

        match result {
            Ok(records) => {
                let count = state.replace_all(records, &owner_id, replay, &self.inner.config);
                self.inner.notify(&mut state);
                debug!("[{}] fetched {} record(s)", self.name(), count);
                Ok(FetchOutcome::Applied { count })
            }
            Err(err) => {
                warn!("[{}] fetch failed: {}", self.name(), err);
                Err(err)
            }
        }
    }

    /// Apply a local edit before the server confirms it.
    ///
    /// `mutate` receives the current value and returns the new one (`None`
    /// removes, `Some` on an absent id inserts). It runs while the cache is
    /// locked and must not call back into the cache. An edit on an id with an
    /// unconfirmed edit supersedes it.
    pub fn apply_optimistic<F>(&self, id: &str, mutate: F) -> Result<OptimisticHandle>
    where
        F: FnOnce(Option<&R>) -> Option<R>,
    {
        let mut state = self.inner.state.lock();
        let owner_id = state.owner_id.clone().ok_or(Error::NotAuthenticated)?;

        let previous_index = state.position(id);
        let previous = previous_index.map(|index| state.items[index].clone());
        let next = mutate(previous.as_ref());
        if let Some(record) = &next {
            if record.id() != id {
                return Err(Error::invalid_input(format!(
                    "optimistic value for {} carries id {}",
                    id,
                    record.id()
                )));
            }
            if record.owner_id() != owner_id {
                return Err(Error::unauthorized(format!(
                    "record {} belongs to another owner",
                    id
                )));
            }
        }

        let seq = state.next_seq();
        let chain = state.pending.entry(id.to_string()).or_default();
        if let Some(superseded) = chain.last() {
            debug!(
                "[{}] edit #{} on {} supersedes pending edit #{}",
                self.name(),
                seq,
                id,
                superseded.seq
            );
        }
        chain.push(PendingEdit {
            seq,
            previous,
            previous_index,
        });

        match next.filter(|record| self.inner.config.admits(record)) {
            Some(record) => state.upsert(record, &self.inner.config),
            None => {
                state.remove(id);
            }
        }
        self.inner.notify(&mut state);

        Ok(OptimisticHandle {
            id: id.to_string(),
            seq,
            epoch: state.epoch,
        })
    }

    /// Replace the optimistic value with the server's authoritative record
    /// (`None` confirms a deletion) and clear the pending marker.
    ///
    /// Edits on the same id older than the confirmed one are discarded. If a
    /// newer edit is still pending, the server record becomes its rollback
    /// target and the visible value is left alone.
    pub fn confirm(
        &self,
        handle: &OptimisticHandle,
        server_record: Option<R>,
    ) -> ReconcileOutcome {
        let mut state = self.inner.state.lock();
        if handle.epoch != state.epoch {
            debug!("[{}] confirm for {} from stale binding", self.name(), handle.id);
            return ReconcileOutcome::Dropped;
        }
        let owner_id = state.owner_id.clone().unwrap_or_default();
        let server_record = match server_record {
            Some(record) if record.id() != handle.id || record.owner_id() != owner_id => {
                warn!(
                    "[{}] confirm for {} returned mismatched record {}",
                    self.name(),
                    handle.id,
                    record.id()
                );
                return ReconcileOutcome::Dropped;
            }
            Some(record) => Some(record).filter(|record| self.inner.config.admits(record)),
            None => None,
        };

        let Some(chain) = state.pending.get_mut(&handle.id) else {
            return ReconcileOutcome::Dropped;
        };
        let Some(position) = chain.iter().position(|edit| edit.seq == handle.seq) else {
            return ReconcileOutcome::Dropped;
        };
        // Older edits can no longer roll back past a confirmed one.
        chain.drain(..=position);
        if let Some(next) = chain.first_mut() {
            next.previous = server_record;
            return ReconcileOutcome::Superseded;
        }
        state.pending.remove(&handle.id);

        let changed = match server_record {
            Some(record) => {
                if state.position(&handle.id).is_none() {
                    debug!(
                        "[{}] {} removed locally before confirmation; dropping",
                        self.name(),
                        handle.id
                    );
                    return ReconcileOutcome::Dropped;
                }
                state.upsert(record, &self.inner.config);
                true
            }
            None => state.remove(&handle.id).is_some(),
        };
        if changed {
            self.inner.notify(&mut state);
        }
        ReconcileOutcome::Applied
    }

    /// Restore the value held immediately before the edit (removing it if
    /// the edit was an insert) and clear the pending marker.
    ///
    /// If a newer edit on the id is still pending, the visible value is kept
    /// and the newer edit inherits this edit's rollback target. Older edits
    /// still in flight stay pending after the newest one is rolled back.
    pub fn rollback(&self, handle: &OptimisticHandle) -> ReconcileOutcome {
        let mut state = self.inner.state.lock();
        if handle.epoch != state.epoch {
            return ReconcileOutcome::Dropped;
        }
        let Some(chain) = state.pending.get_mut(&handle.id) else {
            return ReconcileOutcome::Dropped;
        };
        let Some(position) = chain.iter().position(|edit| edit.seq == handle.seq) else {
            return ReconcileOutcome::Dropped;
        };
        let edit = chain.remove(position);
        if let Some(next) = chain.get_mut(position) {
            // The newer edit stays visible and now rolls back past this one.
            next.previous = edit.previous;
            next.previous_index = edit.previous_index;
            return ReconcileOutcome::Superseded;
        }
        if chain.is_empty() {
            state.pending.remove(&handle.id);
        }

        match edit.previous {
            Some(previous) => state.restore(previous, edit.previous_index, &self.inner.config),
            None => {
                state.remove(&handle.id);
            }
        }
        self.inner.notify(&mut state);
        debug!("[{}] rolled back edit on {}", self.name(), handle.id);
        ReconcileOutcome::Applied
    }

    /// Apply `mutate` optimistically, await `request`, then confirm with the
    /// record it returns or roll back if it fails.
    ///
    /// `request` resolving to `None` confirms a deletion.
    pub async fn apply_and_reconcile<F, Fut>(
        &self,
        id: &str,
        mutate: F,
        request: Fut,
    ) -> Result<Option<R>>
    where
        F: FnOnce(Option<&R>) -> Option<R>,
        Fut: Future<Output = Result<Option<R>>>,
    {
        let handle = self.apply_optimistic(id, mutate)?;
        match request.await {
            Ok(server_record) => {
                self.confirm(&handle, server_record.clone());
                Ok(server_record)
            }
            Err(err) => {
                warn!("[{}] mutation of {} failed: {}", self.name(), id, err);
                self.rollback(&handle);
                Err(err)
            }
        }
    }

    /// Apply a remote-origin change. Returns whether the visible items
    /// changed; mismatched-owner and filtered events are ignored.
    ///
    /// Also used to echo a server-confirmed creation into the cache, since an
    /// insert is idempotent.
    pub fn on_push(&self, event: PushEvent<R>) -> bool {
        self.inner.handle_push(None, event)
    }

    /// Run `operation` unless a submission with the same key is in flight, in
    /// which case its result is shared. The key is released when the
    /// original call completes, whether it succeeds or fails, or when every
    /// caller has dropped its future.
    ///
    /// `operation` is invoked under the cache lock to build the future; the
    /// future itself runs outside it.
    pub async fn submit_keyed<F, Fut>(&self, key: &str, operation: F) -> Result<MutationOutcome<R>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<MutationOutcome<R>>> + Send + 'static,
    {
        self.submit_keyed_with_origin(key, operation).await.0
    }

    /// [`submit_keyed`](Self::submit_keyed), also reporting whether this call
    /// started the operation (`true`) or joined one already in flight.
    pub async fn submit_keyed_with_origin<F, Fut>(
        &self,
        key: &str,
        operation: F,
    ) -> (Result<MutationOutcome<R>>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<MutationOutcome<R>>> + Send + 'static,
    {
        let (future, started) = {
            let mut state = self.inner.state.lock();
            let joined = state
                .in_flight
                .get(key)
                .and_then(|submission| submission.future.upgrade());
            match joined {
                Some(future) => {
                    debug!("[{}] joining in-flight submission {}", self.name(), key);
                    (future, false)
                }
                None => {
                    let seq = state.next_seq();
                    let weak: Weak<CacheInner<R>> = Arc::downgrade(&self.inner);
                    let released_key = key.to_string();
                    let operation = operation();
                    let future: Shared<KeyedFuture<R>> = async move {
                        let result = operation.await;
                        if let Some(inner) = weak.upgrade() {
                            let mut state = inner.state.lock();
                            let current = state.in_flight.get(&released_key).map(|s| s.seq);
                            if current == Some(seq) {
                                state.in_flight.remove(&released_key);
                            }
                        }
                        result
                    }
                    .boxed()
                    .shared();
                    match future.downgrade() {
                        Some(handle) => {
                            state.in_flight.insert(
                                key.to_string(),
                                KeyedSubmission { seq, future: handle },
                            );
                        }
                        None => {
                            state.in_flight.remove(key);
                        }
                    }
                    (future, true)
                }
            }
        };
        (future.await, started)
    }

    fn push_handler(&self, epoch: u64) -> PushHandler<R> {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |event: PushEvent<R>| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_push(Some(epoch), event);
            }
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read access
    // ─────────────────────────────────────────────────────────────────────────

    pub fn items(&self) -> Vec<R> {
        self.inner.state.lock().items.clone()
    }

    pub fn get(&self, id: &str) -> Option<R> {
        self.inner.state.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().items.is_empty()
    }

    pub fn owner_id(&self) -> Option<String> {
        self.inner.state.lock().owner_id.clone()
    }

    pub fn is_bound(&self) -> bool {
        self.inner.state.lock().owner_id.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    /// Ids with an unconfirmed optimistic edit, sorted.
    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.state.lock().pending.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.inner.state.lock().pending.contains_key(id)
    }

    /// Rollback target for `id`: `None` when nothing is pending,
    /// `Some(None)` when the pending edit was an insert.
    pub fn pending_previous(&self, id: &str) -> Option<Option<R>> {
        self.inner
            .state
            .lock()
            .pending
            .get(id)
            .and_then(|chain| chain.last())
            .map(|edit| edit.previous.clone())
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.inner
            .state
            .lock()
            .in_flight
            .get(key)
            .map_or(false, |submission| submission.future.upgrade().is_some())
    }

    /// Revision counter bumped on every visible change.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }
}
