//! Reactive state container for the local backend
//!
//! [`StateStore`] owns every table, the account list, the current session and
//! the blob map. State is held as an immutable [`StoreState`] snapshot behind an
//! `Arc`; each mutation builds the next snapshot by shallow merge and then
//! notifies subscribers synchronously.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use tracing::{trace, warn};

use crate::auth::{Account, Session};
use crate::listeners::{lock, ListenerSet, Subscription};
use crate::record::Record;
use crate::table::Table;

/// Upper bound on nested change rounds delivered by one dispatch.
///
/// A listener that keeps mutating the store from inside its own callback is cut
/// off here instead of recursing forever. Changes made by other threads while a
/// dispatch is running do not count towards the bound.
pub const MAX_NOTIFY_ROUNDS: usize = 64;

/// Immutable snapshot of everything the local backend holds.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub session: Option<Session>,
    pub accounts: Arc<Vec<Account>>,
    pub tables: BTreeMap<Table, Arc<Vec<Record>>>,
    /// `bucket/path` -> encoded content (`data:` URL)
    pub blobs: Arc<BTreeMap<String, String>>,
}

impl StoreState {
    /// Records of one table in insertion order.
    pub fn table(&self, table: Table) -> &[Record] {
        self.tables
            .get(&table)
            .map(|rows| rows.as_slice())
            .unwrap_or_default()
    }

    fn merged(&self, patch: StatePatch) -> StoreState {
        let mut next = self.clone();
        if let Some(session) = patch.session {
            next.session = session;
        }
        if let Some(accounts) = patch.accounts {
            next.accounts = Arc::new(accounts);
        }
        for (table, rows) in patch.tables {
            next.tables.insert(table, Arc::new(rows));
        }
        if let Some(blobs) = patch.blobs {
            next.blobs = Arc::new(blobs);
        }
        next
    }
}

/// Partial update applied by shallow merge. `None` fields are left untouched.
#[derive(Debug, Default)]
pub struct StatePatch {
    pub session: Option<Option<Session>>,
    pub accounts: Option<Vec<Account>>,
    pub tables: BTreeMap<Table, Vec<Record>>,
    pub blobs: Option<BTreeMap<String, String>>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(mut self, session: Option<Session>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn accounts(mut self, accounts: Vec<Account>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn table(mut self, table: Table, rows: Vec<Record>) -> Self {
        self.tables.insert(table, rows);
        self
    }

    pub fn blobs(mut self, blobs: BTreeMap<String, String>) -> Self {
        self.blobs = Some(blobs);
        self
    }
}

/// Delivered to store subscribers after every mutation.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub previous: Arc<StoreState>,
    pub current: Arc<StoreState>,
}

#[derive(Default)]
struct Dispatch {
    owner: Option<ThreadId>,
    /// Nesting depth of the change currently being delivered.
    depth: usize,
    queue: VecDeque<(StateChange, usize)>,
}

/// Releases dispatch ownership if a listener panics mid-round.
struct DrainGuard<'a>(&'a Mutex<Dispatch>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            let mut dispatch = lock(self.0);
            dispatch.owner = None;
            dispatch.depth = 0;
        }
    }
}

pub struct StateStore {
    state: Mutex<Arc<StoreState>>,
    listeners: ListenerSet<StateChange>,
    dispatch: Mutex<Dispatch>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_state(StoreState::default())
    }

    pub fn with_state(state: StoreState) -> Self {
        Self {
            state: Mutex::new(Arc::new(state)),
            listeners: ListenerSet::new(),
            dispatch: Mutex::new(Dispatch::default()),
        }
    }

    pub fn get_state(&self) -> Arc<StoreState> {
        lock(&self.state).clone()
    }

    pub fn set_state(&self, patch: StatePatch) {
        self.update(|_| patch);
    }

    /// Merge a patch computed from the previous state.
    pub fn update(&self, f: impl FnOnce(&StoreState) -> StatePatch) {
        let drain = {
            let mut guard = lock(&self.state);
            let previous = guard.clone();
            let current = Arc::new(previous.merged(f(&previous)));
            *guard = current.clone();
            self.enqueue(StateChange { previous, current })
        };
        if drain {
            self.drain();
        }
    }

    /// Like [`StateStore::update`], but `f` may refuse the mutation.
    ///
    /// On `Err` nothing is merged and no subscriber is notified.
    pub fn try_update<R, E>(
        &self,
        f: impl FnOnce(&StoreState) -> Result<(StatePatch, R), E>,
    ) -> Result<R, E> {
        let (drain, out) = {
            let mut guard = lock(&self.state);
            let previous = guard.clone();
            let (patch, out) = f(&previous)?;
            let current = Arc::new(previous.merged(patch));
            *guard = current.clone();
            (self.enqueue(StateChange { previous, current }), out)
        };
        if drain {
            self.drain();
        }
        Ok(out)
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&StateChange) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.add(Arc::new(listener))
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Queue a change while the state lock is still held, so deliveries follow
    /// mutation order. Returns `true` when the caller must drain the queue.
    fn enqueue(&self, change: StateChange) -> bool {
        let me = thread::current().id();
        let mut dispatch = lock(&self.dispatch);
        match dispatch.owner {
            Some(owner) if owner == me => {
                // A listener is mutating the store from inside a delivery.
                let depth = dispatch.depth + 1;
                dispatch.queue.push_back((change, depth));
                trace!(depth, "nested state change queued");
                false
            }
            Some(_) => {
                dispatch.queue.push_back((change, 0));
                trace!("state change queued behind another thread's dispatch");
                false
            }
            None => {
                dispatch.queue.push_back((change, 0));
                dispatch.owner = Some(me);
                true
            }
        }
    }

    fn drain(&self) {
        let _guard = DrainGuard(&self.dispatch);
        loop {
            let next = {
                let mut dispatch = lock(&self.dispatch);
                match dispatch.queue.pop_front() {
                    Some((change, depth)) => {
                        dispatch.depth = depth;
                        Some((change, depth))
                    }
                    None => {
                        // Ownership is released under the same lock that saw the
                        // queue empty, so no enqueued change is left behind.
                        dispatch.owner = None;
                        dispatch.depth = 0;
                        None
                    }
                }
            };
            let Some((change, depth)) = next else { break };
            if depth >= MAX_NOTIFY_ROUNDS {
                warn!(
                    depth,
                    "state listeners kept mutating the store; dropping nested notification"
                );
                continue;
            }
            self.listeners.emit(&change);
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
