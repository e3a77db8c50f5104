//! Thread state registry
//!
//! Maps native threads to their `ThreadState`. Each thread owns a liveness
//! token in thread-local storage; the registry only keeps a weak handle to
//! it, so entries of terminated threads are recognizable and are dropped by
//! a sweep that runs every `sweep_interval` creations.
//!
//! Repeat lookups from a thread are served by a thread-local cache tagged
//! with the registry identity, so threads never contend on it.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use dashmap::DashMap;

use crate::state::interp::SystemState;
use crate::state::thread::ThreadState;

/// Global counter for registry identities
static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static ALIVE: Arc<()> = Arc::new(());
    static LAST: RefCell<Option<(u64, Weak<ThreadState>)>> = const { RefCell::new(None) };
}

struct Entry {
    state: Arc<ThreadState>,
    alive: Weak<()>,
}

/// Registry of thread states
pub struct ThreadStateRegistry {
    id: u64,
    default_system: Arc<SystemState>,
    states: DashMap<ThreadId, Entry>,
    sweep_interval: u64,
    created: AtomicU64,
    swept: AtomicU64,
}

impl ThreadStateRegistry {
    /// Create a registry whose new thread states start with `default_system`
    pub fn new(default_system: Arc<SystemState>, sweep_interval: u64) -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            default_system,
            states: DashMap::new(),
            sweep_interval: sweep_interval.max(1),
            created: AtomicU64::new(0),
            swept: AtomicU64::new(0),
        }
    }

    /// State of the calling thread
    pub fn current(&self) -> Arc<ThreadState> {
        self.get_or_create(None)
    }

    /// State of the calling thread, created on first use.
    ///
    /// A supplied `system` becomes the thread's system state; without one a
    /// new state starts with the registry default.
    pub fn get_or_create(&self, system: Option<Arc<SystemState>>) -> Arc<ThreadState> {
        let state = match self.cached() {
            Some(state) => state,
            None => self.lookup_or_insert(thread::current().id()),
        };
        if let Some(system) = system {
            if !state.has_system(&system) {
                state.set_system(system);
            }
        }
        state
    }

    fn cached(&self) -> Option<Arc<ThreadState>> {
        LAST.try_with(|last| match &*last.borrow() {
            Some((registry, state)) if *registry == self.id => state.upgrade(),
            _ => None,
        })
        .ok()
        .flatten()
    }

    fn remember(&self, state: &Arc<ThreadState>) {
        let _ = LAST.try_with(|last| *last.borrow_mut() = Some((self.id, Arc::downgrade(state))));
    }

    fn lookup_or_insert(&self, id: ThreadId) -> Arc<ThreadState> {
        let existing = self.states.get(&id).map(|e| Arc::clone(&e.state));
        let state = match existing {
            Some(state) => state,
            None => {
                let current = thread::current();
                let state = Arc::new(ThreadState::new(
                    id,
                    current.name().map(str::to_string),
                    Arc::clone(&self.default_system),
                ));
                let alive = ALIVE.try_with(Arc::downgrade).unwrap_or_default();
                self.states.insert(
                    id,
                    Entry {
                        state: Arc::clone(&state),
                        alive,
                    },
                );
                tracing::trace!(thread = ?id, "created thread state");
                let created = self.created.fetch_add(1, Ordering::Relaxed) + 1;
                if created % self.sweep_interval == 0 {
                    self.sweep();
                }
                state
            }
        };
        self.remember(&state);
        state
    }

    /// Remove states of terminated threads; returns how many were removed
    pub fn sweep(&self) -> usize {
        let before = self.states.len();
        self.states.retain(|_, e| e.alive.strong_count() > 0);
        let removed = before.saturating_sub(self.states.len());
        self.swept.fetch_add(removed as u64, Ordering::Relaxed);
        tracing::debug!(removed, live = self.states.len(), "swept thread states");
        removed
    }

    /// Registered thread states
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no thread state is registered
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Thread states created so far
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Thread states removed by sweeps so far
    pub fn swept(&self) -> u64 {
        self.swept.load(Ordering::Relaxed)
    }

    /// System state new threads start with
    pub fn default_system(&self) -> &Arc<SystemState> {
        &self.default_system
    }
}

impl std::fmt::Debug for ThreadStateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadStateRegistry")
            .field("id", &self.id)
            .field("threads", &self.states.len())
            .field("created", &self.created())
            .field("swept", &self.swept())
            .finish()
    }
}
