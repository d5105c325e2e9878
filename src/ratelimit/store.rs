//! Per-client window counter storage.

use dashmap::DashMap;
use tracing::debug;

use super::client_key::ClientKey;
use super::window::{Window, WindowKind, WindowLimits, WindowSpec};

/// Rolling counters for one client: at most one bucket per window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientState {
    short: Option<Window>,
    long: Option<Window>,
}

impl ClientState {
    fn slot(&self, kind: WindowKind) -> Option<Window> {
        match kind {
            WindowKind::Short => self.short,
            WindowKind::Long => self.long,
        }
    }

    fn slot_mut(&mut self, kind: WindowKind) -> &mut Option<Window> {
        match kind {
            WindowKind::Short => &mut self.short,
            WindowKind::Long => &mut self.long,
        }
    }

    /// The live bucket of a window, if any.
    pub fn live_window(&self, kind: WindowKind, now_ms: u64, spec: &WindowSpec) -> Option<Window> {
        self.slot(kind).filter(|w| w.is_live(now_ms, spec))
    }

    /// Drop both windows when the long window is no longer live.
    ///
    /// Returns `true` if the state was reset.
    pub fn ensure_reset(&mut self, now_ms: u64, limits: &WindowLimits) -> bool {
        if self.live_window(WindowKind::Long, now_ms, &limits.long).is_some() {
            return false;
        }
        let had_state = self.short.is_some() || self.long.is_some();
        *self = ClientState::default();
        had_state
    }

    /// Counts of the live buckets as `(short, long)`; a window with no live
    /// bucket counts zero.
    pub fn current_counts(&self, now_ms: u64, limits: &WindowLimits) -> (u64, u64) {
        let count = |kind: WindowKind| {
            self.live_window(kind, now_ms, limits.spec(kind))
                .map_or(0, |w| w.count())
        };
        (count(WindowKind::Short), count(WindowKind::Long))
    }

    /// Count one request in both windows, opening a new bucket at `now_ms`
    /// for any window without a live one. Returns the long-window count after
    /// the increment.
    pub fn increment(&mut self, now_ms: u64, limits: &WindowLimits) -> u64 {
        let mut bump = |kind: WindowKind| {
            let spec = limits.spec(kind);
            let slot = self.slot_mut(kind);
            match *slot {
                Some(ref mut window) if window.is_live(now_ms, spec) => window.bump(),
                _ => {
                    let window = Window::open(now_ms);
                    *slot = Some(window);
                    window.count()
                }
            }
        };
        bump(WindowKind::Short);
        bump(WindowKind::Long)
    }
}

/// Process-wide map from client key to that client's rolling counters.
///
/// The map is sharded; holding a client's entry locks its shard, so every
/// operation on one key is serialized against every other operation on it.
pub struct WindowCounterStore {
    clients: DashMap<ClientKey, ClientState>,
    limits: WindowLimits,
}

impl WindowCounterStore {
    pub fn new(limits: WindowLimits) -> Self {
        Self {
            clients: DashMap::new(),
            limits,
        }
    }

    pub fn limits(&self) -> &WindowLimits {
        &self.limits
    }

    /// Run `f` against the client's state, creating it if absent.
    ///
    /// The shard lock is held for the whole call, making `f` atomic with
    /// respect to every other access to the same key. `f` must not touch the
    /// store again.
    pub fn get_or_insert<R>(&self, key: &ClientKey, f: impl FnOnce(&mut ClientState) -> R) -> R {
        let mut state = self.clients.entry(key.clone()).or_insert_with(|| {
            debug!(client = %key, "Tracking new client");
            ClientState::default()
        });
        f(&mut *state)
    }

    /// Reset the client's windows if its long window has lapsed.
    pub fn ensure_reset(&self, key: &ClientKey, now_ms: u64) -> bool {
        let limits = self.limits;
        self.get_or_insert(key, |state| state.ensure_reset(now_ms, &limits))
    }

    /// Current `(short, long)` counts for a client. Never creates state.
    pub fn current_counts(&self, key: &ClientKey, now_ms: u64) -> (u64, u64) {
        self.clients
            .get(key)
            .map_or((0, 0), |state| state.current_counts(now_ms, &self.limits))
    }

    /// Count one request for a client; returns the long count afterwards.
    pub fn increment(&self, key: &ClientKey, now_ms: u64) -> u64 {
        let limits = self.limits;
        self.get_or_insert(key, |state| state.increment(now_ms, &limits))
    }

    /// Get the number of tracked clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Forget every client.
    pub fn clear(&self) {
        self.clients.clear();
    }
}
