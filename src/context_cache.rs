//! Client mirror cache for server-backed pointers.
//!
//! The professional's selected-patient pointer is mirrored into fast
//! ephemeral client storage to avoid flicker on reload. The mirror is
//! never authoritative, and a slow background refresh must not wipe a
//! just-selected value: that guard is a named invariant function here,
//! not an implicit ordering assumption. Transitions go through a pure
//! reducer so the contract is testable in isolation.

use std::collections::HashMap;
use std::hash::Hash;

/// Events that can change one cached entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent<V> {
    /// A local user action set the value; always wins.
    Selected(V),
    /// A background fetch completed with this server-side value.
    Fetched(Option<V>),
    /// Explicit clear (sign-out, context reset).
    Cleared,
}

/// The invariant: a present value is never overwritten by an empty
/// fetch result. An empty fetch only confirms emptiness when nothing
/// is cached.
pub fn never_clobber_present<V>(current: Option<V>, fetched: Option<V>) -> Option<V> {
    match (current, fetched) {
        (Some(kept), None) => Some(kept),
        (_, fetched @ Some(_)) => fetched,
        (None, None) => None,
    }
}

/// Pure reducer over one entry's state.
pub fn reduce<V>(state: Option<V>, event: CacheEvent<V>) -> Option<V> {
    match event {
        CacheEvent::Selected(value) => Some(value),
        CacheEvent::Fetched(fetched) => never_clobber_present(state, fetched),
        CacheEvent::Cleared => None,
    }
}

/// Cache of mirrored entries keyed by entity id.
#[derive(Debug, Default)]
pub struct MirrorCache<K, V> {
    entries: HashMap<K, V>,
}

impl<K: Eq + Hash + Clone, V: Clone> MirrorCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Apply an event to one entry through the reducer.
    pub fn apply(&mut self, key: K, event: CacheEvent<V>) {
        let current = self.entries.remove(&key);
        if let Some(next) = reduce(current, event) {
            self.entries.insert(key, next);
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
