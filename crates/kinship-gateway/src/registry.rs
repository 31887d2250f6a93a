use std::collections::HashSet;
use std::fmt;

use dashmap::DashMap;
use uuid::Uuid;

/// Opaque id of one live socket. The registry never sees the socket itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(Uuid);

impl ConnectionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps a user to the set of their live connection handles.
///
/// A user is online iff their set is non-empty. Implementations must
/// serialise mutations for the same user.
pub trait ConnectionRegistry: Send + Sync {
    /// Add `handle` to the user's set. Returns true when this is the user's
    /// first live connection. Registering the same handle twice is a no-op.
    fn register(&self, user_id: Uuid, handle: ConnectionHandle) -> bool;

    /// Remove `handle`. Returns true when the user has no connections left,
    /// which is the cue for offline debounce.
    fn unregister(&self, user_id: Uuid, handle: ConnectionHandle) -> bool;

    /// Snapshot of the user's live handles, possibly empty.
    fn handles_for(&self, user_id: Uuid) -> Vec<ConnectionHandle>;

    fn is_online(&self, user_id: Uuid) -> bool {
        !self.handles_for(user_id).is_empty()
    }
}

/// Single-process registry. DashMap shards lock per key, so connect and
/// disconnect for one user are linearised without a global lock.
#[derive(Default)]
pub struct LocalRegistry {
    users: DashMap<Uuid, HashSet<ConnectionHandle>>,
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionRegistry for LocalRegistry {
    fn register(&self, user_id: Uuid, handle: ConnectionHandle) -> bool {
        let mut handles = self.users.entry(user_id).or_default();
        let first = handles.is_empty();
        handles.insert(handle);
        first
    }

    fn unregister(&self, user_id: Uuid, handle: ConnectionHandle) -> bool {
        // Entries are dropped as soon as they empty out.
        let mut now_empty = false;
        self.users.remove_if_mut(&user_id, |_, handles| {
            handles.remove(&handle);
            now_empty = handles.is_empty();
            now_empty
        });
        now_empty
    }

    fn handles_for(&self, user_id: Uuid) -> Vec<ConnectionHandle> {
        self.users
            .get(&user_id)
            .map(|handles| handles.iter().copied().collect())
            .unwrap_or_default()
    }

    fn is_online(&self, user_id: Uuid) -> bool {
        self.users
            .get(&user_id)
            .is_some_and(|handles| !handles.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn unknown_user_is_offline() {
        let registry = LocalRegistry::new();
        let user = Uuid::new_v4();
        assert!(!registry.is_online(user));
        assert!(registry.handles_for(user).is_empty());
    }

    #[test]
    fn register_brings_user_online() {
        let registry = LocalRegistry::new();
        let user = Uuid::new_v4();
        let handle = ConnectionHandle::new();

        assert!(registry.register(user, handle));
        assert!(registry.is_online(user));
        assert!(!registry.register(user, handle));
        assert_eq!(registry.handles_for(user), vec![handle]);
    }

    #[test]
    fn stays_online_while_another_device_is_connected() {
        let registry = LocalRegistry::new();
        let user = Uuid::new_v4();
        let (h1, h2) = (ConnectionHandle::new(), ConnectionHandle::new());

        registry.register(user, h1);
        assert!(!registry.register(user, h2));
        assert!(!registry.unregister(user, h1));
        assert!(registry.is_online(user));
        assert_eq!(registry.handles_for(user), vec![h2]);

        assert!(registry.unregister(user, h2));
        assert!(!registry.is_online(user));
    }

    #[test]
    fn unregistering_a_stranger_is_harmless() {
        let registry = LocalRegistry::new();
        let user = Uuid::new_v4();
        let live = ConnectionHandle::new();
        registry.register(user, live);

        assert!(!registry.unregister(user, ConnectionHandle::new()));
        assert!(!registry.unregister(Uuid::new_v4(), live));
        assert!(registry.is_online(user));
    }

    #[test]
    fn concurrent_connects_for_one_user_are_all_kept() {
        let registry = Arc::new(LocalRegistry::new());
        let user = Uuid::new_v4();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let handle = ConnectionHandle::new();
                    registry.register(user, handle)
                })
            })
            .collect();
        let firsts = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|first| *first)
            .count();

        assert_eq!(firsts, 1);
        assert_eq!(registry.handles_for(user).len(), 8);
    }
}
