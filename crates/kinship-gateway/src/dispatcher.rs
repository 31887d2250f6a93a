use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use kinship_types::events::GatewayEvent;

use crate::registry::{ConnectionHandle, ConnectionRegistry, LocalRegistry};

/// A connection freshly attached to the dispatcher.
pub struct Attached {
    pub handle: ConnectionHandle,
    pub events: mpsc::UnboundedReceiver<GatewayEvent>,
    /// True when no other connection of this user was live.
    pub first_connection: bool,
}

/// Owns the connection registry plus the side lookup from handle to the
/// transport's send half, and delivers events to live connections.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    registry: Arc<dyn ConnectionRegistry>,

    /// Per-connection targeted send channels: handle -> sender
    outboxes: DashMap<ConnectionHandle, mpsc::UnboundedSender<GatewayEvent>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(LocalRegistry::new()))
    }

    pub fn with_registry(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry,
                outboxes: DashMap::new(),
            }),
        }
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.registry.is_online(user_id)
    }

    /// Open an outbox for a new connection and register it for the user.
    pub fn attach(&self, user_id: Uuid) -> Attached {
        let handle = ConnectionHandle::new();
        let (tx, rx) = mpsc::unbounded_channel();
        // Outbox first, so a concurrent fan-out that sees the handle can use it.
        self.inner.outboxes.insert(handle, tx);
        let first_connection = self.inner.registry.register(user_id, handle);
        Attached {
            handle,
            events: rx,
            first_connection,
        }
    }

    /// Drop a connection. Returns true if it was the user's last one.
    pub fn detach(&self, user_id: Uuid, handle: ConnectionHandle) -> bool {
        let last = self.inner.registry.unregister(user_id, handle);
        self.inner.outboxes.remove(&handle);
        last
    }

    /// Send to one connection. Returns false if it is gone.
    pub fn send_to_connection(&self, handle: ConnectionHandle, event: GatewayEvent) -> bool {
        match self.inner.outboxes.get(&handle) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Send to every live connection of a user, reading the registry fresh.
    /// Returns how many connections accepted the event; zero when offline.
    pub fn send_to_user(&self, user_id: Uuid, event: &GatewayEvent) -> usize {
        let mut delivered = 0;
        for handle in self.inner.registry.handles_for(user_id) {
            if let Some(tx) = self.inner.outboxes.get(&handle) {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        trace!("delivered to {} connection(s) of {}", delivered, user_id);
        delivered
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping(user_id: Uuid) -> GatewayEvent {
        GatewayEvent::OnlineFriend { user_id }
    }

    #[tokio::test]
    async fn fans_out_to_every_device() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let mut laptop = dispatcher.attach(user);
        let mut phone = dispatcher.attach(user);
        assert!(laptop.first_connection);
        assert!(!phone.first_connection);

        let event = ping(Uuid::new_v4());
        assert_eq!(dispatcher.send_to_user(user, &event), 2);
        assert_eq!(laptop.events.try_recv().unwrap(), event);
        assert_eq!(phone.events.try_recv().unwrap(), event);
    }

    #[tokio::test]
    async fn offline_user_gets_nothing() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.send_to_user(Uuid::new_v4(), &ping(Uuid::new_v4())), 0);
    }

    #[tokio::test]
    async fn detached_connection_stops_receiving() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let first = dispatcher.attach(user);
        let mut second = dispatcher.attach(user);

        assert!(!dispatcher.detach(user, first.handle));
        assert!(!dispatcher.send_to_connection(first.handle, ping(user)));
        assert_eq!(dispatcher.send_to_user(user, &ping(user)), 1);
        assert!(second.events.try_recv().is_ok());

        assert!(dispatcher.detach(user, second.handle));
        assert!(!dispatcher.is_online(user));
    }

    #[tokio::test]
    async fn dropped_receiver_counts_as_undelivered() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let attached = dispatcher.attach(user);
        drop(attached.events);
        assert_eq!(dispatcher.send_to_user(user, &ping(user)), 0);
    }
}
