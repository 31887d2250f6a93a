use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use kinship_types::events::GatewayEvent;

use crate::dispatcher::Dispatcher;
use crate::registry::ConnectionHandle;
use crate::store::{UserDirectory, blocking};

/// How long a user with no connections left stays "online" before friends
/// are told otherwise. Covers page refreshes.
pub const DEFAULT_OFFLINE_DEBOUNCE: Duration = Duration::from_millis(500);

/// A registered connection: its handle and the stream of events addressed
/// to it.
pub struct Session {
    pub handle: ConnectionHandle,
    pub events: mpsc::UnboundedReceiver<GatewayEvent>,
}

/// Online/offline transitions, scoped to each user's friends.
#[derive(Clone)]
pub struct PresenceTracker {
    dispatcher: Dispatcher,
    users: Arc<dyn UserDirectory>,
    debounce: Duration,
}

impl PresenceTracker {
    pub fn new(dispatcher: Dispatcher, users: Arc<dyn UserDirectory>, debounce: Duration) -> Self {
        Self {
            dispatcher,
            users,
            debounce,
        }
    }

    /// Register a new connection. The connection receives one `online-friend`
    /// per friend already online; if this is the user's first live
    /// connection, those friends are told the user came online.
    pub async fn connect(&self, user_id: Uuid) -> Session {
        let attached = self.dispatcher.attach(user_id);
        let online = self.online_friends(user_id).await;

        for &friend in &online {
            self.dispatcher
                .send_to_connection(attached.handle, GatewayEvent::OnlineFriend { user_id: friend });
        }

        if attached.first_connection {
            let event = GatewayEvent::OnlineFriend { user_id };
            for &friend in &online {
                self.dispatcher.send_to_user(friend, &event);
            }
            info!("{} is online ({} friends notified)", user_id, online.len());
        }

        Session {
            handle: attached.handle,
            events: attached.events,
        }
    }

    /// Drop a connection. When it was the user's last one, a deferred check
    /// runs after the debounce window and announces the user offline only if
    /// they are still without connections then. The returned task is never
    /// cancelled; a reconnect simply makes its check come up empty.
    pub fn disconnect(&self, user_id: Uuid, handle: ConnectionHandle) -> Option<JoinHandle<()>> {
        if !self.dispatcher.detach(user_id, handle) {
            return None;
        }

        let tracker = self.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(tracker.debounce).await;

            if tracker.dispatcher.is_online(user_id) {
                debug!("{} reconnected within the debounce window", user_id);
                return;
            }

            let online = tracker.online_friends(user_id).await;
            let event = GatewayEvent::OfflineFriend { user_id };
            for &friend in &online {
                tracker.dispatcher.send_to_user(friend, &event);
            }
            info!("{} is offline ({} friends notified)", user_id, online.len());
        }))
    }

    /// Friends of `user_id` with at least one live connection. A failed
    /// lookup yields nobody; presence is best-effort.
    async fn online_friends(&self, user_id: Uuid) -> Vec<Uuid> {
        let users = self.users.clone();
        match blocking("friend list lookup", move || users.friends_of(user_id)).await {
            Ok(friends) => friends
                .into_iter()
                .filter(|friend| self.dispatcher.is_online(*friend))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}
