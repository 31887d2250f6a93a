use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use kinship_types::events::GatewayEvent;

use crate::dispatcher::Dispatcher;
use crate::error::ChatError;
use crate::store::{ChatStore, SeenOutcome, blocking};

#[derive(Debug, Clone)]
pub struct SeenReceipt {
    pub chat_id: Uuid,
    pub message_id: Uuid,
    pub seen_at: DateTime<Utc>,
    pub participants: Vec<Uuid>,
}

/// Processes "seen" acknowledgements.
///
/// Only the chat's newest message can be acknowledged. A client that acks a
/// message after a newer one arrived gets `MessageMismatch`, and an ack
/// always refers to the tail the server sees, not necessarily the message
/// the client rendered.
#[derive(Clone)]
pub struct AckTracker {
    dispatcher: Dispatcher,
    store: Arc<dyn ChatStore>,
}

impl AckTracker {
    pub fn new(dispatcher: Dispatcher, store: Arc<dyn ChatStore>) -> Self {
        Self { dispatcher, store }
    }

    pub async fn mark_seen(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
        message_id: Uuid,
    ) -> Result<SeenReceipt, ChatError> {
        let store = self.store.clone();
        let outcome = blocking("mark tail seen", move || {
            store.mark_tail_seen(chat_id, user_id, message_id, Utc::now())
        })
        .await?;

        let (seen_at, participants) = match outcome {
            SeenOutcome::Marked {
                seen_at,
                participants,
            } => (seen_at, participants),
            SeenOutcome::ChatNotFound => return Err(ChatError::ChatNotFound),
            SeenOutcome::NotTail => return Err(ChatError::MessageMismatch),
            SeenOutcome::AlreadySeen { .. } => return Err(ChatError::AlreadySeen),
        };

        let event = GatewayEvent::MessageSeen {
            chat_id,
            message_id,
            seen: true,
            seen_at,
        };

        // The acking user's own devices first, then everyone else.
        let mut delivered = self.dispatcher.send_to_user(user_id, &event);
        for participant in participants.iter().filter(|p| **p != user_id) {
            delivered += self.dispatcher.send_to_user(*participant, &event);
        }
        debug!("seen receipt for {} reached {} connection(s)", message_id, delivered);

        Ok(SeenReceipt {
            chat_id,
            message_id,
            seen_at,
            participants,
        })
    }
}
