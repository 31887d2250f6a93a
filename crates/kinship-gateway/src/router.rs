use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use kinship_types::events::GatewayEvent;
use kinship_types::models::{Chat, Message, UserSummary};

use crate::dispatcher::Dispatcher;
use crate::error::ChatError;
use crate::store::{ChatStore, UserDirectory, blocking};

/// Outcome of a routed message, mostly for logging and tests.
#[derive(Debug, Clone)]
pub struct RoutedMessage {
    pub chat_id: Uuid,
    pub message: Message,
    pub group_name: Option<String>,
    /// Participants other than the sender.
    pub recipients: Vec<Uuid>,
    /// Connections that received the `new-message` event.
    pub delivered: usize,
}

/// Resolves a send target to a group or direct chat, persists the message and
/// fans it out to live connections.
#[derive(Clone)]
pub struct MessageRouter {
    dispatcher: Dispatcher,
    store: Arc<dyn ChatStore>,
    users: Arc<dyn UserDirectory>,
}

impl MessageRouter {
    pub fn new(dispatcher: Dispatcher, store: Arc<dyn ChatStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            dispatcher,
            store,
            users,
        }
    }

    /// Route `content` from `sender` to `target_id`, which is either a group
    /// chat the sender belongs to or a friend's user id.
    ///
    /// Nothing is delivered unless the append succeeded. Offline recipients
    /// get no event; the message is still in the chat log.
    pub async fn route(
        &self,
        sender: &UserSummary,
        target_id: Uuid,
        content: String,
    ) -> Result<RoutedMessage, ChatError> {
        let sender_id = sender.id;

        // Group membership is checked and the append done in one store call.
        let store = self.store.clone();
        let body = content.clone();
        let group_append = blocking("group message append", move || {
            store.append_group_message(target_id, sender_id, &body)
        })
        .await?;

        let (chat, message) = match group_append {
            Some(appended) => appended,
            None => {
                let users = self.users.clone();
                let is_friend =
                    blocking("friend check", move || users.are_friends(sender_id, target_id)).await?;
                if !is_friend {
                    return Err(ChatError::RecipientInvalid);
                }

                let store = self.store.clone();
                blocking("direct message append", move || {
                    store.append_direct_message(sender_id, target_id, &content)
                })
                .await?
            }
        };

        Ok(self.fan_out(sender, chat, message))
    }

    fn fan_out(&self, sender: &UserSummary, chat: Chat, message: Message) -> RoutedMessage {
        let echo = GatewayEvent::SuccessMessage {
            content: message.content.clone(),
            message_id: message.id,
            chat_id: chat.id,
        };
        if self.dispatcher.send_to_user(sender.id, &echo) == 0 {
            debug!("{} has no live connection, skipping sender echo", sender.id);
        }

        let notification = GatewayEvent::NewMessage {
            content: message.content.clone(),
            from: sender.clone(),
            message_id: message.id,
            chat_id: chat.id,
            group_name: chat.group_name.clone(),
        };
        let recipients: Vec<Uuid> = chat
            .participants
            .iter()
            .copied()
            .filter(|participant| *participant != sender.id)
            .collect();
        let delivered: usize = recipients
            .iter()
            .map(|recipient| self.dispatcher.send_to_user(*recipient, &notification))
            .sum();

        debug!(
            "message {} in chat {} reached {} connection(s) of {} recipient(s)",
            message.id,
            chat.id,
            delivered,
            recipients.len()
        );

        RoutedMessage {
            chat_id: chat.id,
            message,
            group_name: chat.group_name,
            recipients,
            delivered,
        }
    }
}
