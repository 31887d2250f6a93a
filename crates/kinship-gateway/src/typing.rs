use uuid::Uuid;

use kinship_types::events::GatewayEvent;

use crate::dispatcher::Dispatcher;

/// Ephemeral typing indicators for direct chats. Nothing is stored and
/// nothing times out here; clients send the stop themselves.
#[derive(Clone)]
pub struct TypingNotifier {
    dispatcher: Dispatcher,
}

impl TypingNotifier {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Returns the number of receiver connections reached; zero when the
    /// receiver is offline.
    pub fn start(&self, sender_id: Uuid, receiver_id: Uuid) -> usize {
        self.dispatcher
            .send_to_user(receiver_id, &GatewayEvent::WritingStart { sender_id })
    }

    pub fn stop(&self, sender_id: Uuid, receiver_id: Uuid) -> usize {
        self.dispatcher
            .send_to_user(receiver_id, &GatewayEvent::WritingStop { sender_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_only_to_the_receiver() {
        let dispatcher = Dispatcher::new();
        let typing = TypingNotifier::new(dispatcher.clone());
        let (sender, receiver) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sender_conn = dispatcher.attach(sender);
        let mut receiver_conn = dispatcher.attach(receiver);

        assert_eq!(typing.start(sender, receiver), 1);
        assert_eq!(typing.stop(sender, receiver), 1);

        assert_eq!(
            receiver_conn.events.try_recv().unwrap(),
            GatewayEvent::WritingStart { sender_id: sender }
        );
        assert_eq!(
            receiver_conn.events.try_recv().unwrap(),
            GatewayEvent::WritingStop { sender_id: sender }
        );
        assert!(sender_conn.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn offline_receiver_is_a_silent_no_op() {
        let typing = TypingNotifier::new(Dispatcher::new());
        assert_eq!(typing.start(Uuid::new_v4(), Uuid::new_v4()), 0);
    }
}
