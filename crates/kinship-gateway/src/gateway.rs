use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use kinship_db::Database;
use kinship_types::events::GatewayCommand;
use kinship_types::models::UserSummary;

use crate::ack::AckTracker;
use crate::auth::verify_token;
use crate::dispatcher::Dispatcher;
use crate::error::ChatError;
use crate::presence::{DEFAULT_OFFLINE_DEBOUNCE, PresenceTracker};
use crate::registry::ConnectionHandle;
use crate::router::MessageRouter;
use crate::store::{ChatStore, UserDirectory, blocking};
use crate::typing::TypingNotifier;

#[derive(Clone)]
pub struct GatewayConfig {
    pub jwt_secret: String,
    pub offline_debounce: Duration,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("jwt_secret", &"<redacted>")
            .field("offline_debounce", &self.offline_debounce)
            .finish()
    }
}

impl GatewayConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            offline_debounce: DEFAULT_OFFLINE_DEBOUNCE,
        }
    }
}

/// The real-time chat core: one per process, cloned into every connection.
#[derive(Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    users: Arc<dyn UserDirectory>,
    dispatcher: Dispatcher,
    presence: PresenceTracker,
    router: MessageRouter,
    acks: AckTracker,
    typing: TypingNotifier,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        dispatcher: Dispatcher,
        store: Arc<dyn ChatStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            presence: PresenceTracker::new(dispatcher.clone(), users.clone(), config.offline_debounce),
            router: MessageRouter::new(dispatcher.clone(), store.clone(), users.clone()),
            acks: AckTracker::new(dispatcher.clone(), store),
            typing: TypingNotifier::new(dispatcher.clone()),
            config: Arc::new(config),
            users,
            dispatcher,
        }
    }

    /// Gateway over the SQLite database with an in-process registry.
    pub fn with_database(config: GatewayConfig, db: Arc<Database>) -> Self {
        Self::new(config, Dispatcher::new(), db.clone(), db)
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn acks(&self) -> &AckTracker {
        &self.acks
    }

    /// Check a connection credential: the token must verify and name an
    /// existing user.
    pub async fn authenticate(&self, token: &str) -> Result<UserSummary, ChatError> {
        let claims = verify_token(&self.config.jwt_secret, token)?;
        let users = self.users.clone();
        let user_id = claims.sub;
        let username = blocking("user lookup", move || users.username_of(user_id))
            .await?
            .ok_or(ChatError::Unauthenticated)?;
        Ok(UserSummary {
            id: user_id,
            username,
        })
    }

    /// Run one validated command on behalf of `user`.
    pub async fn handle_command(&self, user: &UserSummary, cmd: GatewayCommand) -> Result<(), ChatError> {
        match cmd {
            GatewayCommand::SendMessage(payload) => {
                self.router.route(user, payload.send_to, payload.content).await?;
            }
            GatewayCommand::MessageSeen(payload) => {
                self.acks
                    .mark_seen(user.id, payload.chat_id, payload.message_id)
                    .await?;
            }
            GatewayCommand::WritingStart(payload) => {
                self.typing.start(user.id, payload.receiver_id);
            }
            GatewayCommand::WritingStop(payload) => {
                self.typing.stop(user.id, payload.receiver_id);
            }
        }
        Ok(())
    }

    /// Parse and run a raw text frame. Any failure goes back to the
    /// connection that sent the frame as `custom_error`, and nowhere else.
    pub async fn handle_text(&self, user: &UserSummary, handle: ConnectionHandle, text: &str) {
        let (kind, result) = match GatewayCommand::parse(text) {
            Ok(cmd) => (cmd.kind(), self.handle_command(user, cmd).await),
            Err(e) => ("unparsed frame", Err(ChatError::from(e))),
        };

        // Frames carry private message content; only the command name is logged.
        if let Err(e) = result {
            if e.is_conflict() {
                debug!("{} ({}) {} conflict: {}", user.username, user.id, kind, e);
            } else {
                warn!("{} ({}) {} failed: {}", user.username, user.id, kind, e);
            }
            self.dispatcher.send_to_connection(handle, e.to_event());
        }
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.dispatcher.is_online(user_id)
    }
}
