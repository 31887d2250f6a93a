//! Seams to the persistence collaborators, plus their SQLite adapter.
//!
//! The traits are synchronous like the database underneath; async callers go
//! through [`blocking`], which moves the call onto tokio's blocking pool and
//! turns any storage error into [`ChatError::PersistenceFailure`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::error;
use uuid::Uuid;

use kinship_db::Database;
pub use kinship_db::models::SeenOutcome;
use kinship_types::models::{Chat, Message};

use crate::error::ChatError;

/// Chat document persistence. Each method must be atomic with respect to the
/// others.
pub trait ChatStore: Send + Sync {
    /// Append to a group chat `chat_id` that `sender` belongs to. `None` when
    /// no such group exists for this sender.
    fn append_group_message(
        &self,
        chat_id: Uuid,
        sender: Uuid,
        content: &str,
    ) -> Result<Option<(Chat, Message)>>;

    /// Find-or-create the pair's direct chat and append to it.
    fn append_direct_message(
        &self,
        sender: Uuid,
        recipient: Uuid,
        content: &str,
    ) -> Result<(Chat, Message)>;

    /// Compare-and-set of the tail message's seen flag.
    fn mark_tail_seen(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<SeenOutcome>;
}

/// User and friend lookups.
pub trait UserDirectory: Send + Sync {
    fn username_of(&self, user_id: Uuid) -> Result<Option<String>>;
    fn are_friends(&self, a: Uuid, b: Uuid) -> Result<bool>;
    fn friends_of(&self, user_id: Uuid) -> Result<Vec<Uuid>>;
}

impl ChatStore for Database {
    fn append_group_message(
        &self,
        chat_id: Uuid,
        sender: Uuid,
        content: &str,
    ) -> Result<Option<(Chat, Message)>> {
        Database::append_group_message(self, chat_id, sender, content)
    }

    fn append_direct_message(
        &self,
        sender: Uuid,
        recipient: Uuid,
        content: &str,
    ) -> Result<(Chat, Message)> {
        Database::append_direct_message(self, sender, recipient, content)
    }

    fn mark_tail_seen(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<SeenOutcome> {
        Database::mark_tail_seen(self, chat_id, user_id, message_id, at)
    }
}

impl UserDirectory for Database {
    fn username_of(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(self.get_user_by_id(user_id)?.map(|row| row.username))
    }

    fn are_friends(&self, a: Uuid, b: Uuid) -> Result<bool> {
        Database::are_friends(self, a, b)
    }

    fn friends_of(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        Database::friends_of(self, user_id)
    }
}

/// Run a blocking store call off the async runtime.
pub async fn blocking<T, F>(what: &'static str, f: F) -> Result<T, ChatError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!("{} failed: {:#}", what, e);
            Err(ChatError::PersistenceFailure)
        }
        Err(e) => {
            error!("spawn_blocking join error during {}: {}", what, e);
            Err(ChatError::PersistenceFailure)
        }
    }
}
