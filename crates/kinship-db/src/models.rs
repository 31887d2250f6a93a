use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Database row types. Chat documents are assembled straight into
/// `kinship_types::models::Chat`; only the user row (which carries the
/// password hash) stays DB-private.
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

/// Result of the tail-message compare-and-set.
#[derive(Debug, Clone, PartialEq)]
pub enum SeenOutcome {
    /// The tail flipped from unseen to seen. Carries every participant so the
    /// caller can fan the receipt out.
    Marked {
        seen_at: DateTime<Utc>,
        participants: Vec<Uuid>,
    },
    /// Chat missing, or the caller is not a participant.
    ChatNotFound,
    /// The id is not the chat's current tail (or the chat has no messages).
    NotTail,
    /// The tail was already seen; `seen_at` is the original time.
    AlreadySeen { seen_at: Option<DateTime<Utc>> },
}
