use thiserror::Error;

use kinship_types::events::{GatewayEvent, PayloadError};

/// Failures of a single gateway command.
///
/// Everything except `Unauthenticated` is reported to the initiating
/// connection as a `custom_error` event and leaves the connection open.
/// `Unauthenticated` only occurs while setting a connection up.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("recipient is not a friend or a group you belong to")]
    RecipientInvalid,

    #[error("chat not found")]
    ChatNotFound,

    #[error("message is not the latest message in this chat")]
    MessageMismatch,

    #[error("message already seen")]
    AlreadySeen,

    /// Storage failed; the cause is logged where it happened and not sent to
    /// clients.
    #[error("storage unavailable, try again")]
    PersistenceFailure,

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),

    #[error("invalid or expired credentials")]
    Unauthenticated,
}

impl ChatError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RecipientInvalid => "RECIPIENT_INVALID",
            Self::ChatNotFound => "CHAT_NOT_FOUND",
            Self::MessageMismatch => "MESSAGE_MISMATCH",
            Self::AlreadySeen => "ALREADY_SEEN",
            Self::PersistenceFailure => "PERSISTENCE_FAILURE",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::Unauthenticated => "UNAUTHENTICATED",
        }
    }

    /// Benign conflicts the client may ignore or retry after a refresh.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::MessageMismatch | Self::AlreadySeen)
    }

    pub fn to_event(&self) -> GatewayEvent {
        GatewayEvent::CustomError {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}
