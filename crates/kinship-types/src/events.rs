use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::UserSummary;

/// Longest message body accepted over the gateway, in characters.
pub const MAX_CONTENT_CHARS: usize = 4000;

/// Events sent FROM server TO client over the WebSocket gateway.
///
/// Frames look like `{"type": "new-message", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    #[serde(rename_all = "camelCase")]
    Ready { user_id: Uuid, username: String },

    /// Echo to every connection of the sender once a message is persisted
    #[serde(rename_all = "camelCase")]
    SuccessMessage {
        content: String,
        message_id: Uuid,
        chat_id: Uuid,
    },

    /// A message addressed to this user (direct or group)
    #[serde(rename_all = "camelCase")]
    NewMessage {
        content: String,
        from: UserSummary,
        message_id: Uuid,
        chat_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        group_name: Option<String>,
    },

    /// The tail message of a chat was acknowledged
    #[serde(rename_all = "camelCase")]
    MessageSeen {
        chat_id: Uuid,
        message_id: Uuid,
        seen: bool,
        seen_at: DateTime<Utc>,
    },

    #[serde(rename_all = "camelCase")]
    WritingStart { sender_id: Uuid },

    #[serde(rename_all = "camelCase")]
    WritingStop { sender_id: Uuid },

    /// A friend came online
    #[serde(rename_all = "camelCase")]
    OnlineFriend { user_id: Uuid },

    /// A friend went offline (after the presence debounce)
    #[serde(rename_all = "camelCase")]
    OfflineFriend { user_id: Uuid },

    /// A command from this connection failed
    #[serde(rename = "custom_error")]
    CustomError { code: String, message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case", deny_unknown_fields)]
pub enum GatewayCommand {
    SendMessage(SendMessagePayload),
    MessageSeen(MessageSeenPayload),
    WritingStart(TypingPayload),
    WritingStop(TypingPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessagePayload {
    pub content: String,
    /// A friend's user id or a group chat id
    pub send_to: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MessageSeenPayload {
    pub chat_id: Uuid,
    pub message_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TypingPayload {
    pub receiver_id: Uuid,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message content is empty")]
    EmptyContent,

    #[error("message content exceeds {} characters", MAX_CONTENT_CHARS)]
    ContentTooLong,
}

impl GatewayCommand {
    /// Decode a text frame and check it against the payload rules.
    /// Nothing that fails here reaches the chat core.
    pub fn parse(text: &str) -> Result<Self, PayloadError> {
        let cmd: GatewayCommand = serde_json::from_str(text)?;
        cmd.validate()?;
        Ok(cmd)
    }

    /// Wire name of the command, safe to log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendMessage(_) => "send-message",
            Self::MessageSeen(_) => "message-seen",
            Self::WritingStart(_) => "writing-start",
            Self::WritingStop(_) => "writing-stop",
        }
    }

    pub fn validate(&self) -> Result<(), PayloadError> {
        match self {
            Self::SendMessage(payload) => payload.validate(),
            Self::MessageSeen(_) | Self::WritingStart(_) | Self::WritingStop(_) => Ok(()),
        }
    }
}

impl SendMessagePayload {
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.content.trim().is_empty() {
            return Err(PayloadError::EmptyContent);
        }
        if self.content.chars().count() > MAX_CONTENT_CHARS {
            return Err(PayloadError::ContentTooLong);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_events_use_kebab_names_and_camel_fields() {
        let chat_id = Uuid::new_v4();
        let message_id = Uuid::new_v4();
        let event = GatewayEvent::SuccessMessage {
            content: "hi".into(),
            message_id,
            chat_id,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "success-message");
        assert_eq!(value["data"]["messageId"], json!(message_id));
        assert_eq!(value["data"]["chatId"], json!(chat_id));
    }

    #[test]
    fn custom_error_keeps_its_underscore_name() {
        let event = GatewayEvent::CustomError {
            code: "ALREADY_SEEN".into(),
            message: "message already seen".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "custom_error");
        assert_eq!(value["data"]["code"], "ALREADY_SEEN");
    }

    #[test]
    fn direct_new_message_omits_group_name() {
        let event = GatewayEvent::NewMessage {
            content: "yo".into(),
            from: UserSummary {
                id: Uuid::new_v4(),
                username: "amira".into(),
            },
            message_id: Uuid::new_v4(),
            chat_id: Uuid::new_v4(),
            group_name: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(value["data"].get("groupName").is_none());
        assert_eq!(value["data"]["from"]["username"], "amira");
    }

    #[test]
    fn parses_send_message() {
        let to = Uuid::new_v4();
        let text = json!({"type": "send-message", "data": {"content": "hello", "sendTo": to}}).to_string();
        let cmd = GatewayCommand::parse(&text).unwrap();
        assert_eq!(
            cmd,
            GatewayCommand::SendMessage(SendMessagePayload {
                content: "hello".into(),
                send_to: to,
            })
        );
    }

    #[test]
    fn parses_typing_and_seen() {
        let id = Uuid::new_v4();
        let text = json!({"type": "writing-stop", "data": {"receiverId": id}}).to_string();
        assert!(matches!(
            GatewayCommand::parse(&text).unwrap(),
            GatewayCommand::WritingStop(TypingPayload { receiver_id }) if receiver_id == id
        ));

        let text = json!({"type": "message-seen", "data": {"chatId": id, "messageId": id}}).to_string();
        assert!(matches!(
            GatewayCommand::parse(&text).unwrap(),
            GatewayCommand::MessageSeen(_)
        ));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_ids() {
        let to = Uuid::new_v4();
        let extra = json!({"type": "send-message", "data": {"content": "x", "sendTo": to, "admin": true}});
        assert!(matches!(
            GatewayCommand::parse(&extra.to_string()),
            Err(PayloadError::Malformed(_))
        ));

        let bad_id = json!({"type": "writing-start", "data": {"receiverId": "not-a-uuid"}});
        assert!(matches!(
            GatewayCommand::parse(&bad_id.to_string()),
            Err(PayloadError::Malformed(_))
        ));

        let unknown = json!({"type": "delete-everything", "data": {}});
        assert!(GatewayCommand::parse(&unknown.to_string()).is_err());

        let outer = json!({"type": "send-message", "data": {"content": "hi", "sendTo": to}, "admin": true});
        assert!(matches!(
            GatewayCommand::parse(&outer.to_string()),
            Err(PayloadError::Malformed(_))
        ));
    }

    #[test]
    fn kind_matches_the_wire_type() {
        let to = Uuid::new_v4();
        for (frame, kind) in [
            (json!({"type": "send-message", "data": {"content": "hi", "sendTo": to}}), "send-message"),
            (json!({"type": "message-seen", "data": {"chatId": to, "messageId": to}}), "message-seen"),
            (json!({"type": "writing-start", "data": {"receiverId": to}}), "writing-start"),
            (json!({"type": "writing-stop", "data": {"receiverId": to}}), "writing-stop"),
        ] {
            assert_eq!(GatewayCommand::parse(&frame.to_string()).unwrap().kind(), kind);
        }
    }

    #[test]
    fn rejects_blank_and_oversized_content() {
        let to = Uuid::new_v4();
        let blank = json!({"type": "send-message", "data": {"content": "   ", "sendTo": to}});
        assert!(matches!(
            GatewayCommand::parse(&blank.to_string()),
            Err(PayloadError::EmptyContent)
        ));

        let long = "a".repeat(MAX_CONTENT_CHARS + 1);
        let big = json!({"type": "send-message", "data": {"content": long, "sendTo": to}});
        assert!(matches!(
            GatewayCommand::parse(&big.to_string()),
            Err(PayloadError::ContentTooLong)
        ));
    }
}
