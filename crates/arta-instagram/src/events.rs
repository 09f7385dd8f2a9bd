use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Login credentials for a fresh platform session.
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One direct message delivered by the realtime subscription.
pub struct InboundMessage {
    pub thread_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub text: String,
    pub occurred_unix_ms: u64,
}

impl InboundMessage {
    /// The admission-control identity: the sender when known, otherwise the
    /// thread itself.
    pub fn resolved_user_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| Some(self.thread_id.as_str()).filter(|value| !value.trim().is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One comment delivered by the realtime subscription.
pub struct InboundComment {
    pub media_id: String,
    pub comment_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub text: String,
    pub occurred_unix_ms: u64,
}

impl InboundComment {
    pub fn resolved_user_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .filter(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Events flowing from the realtime subscription toward the dispatcher.
pub enum LinkEvent {
    DirectMessage(InboundMessage),
    Comment(InboundComment),
    SubscriptionError { detail: String },
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::{InboundComment, InboundMessage};

    #[test]
    fn unit_message_user_id_falls_back_to_thread() {
        let message = InboundMessage {
            thread_id: "t1".to_string(),
            user_id: None,
            text: "سلام".to_string(),
            occurred_unix_ms: 0,
        };
        assert_eq!(message.resolved_user_id(), Some("t1"));

        let with_user = InboundMessage {
            user_id: Some("u9".to_string()),
            ..message.clone()
        };
        assert_eq!(with_user.resolved_user_id(), Some("u9"));

        let empty = InboundMessage {
            thread_id: "  ".to_string(),
            ..message
        };
        assert_eq!(empty.resolved_user_id(), None);
    }

    #[test]
    fn unit_comment_user_id_has_no_fallback() {
        let comment = InboundComment {
            media_id: "m1".to_string(),
            comment_id: "c1".to_string(),
            user_id: None,
            text: "مالیات؟".to_string(),
            occurred_unix_ms: 0,
        };
        assert_eq!(comment.resolved_user_id(), None);
    }
}
