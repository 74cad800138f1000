use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Channel, ContainerRef, DirectConversation, Message};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is identified
    Ready { user_id: Uuid },

    /// A new message was persisted in a container
    MessageCreated { message: Message },

    /// A reaction was added to or removed from a message
    ReactionToggled {
        container: ContainerRef,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
        added: bool,
    },

    /// A user started typing in a container
    TypingStarted {
        container: ContainerRef,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    },

    /// A user stopped typing (explicitly, or on disconnect)
    TypingStopped {
        container: ContainerRef,
        user_id: Uuid,
    },

    /// A new channel was created. Channel existence is discoverable by
    /// everyone, so this event is global.
    ChannelCreated { channel: Channel },

    /// A user joined a channel
    MemberJoined { channel_id: Uuid, user_id: Uuid },

    /// A user left a channel
    MemberLeft { channel_id: Uuid, user_id: Uuid },

    /// A direct conversation was created. Delivered only to the two
    /// participants over their targeted channels, never broadcast.
    ConversationCreated { conversation: DirectConversation },
}

impl GatewayEvent {
    /// Returns the container this event is scoped to. Events that return
    /// `None` are global and are forwarded to every identified connection.
    pub fn container(&self) -> Option<ContainerRef> {
        match self {
            Self::MessageCreated { message } => Some(message.container),
            Self::ReactionToggled { container, .. } => Some(*container),
            Self::TypingStarted { container, .. } => Some(*container),
            Self::TypingStopped { container, .. } => Some(*container),
            Self::MemberJoined { channel_id, .. } => Some(ContainerRef::Channel(*channel_id)),
            Self::MemberLeft { channel_id, .. } => Some(ContainerRef::Channel(*channel_id)),
            // Ready, ChannelCreated, ConversationCreated
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Bind this connection to a session user. The id must be known to the
    /// user directory; session issuance itself happens outside this core.
    Identify { user_id: Uuid },

    /// Subscribe to events for specific containers. The server only
    /// forwards container-scoped events for subscribed containers.
    Subscribe { containers: Vec<ContainerRef> },

    /// Indicate typing in a container. Supersedes any previous indicator
    /// for this user, wherever it was.
    StartTyping { container: ContainerRef },

    /// Clear this user's typing indicator, if any.
    StopTyping,
}
