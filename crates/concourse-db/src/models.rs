//! Database row types mapping directly to SQLite rows, kept distinct from
//! the concourse-types API models so the storage layer stays independent.

use concourse_types::models::{
    Attachment, Channel, ChannelKind, ContainerRef, DirectConversation, Message, ReactionGroup,
};
use tracing::warn;
use uuid::Uuid;

use crate::parse_ts;

pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub topic: Option<String>,
    pub kind: String,
    pub created_by: String,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One channel in the viewer-relative listing.
pub struct ChannelListRow {
    pub channel: ChannelRow,
    pub is_member: bool,
    pub member_count: u64,
}

pub struct ConversationRow {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub container_kind: String,
    pub container_id: String,
    pub author_id: String,
    pub content: String,
    pub reply_to_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct AttachmentRow {
    pub id: String,
    pub message_id: String,
    pub url: String,
    pub kind: String,
    pub name: String,
}

pub struct ReactionRow {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: String,
}

/// Everything needed to persist one message in a single transaction.
pub struct NewMessage {
    pub id: Uuid,
    pub container: ContainerRef,
    pub author_id: Uuid,
    pub content: String,
    pub reply_to_id: Option<Uuid>,
    pub attachments: Vec<NewAttachment>,
    pub mentions: Vec<Uuid>,
    pub created_at: String,
}

pub struct NewAttachment {
    pub id: Uuid,
    pub url: String,
    pub kind: String,
    pub name: String,
}

/// Parse a stored uuid, warning (not failing) on corrupt data.
pub(crate) fn parse_uuid(s: &str, what: &str) -> Uuid {
    s.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, s, e);
        Uuid::default()
    })
}

impl ChannelRow {
    pub fn container(&self) -> ContainerRef {
        ContainerRef::Channel(parse_uuid(&self.id, "channel id"))
    }

    pub fn into_model(self, pinned_message_ids: Vec<Uuid>) -> Channel {
        Channel {
            id: parse_uuid(&self.id, "channel id"),
            name: self.name,
            description: self.description,
            topic: self.topic,
            kind: ChannelKind::from_str(&self.kind).unwrap_or_else(|| {
                warn!("Corrupt channel kind '{}'", self.kind);
                ChannelKind::Public
            }),
            created_by: parse_uuid(&self.created_by, "channel created_by"),
            pinned_message_ids,
            created_at: parse_ts(&self.created_at),
            updated_at: parse_ts(&self.updated_at),
        }
    }
}

impl ConversationRow {
    pub fn container(&self) -> ContainerRef {
        ContainerRef::Direct(parse_uuid(&self.id, "conversation id"))
    }

    pub fn into_model(self) -> DirectConversation {
        DirectConversation {
            id: parse_uuid(&self.id, "conversation id"),
            user_a: parse_uuid(&self.user_a, "conversation user_a"),
            user_b: parse_uuid(&self.user_b, "conversation user_b"),
            created_at: parse_ts(&self.created_at),
            updated_at: parse_ts(&self.updated_at),
        }
    }
}

impl MessageRow {
    pub fn container(&self) -> Option<ContainerRef> {
        ContainerRef::from_parts(
            &self.container_kind,
            parse_uuid(&self.container_id, "message container id"),
        )
    }

    pub fn into_model(
        self,
        attachments: Vec<Attachment>,
        reactions: Vec<ReactionGroup>,
        mentions: Vec<Uuid>,
    ) -> Message {
        let container = self.container().unwrap_or_else(|| {
            warn!(
                "Corrupt container kind '{}' on message '{}'",
                self.container_kind, self.id
            );
            ContainerRef::Channel(Uuid::default())
        });

        Message {
            id: parse_uuid(&self.id, "message id"),
            container,
            author_id: parse_uuid(&self.author_id, "message author_id"),
            content: self.content,
            reply_to_id: self
                .reply_to_id
                .as_deref()
                .map(|s| parse_uuid(s, "message reply_to_id")),
            attachments,
            reactions,
            mentions,
            created_at: parse_ts(&self.created_at),
            updated_at: parse_ts(&self.updated_at),
        }
    }
}

impl AttachmentRow {
    pub fn into_model(self) -> Attachment {
        Attachment {
            id: parse_uuid(&self.id, "attachment id"),
            url: self.url,
            kind: self.kind,
            name: self.name,
        }
    }
}
