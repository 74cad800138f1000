use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The addressable scope a message or typing indicator lives in.
///
/// A container is exactly one of a channel or a direct conversation. Using a
/// tagged variant instead of two nullable foreign keys makes the
/// exclusive-or invariant unrepresentable to violate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ContainerRef {
    Channel(Uuid),
    Direct(Uuid),
}

impl ContainerRef {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Channel(id) | Self::Direct(id) => *id,
        }
    }

    /// Storage tag for the container kind column.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Channel(_) => "channel",
            Self::Direct(_) => "direct",
        }
    }

    /// Rebuild a reference from its stored (kind, id) parts.
    pub fn from_parts(kind: &str, id: Uuid) -> Option<Self> {
        match kind {
            "channel" => Some(Self::Channel(id)),
            "direct" => Some(Self::Direct(id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Public,
    Private,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub topic: Option<String>,
    pub kind: ChannelKind,
    pub created_by: Uuid,
    pub pinned_message_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A one-to-one conversation. Participants are stored normalized
/// (`user_a` < `user_b` by uuid order) so the unordered pair has exactly one
/// identity regardless of who opened it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectConversation {
    pub id: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DirectConversation {
    /// The participant that is not `viewer`, used for display-name lookups.
    pub fn counterpart_of(&self, viewer: Uuid) -> Uuid {
        if self.user_a == viewer { self.user_b } else { self.user_a }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub url: String,
    pub kind: String,
    pub name: String,
}

/// Per-emoji reaction rollup on a message: who reacted, and how many.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub container: ContainerRef,
    pub author_id: Uuid,
    pub content: String,
    pub reply_to_id: Option<Uuid>,
    pub attachments: Vec<Attachment>,
    pub reactions: Vec<ReactionGroup>,
    pub mentions: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A live typing indicator. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingIndicator {
    pub user_id: Uuid,
    pub container: ContainerRef,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatListKind {
    Channel,
    Direct,
}

/// One row of the unified chat list. A projection over channels,
/// conversations and messages, recomputed per request and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatListItem {
    pub container: ContainerRef,
    pub kind: ChatListKind,
    pub display_name: String,
    pub preview: Option<String>,
    pub unread_count: u64,
    pub last_activity_at: DateTime<Utc>,
}

/// Merge a pushed message into a locally held, timestamp-ordered list.
///
/// Delivery is at-least-once and arrival order is not trusted: duplicates
/// are dropped by id, and the list is re-sorted by creation timestamp (id as
/// the tiebreak) after every insert.
pub fn merge_message(messages: &mut Vec<Message>, incoming: Message) {
    if messages.iter().any(|m| m.id == incoming.id) {
        return;
    }
    messages.push(incoming);
    messages.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message_at(secs: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            container: ContainerRef::Channel(Uuid::nil()),
            author_id: Uuid::new_v4(),
            content: format!("m{secs}"),
            reply_to_id: None,
            attachments: vec![],
            reactions: vec![],
            mentions: vec![],
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            updated_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn merge_sorts_out_of_order_arrivals() {
        let first = message_at(10);
        let second = message_at(20);

        // Push events arrive newest-first; the merged list must still read
        // in send order.
        let mut held = Vec::new();
        merge_message(&mut held, second.clone());
        merge_message(&mut held, first.clone());

        assert_eq!(held[0].id, first.id);
        assert_eq!(held[1].id, second.id);
    }

    #[test]
    fn merge_drops_duplicate_deliveries() {
        let msg = message_at(5);

        let mut held = Vec::new();
        merge_message(&mut held, msg.clone());
        merge_message(&mut held, msg.clone());

        assert_eq!(held.len(), 1);
    }

    #[test]
    fn merge_breaks_timestamp_ties_by_id() {
        let mut a = message_at(7);
        let mut b = message_at(7);
        a.id = Uuid::from_u128(1);
        b.id = Uuid::from_u128(2);

        let mut one_way = Vec::new();
        merge_message(&mut one_way, a.clone());
        merge_message(&mut one_way, b.clone());

        let mut other_way = Vec::new();
        merge_message(&mut other_way, b.clone());
        merge_message(&mut other_way, a.clone());

        let ids: Vec<Uuid> = one_way.iter().map(|m| m.id).collect();
        let other_ids: Vec<Uuid> = other_way.iter().map(|m| m.id).collect();
        assert_eq!(ids, other_ids);
    }

    #[test]
    fn container_parts_round_trip() {
        let id = Uuid::new_v4();
        for container in [ContainerRef::Channel(id), ContainerRef::Direct(id)] {
            let rebuilt = ContainerRef::from_parts(container.kind(), container.id());
            assert_eq!(rebuilt, Some(container));
        }
        assert_eq!(ContainerRef::from_parts("voice", id), None);
    }
}
