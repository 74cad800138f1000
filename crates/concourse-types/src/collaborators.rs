use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ContainerRef;

/// A user as the external directory describes them. Identity, roles and
/// presence are owned by the directory collaborator; this core only reads.
///
/// Canonical definition lives here in concourse-types so the api and
/// gateway crates share one shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: Uuid,
    /// Mentionable identifier, matched case-insensitively against `@handle`
    /// tokens in message content.
    pub handle: String,
    pub display_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub role: String,
    pub online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Identity and presence lookups, supplied from outside the core.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Option<DirectoryUser>;

    /// Case-insensitive handle lookup used by mention resolution.
    async fn find_by_handle(&self, handle: &str) -> Option<DirectoryUser>;
}

/// What a mentioned user is told about the message that mentioned them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionNotification {
    pub mentioned_by: Uuid,
    pub mentioned_by_name: String,
    pub container: ContainerRef,
    pub container_name: String,
    pub message_id: Uuid,
    pub preview: String,
}

/// Delivery collaborator (push/email/toast). One call per recipient.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, recipient: Uuid, notification: MentionNotification)
    -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct StoredAttachment {
    pub url: String,
}

/// Blob storage collaborator. Uploads happen before the message row is
/// written; messages only ever reference the returned stable URL.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn store(&self, name: &str, kind: &str, bytes: Vec<u8>)
    -> anyhow::Result<StoredAttachment>;
}
