use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Channel, ChannelKind, DirectConversation};

// -- Channels --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub name: String,
    pub description: Option<String>,
    pub topic: Option<String>,
    pub kind: ChannelKind,
}

/// A channel as the list endpoint reports it to one viewer. `is_member`
/// lets clients skip the opportunistic public-channel join when they
/// already belong.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel: Channel,
    pub is_member: bool,
    pub member_count: u64,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenConversationRequest {
    /// The other participant. The session user is taken from the request
    /// identity.
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub conversation: DirectConversation,
    /// True when this call created the conversation rather than finding an
    /// existing one.
    pub created: bool,
}

// -- Messages --

/// An attachment payload carried inline with a send request. The raw bytes
/// go to the attachment store collaborator; only the resulting URL is kept.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentUpload {
    pub name: String,
    pub kind: String,
    /// Base64-encoded payload.
    pub data: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    pub reply_to: Option<Uuid>,
    #[serde(default)]
    pub attachments: Vec<AttachmentUpload>,
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor for older pages: pass the `created_at` of the oldest message
    /// from the previous page.
    pub before: Option<DateTime<Utc>>,
}

fn default_limit() -> u32 {
    50
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self { limit: default_limit(), before: None }
    }
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub emoji: String,
}
