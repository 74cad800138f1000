use std::collections::{BTreeMap, HashMap};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use tracing::warn;
use uuid::Uuid;

use concourse_db::models::{MessageRow, NewAttachment, NewMessage};
use concourse_db::Database;
use concourse_types::api::{MessageQuery, SendMessageRequest};
use concourse_types::collaborators::MentionNotification;
use concourse_types::error::ChatError;
use concourse_types::events::GatewayEvent;
use concourse_types::models::{Attachment, ChannelKind, ContainerRef, Message, ReactionGroup};

use crate::error::ApiError;
use crate::identity::Identity;
use crate::mentions;
use crate::state::AppState;

const PREVIEW_LEN: usize = 80;

/// First line of a message, clipped for chat-list rows and notifications.
pub(crate) fn preview(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or("");
    first_line.chars().take(PREVIEW_LEN).collect()
}

/// History visibility: public channels are open to everyone, private
/// channels to members, conversations to their two participants.
pub(crate) fn check_view_access(
    db: &Database,
    container: ContainerRef,
    user: Uuid,
) -> Result<(), ChatError> {
    match container {
        ContainerRef::Channel(id) => {
            let row = db
                .get_channel(id)?
                .filter(|r| r.active)
                .ok_or(ChatError::NotFound("channel"))?;
            if row.kind == ChannelKind::Private.as_str() && !db.is_member(id, user)? {
                return Err(ChatError::PermissionDenied);
            }
        }
        ContainerRef::Direct(id) => {
            if db.get_conversation(id)?.is_none() {
                return Err(ChatError::NotFound("conversation"));
            }
            if !db.is_participant(id, user)? {
                return Err(ChatError::PermissionDenied);
            }
        }
    }
    Ok(())
}

/// Posting requires membership for channels (of either kind) and
/// participation for conversations.
pub(crate) fn check_post_access(
    db: &Database,
    container: ContainerRef,
    user: Uuid,
) -> Result<(), ChatError> {
    match container {
        ContainerRef::Channel(id) => {
            db.get_channel(id)?
                .filter(|r| r.active)
                .ok_or(ChatError::NotFound("channel"))?;
            if !db.is_member(id, user)? {
                return Err(ChatError::PermissionDenied);
            }
        }
        ContainerRef::Direct(id) => {
            if db.get_conversation(id)?.is_none() {
                return Err(ChatError::NotFound("conversation"));
            }
            if !db.is_participant(id, user)? {
                return Err(ChatError::PermissionDenied);
            }
        }
    }
    Ok(())
}

/// What to call the container in a notification: the channel name, or the
/// counterpart's name as seen from the author's side of a conversation.
async fn container_display_name(
    state: &AppState,
    container: ContainerRef,
    viewer: Uuid,
) -> Result<String, ChatError> {
    match container {
        ContainerRef::Channel(id) => {
            let row = state
                .db
                .get_channel(id)?
                .ok_or(ChatError::NotFound("channel"))?;
            Ok(row.name)
        }
        ContainerRef::Direct(id) => {
            let row = state
                .db
                .get_conversation(id)?
                .ok_or(ChatError::NotFound("conversation"))?;
            let counterpart = row.into_model().counterpart_of(viewer);
            Ok(state
                .directory
                .get(counterpart)
                .await
                .map(|u| u.display_name)
                .unwrap_or_else(|| "Direct message".to_string()))
        }
    }
}

/// Persist a message in a container on behalf of the session user, publish
/// it to subscribers, and fire mention notifications.
pub async fn send_message_in(
    state: &AppState,
    container: ContainerRef,
    identity: &Identity,
    req: SendMessageRequest,
) -> Result<Message, ChatError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ChatError::EmptyContent);
    }

    check_post_access(&state.db, container, identity.user_id)?;

    // A reply must point at a message in the same container.
    if let Some(reply_id) = req.reply_to {
        let parent = state
            .db
            .find_message(reply_id)?
            .ok_or(ChatError::InvalidReply)?;
        if parent.container() != Some(container) {
            return Err(ChatError::InvalidReply);
        }
    }

    let mentioned =
        mentions::resolve_mentions(state.directory.as_ref(), identity.user_id, &content).await;
    let mention_ids: Vec<Uuid> = mentioned.iter().map(|u| u.id).collect();

    // Attachments go to the store collaborator first; the message row only
    // ever references the resulting stable URLs.
    let mut attachments = Vec::new();
    for upload in &req.attachments {
        let bytes = B64
            .decode(&upload.data)
            .map_err(|_| ChatError::InvalidAttachment)?;
        let placed = state
            .attachments
            .store(&upload.name, &upload.kind, bytes)
            .await?;
        attachments.push(Attachment {
            id: Uuid::new_v4(),
            url: placed.url,
            kind: upload.kind.clone(),
            name: upload.name.clone(),
        });
    }

    let message_id = Uuid::new_v4();
    let created_at = concourse_db::now_ts();

    let new = NewMessage {
        id: message_id,
        container,
        author_id: identity.user_id,
        content: content.clone(),
        reply_to_id: req.reply_to,
        attachments: attachments
            .iter()
            .map(|a| NewAttachment {
                id: a.id,
                url: a.url.clone(),
                kind: a.kind.clone(),
                name: a.name.clone(),
            })
            .collect(),
        mentions: mention_ids.clone(),
        created_at: created_at.clone(),
    };

    // Run the blocking insert off the async runtime
    let db_state = state.clone();
    tokio::task::spawn_blocking(move || db_state.db.insert_message(&new))
        .await
        .map_err(|e| ChatError::Storage(anyhow::anyhow!("spawn_blocking join error: {e}")))??;

    let timestamp = concourse_db::parse_ts(&created_at);
    let message = Message {
        id: message_id,
        container,
        author_id: identity.user_id,
        content,
        reply_to_id: req.reply_to,
        attachments,
        reactions: vec![],
        mentions: mention_ids,
        created_at: timestamp,
        updated_at: timestamp,
    };

    // Fan out only after persistence; subscribers reconcile by id.
    state.dispatcher.publish(GatewayEvent::MessageCreated {
        message: message.clone(),
    });

    // Notification delivery is best-effort and never fails the send.
    if !mentioned.is_empty() {
        match container_display_name(state, container, identity.user_id).await {
            Ok(container_name) => {
                let notification = MentionNotification {
                    mentioned_by: identity.user_id,
                    mentioned_by_name: identity.display_name.clone(),
                    container,
                    container_name,
                    message_id,
                    preview: preview(&message.content),
                };
                mentions::dispatch_mentions(state.notifier.as_ref(), &mentioned, &notification)
                    .await;
            }
            Err(e) => warn!("skipping mention dispatch for {}: {}", message_id, e),
        }
    }

    Ok(message)
}

/// Messages in a container, ascending by creation timestamp, with
/// reactions, attachments and mentions attached.
pub async fn list_messages_in(
    state: &AppState,
    container: ContainerRef,
    viewer: Uuid,
    query: MessageQuery,
) -> Result<Vec<Message>, ChatError> {
    check_view_access(&state.db, container, viewer)?;

    let limit = query.limit.min(200);
    let before = query.before.map(concourse_db::format_ts);

    // Run all blocking DB queries off the async runtime
    let db_state = state.clone();
    let messages = tokio::task::spawn_blocking(move || {
        let rows = db_state.db.list_messages(container, limit, before.as_deref())?;
        assemble_messages(&db_state.db, rows)
    })
    .await
    .map_err(|e| ChatError::Storage(anyhow::anyhow!("spawn_blocking join error: {e}")))??;

    Ok(messages)
}

/// Join rows to full message models: batch-fetch the per-message extras,
/// group them, and convert.
fn assemble_messages(db: &Database, rows: Vec<MessageRow>) -> Result<Vec<Message>, ChatError> {
    let message_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

    let attachment_rows = db.attachments_for_messages(&message_ids)?;
    let reaction_rows = db.reactions_for_messages(&message_ids)?;
    let mention_rows = db.mentions_for_messages(&message_ids)?;

    let mut attachment_map: HashMap<String, Vec<Attachment>> = HashMap::new();
    for row in attachment_rows {
        attachment_map
            .entry(row.message_id.clone())
            .or_default()
            .push(row.into_model());
    }

    // Group reactions message -> emoji -> user ids. BTreeMap keeps emoji
    // order stable across requests.
    let mut reaction_map: HashMap<String, BTreeMap<String, Vec<Uuid>>> = HashMap::new();
    for row in &reaction_rows {
        let emoji_map = reaction_map.entry(row.message_id.clone()).or_default();
        let user_ids = emoji_map.entry(row.emoji.clone()).or_default();
        if let Ok(uid) = row.user_id.parse::<Uuid>() {
            user_ids.push(uid);
        }
    }

    let mut mention_map: HashMap<String, Vec<Uuid>> = HashMap::new();
    for (message_id, user_id) in &mention_rows {
        if let Ok(uid) = user_id.parse::<Uuid>() {
            mention_map.entry(message_id.clone()).or_default().push(uid);
        }
    }

    let messages = rows
        .into_iter()
        .map(|row| {
            let attachments = attachment_map.remove(&row.id).unwrap_or_default();
            let reactions = reaction_map
                .remove(&row.id)
                .map(|emoji_map| {
                    emoji_map
                        .into_iter()
                        .map(|(emoji, user_ids)| ReactionGroup {
                            emoji,
                            count: user_ids.len(),
                            user_ids,
                        })
                        .collect()
                })
                .unwrap_or_default();
            let mentions = mention_map.remove(&row.id).unwrap_or_default();
            row.into_model(attachments, reactions, mentions)
        })
        .collect();

    Ok(messages)
}

// -- Handlers --

pub async fn send_channel_message(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message =
        send_message_in(&state, ContainerRef::Channel(channel_id), &identity, req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_channel_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = list_messages_in(
        &state,
        ContainerRef::Channel(channel_id),
        identity.user_id,
        query,
    )
    .await?;
    Ok(Json(messages))
}

pub async fn send_conversation_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message =
        send_message_in(&state, ContainerRef::Direct(conversation_id), &identity, req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_conversation_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = list_messages_in(
        &state,
        ContainerRef::Direct(conversation_id),
        identity.user_id,
        query,
    )
    .await?;
    Ok(Json(messages))
}
