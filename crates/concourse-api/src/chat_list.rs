use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use concourse_types::error::ChatError;
use concourse_types::models::{ChatListItem, ChatListKind, ContainerRef};

use crate::error::ApiError;
use crate::identity::Identity;
use crate::messages::{check_view_access, preview};
use crate::state::AppState;

/// Recency sort, newest first. Display name breaks exact-timestamp ties so
/// the list is stable across refreshes.
fn sort_items(mut items: Vec<ChatListItem>) -> Vec<ChatListItem> {
    items.sort_by(|a, b| {
        b.last_activity_at
            .cmp(&a.last_activity_at)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
    items
}

fn item_for(
    state: &AppState,
    viewer: Uuid,
    container: ContainerRef,
    kind: ChatListKind,
    display_name: String,
    container_updated_at: DateTime<Utc>,
) -> Result<ChatListItem, ChatError> {
    let latest = state.db.latest_message(container)?;
    let last_read = state.db.last_read_at(container, viewer)?;
    let unread_count = state
        .db
        .unread_count(container, viewer, last_read.as_deref())?;

    let (preview_text, last_activity_at) = match latest {
        Some(row) => (
            Some(preview(&row.content)),
            concourse_db::parse_ts(&row.created_at),
        ),
        None => (None, container_updated_at),
    };

    Ok(ChatListItem {
        container,
        kind,
        display_name,
        preview: preview_text,
        unread_count,
        last_activity_at,
    })
}

/// The unified chat list for the session user: every channel they belong
/// to and every conversation they participate in, newest activity first,
/// with derived unread counts.
pub async fn chat_list_in(
    state: &AppState,
    viewer: Uuid,
) -> Result<Vec<ChatListItem>, ChatError> {
    let mut items = Vec::new();

    for row in state.db.list_active_channels(viewer)? {
        if !row.is_member {
            continue;
        }
        let container = row.channel.container();
        let updated_at = concourse_db::parse_ts(&row.channel.updated_at);
        items.push(item_for(
            state,
            viewer,
            container,
            ChatListKind::Channel,
            row.channel.name,
            updated_at,
        )?);
    }

    for row in state.db.conversations_for(viewer)? {
        let container = row.container();
        let updated_at = concourse_db::parse_ts(&row.updated_at);
        let conversation = row.into_model();
        let counterpart = conversation.counterpart_of(viewer);
        let display_name = state
            .directory
            .get(counterpart)
            .await
            .map(|u| u.display_name)
            .unwrap_or_else(|| "Unknown user".to_string());

        items.push(item_for(
            state,
            viewer,
            container,
            ChatListKind::Direct,
            display_name,
            updated_at,
        )?);
    }

    Ok(sort_items(items))
}

// -- Handlers --

pub async fn get_chat_list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let items = chat_list_in(&state, identity.user_id).await?;
    Ok(Json(items))
}

/// Opening a container marks it read; this is the only thing that resets
/// the derived unread count.
pub async fn mark_channel_read(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let container = ContainerRef::Channel(channel_id);
    check_view_access(&state.db, container, identity.user_id)?;
    state
        .db
        .mark_read(container, identity.user_id, &concourse_db::now_ts())?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_conversation_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let container = ContainerRef::Direct(conversation_id);
    check_view_access(&state.db, container, identity.user_id)?;
    state
        .db
        .mark_read(container, identity.user_id, &concourse_db::now_ts())?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::open_conversation_in;
    use crate::messages::send_message_in;
    use crate::state::testing::{harness, seed_user};
    use concourse_types::api::SendMessageRequest;
    use concourse_types::models::ChannelKind;

    fn identity(user_id: Uuid, handle: &str) -> Identity {
        Identity {
            user_id,
            handle: handle.to_string(),
            display_name: handle.to_string(),
        }
    }

    fn request(content: &str) -> SendMessageRequest {
        SendMessageRequest {
            content: content.to_string(),
            reply_to: None,
            attachments: vec![],
        }
    }

    fn seed_channel(state: &AppState, name: &str, owner: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        state
            .db
            .create_channel(
                id,
                name,
                None,
                None,
                ChannelKind::Public,
                owner,
                &concourse_db::now_ts(),
            )
            .unwrap();
        id
    }

    #[test]
    fn sorting_is_newest_first() {
        let base = Utc::now();
        let item = |name: &str, offset: i64| ChatListItem {
            container: ContainerRef::Channel(Uuid::new_v4()),
            kind: ChatListKind::Channel,
            display_name: name.to_string(),
            preview: None,
            unread_count: 0,
            last_activity_at: base + chrono::Duration::seconds(offset),
        };

        let sorted = sort_items(vec![item("old", 0), item("new", 20), item("mid", 10)]);
        let names: Vec<&str> = sorted.iter().map(|i| i.display_name.as_str()).collect();
        assert_eq!(names, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn unread_resets_on_mark_read_and_counts_new_foreign_messages() {
        let h = harness();
        let author = seed_user(&h.directory, "author");
        let viewer = seed_user(&h.directory, "viewer");
        let channel_id = seed_channel(&h.state, "ops", author);
        let container = ContainerRef::Channel(channel_id);

        h.state
            .db
            .join_channel(channel_id, viewer, &concourse_db::now_ts())
            .unwrap();

        for i in 0..3 {
            send_message_in(
                &h.state,
                container,
                &identity(author, "author"),
                request(&format!("m{i}")),
            )
            .await
            .unwrap();
        }

        let items = chat_list_in(&h.state, viewer).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unread_count, 3);

        // Opening the channel resets to zero.
        h.state
            .db
            .mark_read(container, viewer, &concourse_db::now_ts())
            .unwrap();
        let items = chat_list_in(&h.state, viewer).await.unwrap();
        assert_eq!(items[0].unread_count, 0);

        // One more foreign message while the channel is not active.
        send_message_in(&h.state, container, &identity(author, "author"), request("ping"))
            .await
            .unwrap();
        let items = chat_list_in(&h.state, viewer).await.unwrap();
        assert_eq!(items[0].unread_count, 1);
        assert_eq!(items[0].preview.as_deref(), Some("ping"));
    }

    #[tokio::test]
    async fn own_messages_do_not_count_as_unread() {
        let h = harness();
        let owner = seed_user(&h.directory, "owner");
        let channel_id = seed_channel(&h.state, "ops", owner);

        send_message_in(
            &h.state,
            ContainerRef::Channel(channel_id),
            &identity(owner, "owner"),
            request("my own note"),
        )
        .await
        .unwrap();

        let items = chat_list_in(&h.state, owner).await.unwrap();
        assert_eq!(items[0].unread_count, 0);
    }

    #[tokio::test]
    async fn conversations_are_named_after_the_counterpart() {
        let h = harness();
        let alice = seed_user(&h.directory, "alice");
        let bob = seed_user(&h.directory, "bob");

        open_conversation_in(&h.state, &identity(alice, "alice"), bob)
            .await
            .unwrap();

        let for_alice = chat_list_in(&h.state, alice).await.unwrap();
        assert_eq!(for_alice.len(), 1);
        assert_eq!(for_alice[0].display_name, "bob");
        assert_eq!(for_alice[0].kind, ChatListKind::Direct);

        let for_bob = chat_list_in(&h.state, bob).await.unwrap();
        assert_eq!(for_bob[0].display_name, "alice");
    }

    #[tokio::test]
    async fn channels_and_conversations_interleave_by_recency() {
        let h = harness();
        let me = seed_user(&h.directory, "me");
        let friend = seed_user(&h.directory, "friend");

        let channel_id = seed_channel(&h.state, "ops", me);
        send_message_in(
            &h.state,
            ContainerRef::Channel(channel_id),
            &identity(me, "me"),
            request("older channel traffic"),
        )
        .await
        .unwrap();

        let (conversation, _) = open_conversation_in(&h.state, &identity(me, "me"), friend)
            .await
            .unwrap();
        send_message_in(
            &h.state,
            ContainerRef::Direct(conversation.id),
            &identity(friend, "friend"),
            request("newer dm"),
        )
        .await
        .unwrap();

        let items = chat_list_in(&h.state, me).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, ChatListKind::Direct);
        assert_eq!(items[1].kind, ChatListKind::Channel);
    }

    #[tokio::test]
    async fn non_member_channels_are_not_listed() {
        let h = harness();
        let owner = seed_user(&h.directory, "owner");
        let outsider = seed_user(&h.directory, "outsider");
        seed_channel(&h.state, "ops", owner);

        let items = chat_list_in(&h.state, outsider).await.unwrap();
        assert!(items.is_empty());
    }
}
