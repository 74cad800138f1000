use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use concourse_types::api::{ChannelSummary, CreateChannelRequest};
use concourse_types::error::ChatError;
use concourse_types::events::GatewayEvent;
use concourse_types::models::{Channel, MemberRole};

use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::AppState;

fn pinned_ids(state: &AppState, channel_id: Uuid) -> Result<Vec<Uuid>, ChatError> {
    Ok(state
        .db
        .pinned_message_ids(channel_id)?
        .iter()
        .filter_map(|id| id.parse().ok())
        .collect())
}

/// Create a channel; the creator joins as owner in the same transaction.
pub async fn create_channel_in(
    state: &AppState,
    identity: &Identity,
    req: CreateChannelRequest,
) -> Result<Channel, ChatError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ChatError::InvalidName);
    }

    let id = Uuid::new_v4();
    let created = state.db.create_channel(
        id,
        &name,
        req.description.as_deref(),
        req.topic.as_deref(),
        req.kind,
        identity.user_id,
        &concourse_db::now_ts(),
    )?;
    if !created {
        return Err(ChatError::DuplicateName(name));
    }

    let row = state
        .db
        .get_channel(id)?
        .ok_or(ChatError::NotFound("channel"))?;
    let channel = row.into_model(vec![]);

    state.dispatcher.publish(GatewayEvent::ChannelCreated {
        channel: channel.clone(),
    });

    Ok(channel)
}

/// All active channels, visible to any viewer. Membership info rides along
/// so clients can skip redundant join calls for channels they are in.
pub async fn list_channels_in(
    state: &AppState,
    viewer: Uuid,
) -> Result<Vec<ChannelSummary>, ChatError> {
    let rows = state.db.list_active_channels(viewer)?;

    let mut summaries = Vec::with_capacity(rows.len());
    for row in rows {
        let channel_id = row.channel.container().id();
        let pinned = pinned_ids(state, channel_id)?;
        summaries.push(ChannelSummary {
            channel: row.channel.into_model(pinned),
            is_member: row.is_member,
            member_count: row.member_count,
        });
    }

    Ok(summaries)
}

/// Idempotent join: joining a channel you are already in is a no-op, and
/// only a real membership change publishes an event.
pub async fn join_channel_in(
    state: &AppState,
    identity: &Identity,
    channel_id: Uuid,
) -> Result<(), ChatError> {
    state
        .db
        .get_channel(channel_id)?
        .filter(|r| r.active)
        .ok_or(ChatError::NotFound("channel"))?;

    let joined = state
        .db
        .join_channel(channel_id, identity.user_id, &concourse_db::now_ts())?;
    if joined {
        state.dispatcher.publish(GatewayEvent::MemberJoined {
            channel_id,
            user_id: identity.user_id,
        });
    }

    Ok(())
}

/// Idempotent leave; leaving a channel you are not in is a no-op.
pub async fn leave_channel_in(
    state: &AppState,
    identity: &Identity,
    channel_id: Uuid,
) -> Result<(), ChatError> {
    let left = state.db.leave_channel(channel_id, identity.user_id)?;
    if left {
        state.dispatcher.publish(GatewayEvent::MemberLeft {
            channel_id,
            user_id: identity.user_id,
        });
    }

    Ok(())
}

fn require_owner(state: &AppState, channel_id: Uuid, user_id: Uuid) -> Result<(), ChatError> {
    let role = state.db.member_role(channel_id, user_id)?;
    if role.as_deref() != Some(MemberRole::Owner.as_str()) {
        return Err(ChatError::PermissionDenied);
    }
    Ok(())
}

/// Soft-delete. Messages stay referenced; the channel just stops being
/// listable, joinable or postable, and its name becomes reusable.
pub async fn deactivate_channel_in(
    state: &AppState,
    identity: &Identity,
    channel_id: Uuid,
) -> Result<(), ChatError> {
    state
        .db
        .get_channel(channel_id)?
        .filter(|r| r.active)
        .ok_or(ChatError::NotFound("channel"))?;
    require_owner(state, channel_id, identity.user_id)?;

    state
        .db
        .deactivate_channel(channel_id, &concourse_db::now_ts())?;
    Ok(())
}

pub async fn pin_message_in(
    state: &AppState,
    identity: &Identity,
    channel_id: Uuid,
    message_id: Uuid,
) -> Result<(), ChatError> {
    require_owner(state, channel_id, identity.user_id)?;

    // The pin target must be a message of this channel.
    let row = state
        .db
        .find_message(message_id)?
        .ok_or(ChatError::NotFound("message"))?;
    if row.container() != Some(concourse_types::models::ContainerRef::Channel(channel_id)) {
        return Err(ChatError::NotFound("message"));
    }

    state
        .db
        .pin_message(channel_id, message_id, identity.user_id, &concourse_db::now_ts())?;
    Ok(())
}

pub async fn unpin_message_in(
    state: &AppState,
    identity: &Identity,
    channel_id: Uuid,
    message_id: Uuid,
) -> Result<(), ChatError> {
    require_owner(state, channel_id, identity.user_id)?;
    state.db.unpin_message(channel_id, message_id)?;
    Ok(())
}

// -- Handlers --

pub async fn create_channel(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = create_channel_in(&state, &identity, req).await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn list_channels(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let summaries = list_channels_in(&state, identity.user_id).await?;
    Ok(Json(summaries))
}

pub async fn join_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    join_channel_in(&state, &identity, channel_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    leave_channel_in(&state, &identity, channel_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn deactivate_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    deactivate_channel_in(&state, &identity, channel_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn pin_message(
    State(state): State<AppState>,
    Path((channel_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    pin_message_in(&state, &identity, channel_id, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unpin_message(
    State(state): State<AppState>,
    Path((channel_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    unpin_message_in(&state, &identity, channel_id, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{harness, seed_user};
    use concourse_types::models::ChannelKind;

    fn identity(user_id: Uuid, handle: &str) -> Identity {
        Identity {
            user_id,
            handle: handle.to_string(),
            display_name: handle.to_string(),
        }
    }

    fn create_req(name: &str, kind: ChannelKind) -> CreateChannelRequest {
        CreateChannelRequest {
            name: name.to_string(),
            description: None,
            topic: None,
            kind,
        }
    }

    #[tokio::test]
    async fn duplicate_active_names_are_rejected() {
        let h = harness();
        let bob = seed_user(&h.directory, "bob");
        let me = identity(bob, "bob");

        create_channel_in(&h.state, &me, create_req("ops", ChannelKind::Public))
            .await
            .unwrap();
        let err = create_channel_in(&h.state, &me, create_req("ops", ChannelKind::Private))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::DuplicateName(name) if name == "ops"));
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let h = harness();
        let bob = seed_user(&h.directory, "bob");

        let err = create_channel_in(
            &h.state,
            &identity(bob, "bob"),
            create_req("   ", ChannelKind::Public),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChatError::InvalidName));
    }

    #[tokio::test]
    async fn non_members_see_public_channels_and_double_join_is_a_noop() {
        let h = harness();
        let u1 = seed_user(&h.directory, "u1");
        let u2 = seed_user(&h.directory, "u2");

        let channel = create_channel_in(
            &h.state,
            &identity(u1, "u1"),
            create_req("ops", ChannelKind::Public),
        )
        .await
        .unwrap();

        // u2 is not a member but still sees the channel listed.
        let listed = list_channels_in(&h.state, u2).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].channel.name, "ops");
        assert!(!listed[0].is_member);

        // Joining twice in a row leaves the member count unchanged.
        join_channel_in(&h.state, &identity(u2, "u2"), channel.id)
            .await
            .unwrap();
        join_channel_in(&h.state, &identity(u2, "u2"), channel.id)
            .await
            .unwrap();
        assert_eq!(h.state.db.member_count(channel.id).unwrap(), 2);
    }

    #[tokio::test]
    async fn only_owners_deactivate() {
        let h = harness();
        let owner = seed_user(&h.directory, "owner");
        let member = seed_user(&h.directory, "member");

        let channel = create_channel_in(
            &h.state,
            &identity(owner, "owner"),
            create_req("ops", ChannelKind::Public),
        )
        .await
        .unwrap();
        join_channel_in(&h.state, &identity(member, "member"), channel.id)
            .await
            .unwrap();

        let err = deactivate_channel_in(&h.state, &identity(member, "member"), channel.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::PermissionDenied));

        deactivate_channel_in(&h.state, &identity(owner, "owner"), channel.id)
            .await
            .unwrap();
        assert!(list_channels_in(&h.state, owner).await.unwrap().is_empty());

        // The freed name is usable again.
        create_channel_in(
            &h.state,
            &identity(owner, "owner"),
            create_req("ops", ChannelKind::Public),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn pins_must_target_messages_of_the_channel() {
        let h = harness();
        let owner = seed_user(&h.directory, "owner");
        let me = identity(owner, "owner");

        let ops = create_channel_in(&h.state, &me, create_req("ops", ChannelKind::Public))
            .await
            .unwrap();
        let lobby = create_channel_in(&h.state, &me, create_req("lobby", ChannelKind::Public))
            .await
            .unwrap();

        let msg = crate::messages::send_message_in(
            &h.state,
            concourse_types::models::ContainerRef::Channel(lobby.id),
            &me,
            concourse_types::api::SendMessageRequest {
                content: "elsewhere".to_string(),
                reply_to: None,
                attachments: vec![],
            },
        )
        .await
        .unwrap();

        let err = pin_message_in(&h.state, &me, ops.id, msg.id).await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound("message")));

        pin_message_in(&h.state, &me, lobby.id, msg.id).await.unwrap();
        let listed = list_channels_in(&h.state, owner).await.unwrap();
        let lobby_summary = listed
            .iter()
            .find(|s| s.channel.id == lobby.id)
            .unwrap();
        assert_eq!(lobby_summary.channel.pinned_message_ids, vec![msg.id]);
    }
}
