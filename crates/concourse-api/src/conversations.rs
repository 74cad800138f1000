use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use concourse_types::api::{ConversationResponse, OpenConversationRequest};
use concourse_types::error::ChatError;
use concourse_types::events::GatewayEvent;
use concourse_types::models::DirectConversation;

use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::AppState;

/// Resolve the conversation between the session user and `other`,
/// creating it exactly once. (A,B) and (B,A) always land on the same row;
/// the db layer normalizes the pair under a UNIQUE constraint, so
/// concurrent first calls from both sides converge on one id.
pub async fn open_conversation_in(
    state: &AppState,
    identity: &Identity,
    other: Uuid,
) -> Result<(DirectConversation, bool), ChatError> {
    if other == identity.user_id {
        return Err(ChatError::InvalidParticipants);
    }
    if state.directory.get(other).await.is_none() {
        return Err(ChatError::NotFound("user"));
    }

    let (row, created) = state.db.get_or_create_conversation(
        Uuid::new_v4(),
        identity.user_id,
        other,
        &concourse_db::now_ts(),
    )?;
    let conversation = row.into_model();

    if created {
        // Targeted delivery: a conversation is private to its two
        // participants, so this never goes over the broadcast stream.
        for participant in [conversation.user_a, conversation.user_b] {
            state
                .dispatcher
                .send_to_user(
                    participant,
                    GatewayEvent::ConversationCreated {
                        conversation: conversation.clone(),
                    },
                )
                .await;
        }
    }

    Ok((conversation, created))
}

// -- Handlers --

pub async fn open_conversation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<OpenConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (conversation, created) = open_conversation_in(&state, &identity, req.user_id).await?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(ConversationResponse { conversation, created })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{harness, seed_user};

    fn identity(user_id: Uuid, handle: &str) -> Identity {
        Identity {
            user_id,
            handle: handle.to_string(),
            display_name: handle.to_string(),
        }
    }

    #[tokio::test]
    async fn both_sides_resolve_to_the_same_conversation() {
        let h = harness();
        let alice = seed_user(&h.directory, "alice");
        let bob = seed_user(&h.directory, "bob");

        let (from_alice, created) =
            open_conversation_in(&h.state, &identity(alice, "alice"), bob)
                .await
                .unwrap();
        assert!(created);

        let (from_bob, created_again) =
            open_conversation_in(&h.state, &identity(bob, "bob"), alice)
                .await
                .unwrap();
        assert!(!created_again);
        assert_eq!(from_alice.id, from_bob.id);
    }

    #[tokio::test]
    async fn talking_to_yourself_is_rejected() {
        let h = harness();
        let alice = seed_user(&h.directory, "alice");

        let err = open_conversation_in(&h.state, &identity(alice, "alice"), alice)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidParticipants));
    }

    #[tokio::test]
    async fn unknown_counterparts_are_rejected() {
        let h = harness();
        let alice = seed_user(&h.directory, "alice");

        let err = open_conversation_in(&h.state, &identity(alice, "alice"), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotFound("user")));
    }
}
