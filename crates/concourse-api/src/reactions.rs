use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use concourse_types::api::ToggleReactionRequest;
use concourse_types::error::ChatError;
use concourse_types::events::GatewayEvent;

use crate::error::ApiError;
use crate::identity::Identity;
use crate::messages::check_view_access;
use crate::state::AppState;

/// Flip the (message, user, emoji) triple for the session user. The db
/// toggle is a single atomic unit, never a read-modify-write of the whole
/// reaction map, so concurrent reactors cannot lose each other's updates.
pub async fn toggle_reaction_in(
    state: &AppState,
    identity: &Identity,
    message_id: Uuid,
    emoji: &str,
) -> Result<bool, ChatError> {
    let row = state
        .db
        .find_message(message_id)?
        .ok_or(ChatError::NotFound("message"))?;
    let container = row
        .container()
        .ok_or_else(|| ChatError::Storage(anyhow::anyhow!("message has corrupt container")))?;

    // Reacting requires the same visibility as reading the message.
    check_view_access(&state.db, container, identity.user_id)?;

    let added = state
        .db
        .toggle_reaction(message_id, identity.user_id, emoji, &concourse_db::now_ts())?;

    state.dispatcher.publish(GatewayEvent::ReactionToggled {
        container,
        message_id,
        user_id: identity.user_id,
        emoji: emoji.to_string(),
        added,
    });

    Ok(added)
}

// -- Handlers --

pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let added = toggle_reaction_in(&state, &identity, message_id, &req.emoji).await?;
    Ok(Json(serde_json::json!({ "added": added })))
}
