use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use concourse_types::models::ContainerRef;

use crate::error::ApiError;
use crate::identity::Identity;
use crate::messages::check_view_access;
use crate::state::AppState;

/// Live typing indicators for a container. Start/stop flow through the
/// gateway commands; this read path exists for clients catching up after a
/// reconnect. Expired indicators are filtered out by the tracker.
pub async fn get_channel_typing(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let container = ContainerRef::Channel(channel_id);
    check_view_access(&state.db, container, identity.user_id)?;
    Ok(Json(state.typing.typing_in(container).await))
}

pub async fn get_conversation_typing(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let container = ContainerRef::Direct(conversation_id);
    check_view_access(&state.db, container, identity.user_id)?;
    Ok(Json(state.typing.typing_in(container).await))
}
