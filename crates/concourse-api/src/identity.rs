use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::state::AppState;

/// The session user attached to every authenticated request.
///
/// Session issuance and verification live in the auth collaborator outside
/// this core; by the time a request reaches us, the surrounding layer has
/// established who is calling and passes it as the `X-User-Id` header. The
/// middleware still refuses ids the user directory does not know.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub handle: String,
    pub display_name: String,
}

pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let user_id: Uuid = req
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let user = state
        .directory
        .get(user_id)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(Identity {
        user_id: user.id,
        handle: user.handle,
        display_name: user.display_name,
    });
    Ok(next.run(req).await)
}
