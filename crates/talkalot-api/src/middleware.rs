//! Session validation for HTTP routes and the socket handshake.

use anyhow::anyhow;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use talkalot_types::api::UserPublic;

use crate::error::ApiError;
use crate::{AppState, to_public, token};

/// Validate the session cookie and attach the logged-in user to the
/// request. Protected routes read it back with `Extension<UserPublic>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = load_session_user(&state, req.headers()).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Socket-handshake variant of the session check. Same rules as
/// `require_auth`, but each rejection is logged with its reason, and it
/// runs before the upgrade itself is negotiated: a connection that fails
/// here is never admitted to the dispatcher.
pub async fn require_socket_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authenticate_socket(&state, req.headers()).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

pub async fn authenticate_socket(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<UserPublic, ApiError> {
    match load_session_user(state, headers).await {
        Ok(user) => {
            tracing::info!("Socket authenticated for {} ({})", user.full_name, user.id);
            Ok(user)
        }
        Err(err) => {
            warn!("Socket connection rejected - {}", err);
            Err(err)
        }
    }
}

async fn load_session_user(state: &AppState, headers: &HeaderMap) -> Result<UserPublic, ApiError> {
    let token = token::cookie_value(headers, token::SESSION_COOKIE)
        .ok_or_else(|| ApiError::Unauthorized("Acesso negado. Token não fornecido.".into()))?;

    let claims = token::verify(&state.jwt_secret, &token)
        .map_err(|_| ApiError::Unauthorized("Token inválido.".into()))?;

    // Run the blocking DB lookup off the async runtime
    let db = state.clone();
    let user_id = claims.sub.to_string();
    let row = tokio::task::spawn_blocking(move || db.db.get_user_by_id(&user_id))
        .await
        .map_err(|e| ApiError::Dependency(anyhow!("spawn_blocking join error: {}", e)))?
        .map_err(ApiError::Dependency)?
        .ok_or_else(|| ApiError::NotFound("Usuário não encontrado.".into()))?;

    to_public(row)
}
