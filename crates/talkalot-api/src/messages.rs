//! Direct-message endpoints. Identity comes from the session middleware.

use anyhow::anyhow;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use tracing::warn;
use uuid::Uuid;

use talkalot_db::models::MessageRow;
use talkalot_types::api::{MessageResponse, SendMessageRequest, UserPublic};
use talkalot_types::events::GatewayEvent;

use crate::error::ApiError;
use crate::{AppState, to_public};

/// Everyone except the logged-in user.
pub async fn get_contacts(
    State(state): State<AppState>,
    Extension(user): Extension<UserPublic>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let my_id = user.id.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.list_users_except(&my_id))
        .await
        .map_err(|e| ApiError::Dependency(anyhow!("spawn_blocking join error: {}", e)))?
        .map_err(ApiError::Dependency)?;

    let contacts = rows.into_iter().map(to_public).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(contacts))
}

/// Users the logged-in user has messaged with, in either direction.
pub async fn get_chat_partners(
    State(state): State<AppState>,
    Extension(user): Extension<UserPublic>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let my_id = user.id.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.get_chat_partners(&my_id))
        .await
        .map_err(|e| ApiError::Dependency(anyhow!("spawn_blocking join error: {}", e)))?
        .map_err(ApiError::Dependency)?;

    let partners = rows.into_iter().map(to_public).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(partners))
}

/// Message history with one other user, oldest first.
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<UserPublic>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let other_id = parse_user_id(&id)?;

    let db = state.clone();
    let my_id = user.id.to_string();
    let other = other_id.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.get_conversation(&my_id, &other))
        .await
        .map_err(|e| ApiError::Dependency(anyhow!("spawn_blocking join error: {}", e)))?
        .map_err(ApiError::Dependency)?;

    let messages: Vec<MessageResponse> = rows.into_iter().map(message_from_row).collect();
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(user): Extension<UserPublic>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receiver_id = parse_user_id(&id)?;

    if receiver_id == user.id {
        return Err(ApiError::Validation(
            "Não é possível enviar mensagem para si mesmo".into(),
        ));
    }

    let text = req.text.filter(|t| !t.is_empty());
    let image = req.image.filter(|i| !i.is_empty());
    if text.is_none() && image.is_none() {
        return Err(ApiError::Validation("Mensagem deve conter texto ou imagem".into()));
    }

    let db = state.clone();
    let lookup = receiver_id.to_string();
    let receiver = tokio::task::spawn_blocking(move || db.db.get_user_by_id(&lookup))
        .await
        .map_err(|e| ApiError::Dependency(anyhow!("spawn_blocking join error: {}", e)))?
        .map_err(ApiError::Dependency)?;
    if receiver.is_none() {
        return Err(ApiError::NotFound("Destinatário não encontrado".into()));
    }

    // The image goes to object storage first; only its public URL is persisted
    let image_url = match &image {
        Some(payload) => Some(state.images.upload(payload).await?),
        None => None,
    };

    let message_id = Uuid::new_v4();

    // Run the blocking DB insert off the async runtime
    let db = state.clone();
    let sender = user.id.to_string();
    let receiver = receiver_id.to_string();
    let stored_text = text.clone();
    let stored_image = image_url.clone();
    tokio::task::spawn_blocking(move || {
        db.db.insert_message(
            &message_id.to_string(),
            &sender,
            &receiver,
            stored_text.as_deref(),
            stored_image.as_deref(),
        )
    })
    .await
    .map_err(|e| ApiError::Dependency(anyhow!("spawn_blocking join error: {}", e)))?
    .map_err(ApiError::Dependency)?;

    let now = chrono::Utc::now();

    // Deliver to the receiver's live connection, if any
    state
        .dispatcher
        .send_to_user(
            receiver_id,
            GatewayEvent::NewMessage {
                id: message_id,
                sender_id: user.id,
                receiver_id,
                text: text.clone(),
                image: image_url.clone(),
                created_at: now,
            },
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            id: message_id,
            sender_id: user.id,
            receiver_id,
            text,
            image: image_url,
            created_at: now,
        }),
    ))
}

fn parse_user_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse::<Uuid>()
        .map_err(|_| ApiError::Validation("ID de destinatário inválido".into()))
}

fn message_from_row(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt message id '{}': {}", row.id, e);
            Uuid::default()
        }),
        sender_id: row.sender_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt sender_id '{}' on message '{}': {}", row.sender_id, row.id, e);
            Uuid::default()
        }),
        receiver_id: row.receiver_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt receiver_id '{}' on message '{}': {}", row.receiver_id, row.id, e);
            Uuid::default()
        }),
        text: row.text,
        image: row.image,
        created_at: row
            .created_at
            .parse::<chrono::DateTime<chrono::Utc>>()
            .or_else(|_| {
                // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
                // Parse as naive UTC and convert.
                chrono::NaiveDateTime::parse_from_str(&row.created_at, "%Y-%m-%d %H:%M:%S")
                    .map(|ndt| ndt.and_utc())
            })
            .unwrap_or_else(|e| {
                warn!("Corrupt created_at '{}' on message '{}': {}", row.created_at, row.id, e);
                chrono::DateTime::default()
            }),
    }
}
