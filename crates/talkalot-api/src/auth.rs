//! Account creation and session endpoints.

use std::sync::OnceLock;

use anyhow::anyhow;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{AppendHeaders, IntoResponse};
use axum::{Extension, Json};
use regex::Regex;
use tracing::error;
use uuid::Uuid;

use talkalot_types::api::{LoginRequest, SignupRequest, UpdateProfileRequest, UserPublic};

use crate::error::ApiError;
use crate::{AppState, password, to_public, token};

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex compiles"))
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let full_name = req.full_name.as_deref().unwrap_or("").trim().to_string();
    let email = req.email.as_deref().unwrap_or("").trim().to_string();
    let password = req.password.unwrap_or_default();

    // Validate input
    if full_name.is_empty() || email.is_empty() || password.trim().is_empty() {
        return Err(ApiError::Validation("Por favor, preencha todos os campos.".into()));
    }
    if password.len() < 6 {
        return Err(ApiError::Validation("A senha deve ter pelo menos 6 caracteres.".into()));
    }
    if !email_regex().is_match(&email) {
        return Err(ApiError::Validation("Por favor, insira um email válido.".into()));
    }

    // Check if the email is taken
    if state.db.get_user_by_email(&email)?.is_some() {
        return Err(ApiError::Conflict("Este email já está em uso.".into()));
    }

    let digest = password::hash(&password)?;
    let user_id = Uuid::new_v4();

    state.db.create_user(&user_id.to_string(), &email, &full_name, &digest)?;
    let row = state
        .db
        .get_user_by_id(&user_id.to_string())?
        .ok_or_else(|| ApiError::Dependency(anyhow!("user {} missing after insert", user_id)))?;
    let user = to_public(row)?;

    let token = token::issue(&state.jwt_secret, user_id)?;
    let cookie = token::session_cookie(&token, state.secure_cookies);

    // The welcome email is best-effort and detached: by the time it runs the
    // 201 below is already committed, and a delivery failure only reaches
    // the log.
    let mailer = state.mailer.clone();
    let to = user.email.clone();
    let name = user.full_name.clone();
    let client_url = state.client_url.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer.send_welcome(&to, &name, &client_url).await {
            error!("Failed to send welcome email to {}: {:#}", to, e);
        }
    });

    Ok((
        StatusCode::CREATED,
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(user),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.as_deref().unwrap_or("").trim().to_string();
    let password = req.password.unwrap_or_default();

    // One error for both unknown email and wrong password
    let row = state
        .db
        .get_user_by_email(&email)?
        .ok_or(ApiError::InvalidCredentials)?;

    if !password::verify(&password, &row.password) {
        return Err(ApiError::InvalidCredentials);
    }

    let user = to_public(row)?;
    let token = token::issue(&state.jwt_secret, user.id)?;
    let cookie = token::session_cookie(&token, state.secure_cookies);

    Ok((AppendHeaders([(header::SET_COOKIE, cookie)]), Json(user)))
}

/// Clears the session cookie. Works with or without a live session.
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = token::clear_session_cookie(state.secure_cookies);
    (
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(serde_json::json!({ "message": "Logout realizado com sucesso." })),
    )
}

/// Session-restore probe: echoes the user the middleware resolved.
pub async fn check(Extension(user): Extension<UserPublic>) -> impl IntoResponse {
    Json(user)
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<UserPublic>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let image = req.profile_pic.as_deref().map(str::trim).unwrap_or("");
    if image.is_empty() {
        return Err(ApiError::Validation("A foto de perfil é obrigatória.".into()));
    }

    let url = state.images.upload(image).await?;

    let row = state
        .db
        .update_profile_pic(&user.id.to_string(), &url)?
        .ok_or_else(|| ApiError::NotFound("Usuário não encontrado.".into()))?;

    Ok(Json(to_public(row)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::HeaderMap;
    use serde_json::{Value, json};

    use crate::testing::{FailingMailer, FakeImageStore, state, state_with};

    fn signup_req(full_name: &str, email: &str, password: &str) -> SignupRequest {
        serde_json::from_value(json!({
            "fullName": full_name,
            "email": email,
            "password": password,
        }))
        .unwrap()
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        serde_json::from_value(json!({ "email": email, "password": password })).unwrap()
    }

    async fn response_parts(response: axum::response::Response) -> (StatusCode, HeaderMap, Value) {
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, headers, json)
    }

    #[tokio::test]
    async fn signup_creates_user_and_session() {
        let state = state();

        let result = signup(
            State(state.clone()),
            Json(signup_req("Jane Doe", "jane@example.com", "abcdef")),
        )
        .await;
        let (status, headers, body) = response_parts(result.into_response()).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["fullName"], "Jane Doe");
        assert_eq!(body["email"], "jane@example.com");
        assert_eq!(body["profilePic"], "");
        assert!(body.get("password").is_none());

        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("jwt="));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(cookie.contains("HttpOnly"));

        // The stored digest is not the plaintext
        let row = state.db.get_user_by_email("jane@example.com").unwrap().unwrap();
        assert_ne!(row.password, "abcdef");
    }

    #[tokio::test]
    async fn signup_rejects_blank_fields() {
        let state = state();
        for (name, email, pass) in [
            ("", "jane@example.com", "abcdef"),
            ("Jane Doe", "", "abcdef"),
            ("Jane Doe", "jane@example.com", ""),
            ("   ", "jane@example.com", "abcdef"),
        ] {
            let err = signup(State(state.clone()), Json(signup_req(name, email, pass)))
                .await
                .err()
                .expect("blank field must be rejected");
            assert_eq!(err.to_string(), "Por favor, preencha todos os campos.");
        }
    }

    #[tokio::test]
    async fn signup_rejects_short_password() {
        let state = state();
        let err = signup(
            State(state),
            Json(signup_req("Jane Doe", "jane@example.com", "abcde")),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.to_string(), "A senha deve ter pelo menos 6 caracteres.");
    }

    #[tokio::test]
    async fn signup_rejects_malformed_emails() {
        let state = state();
        for email in ["plainaddress", "no-at.example.com", "a@nodot", "a b@c.co", "a@b c.co"] {
            let err = signup(State(state.clone()), Json(signup_req("Jane Doe", email, "abcdef")))
                .await
                .err()
                .unwrap_or_else(|| panic!("email '{}' must be rejected", email));
            assert_eq!(err.to_string(), "Por favor, insira um email válido.");
        }
    }

    #[tokio::test]
    async fn signup_rejects_duplicate_email() {
        let state = state();
        signup(
            State(state.clone()),
            Json(signup_req("Jane Doe", "jane@example.com", "abcdef")),
        )
        .await
        .ok()
        .unwrap();

        let err = signup(
            State(state),
            Json(signup_req("Other Jane", "jane@example.com", "different-pass")),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Este email já está em uso.");
    }

    #[tokio::test]
    async fn signup_succeeds_even_when_welcome_mail_fails() {
        let state = state_with(Arc::new(FailingMailer), Arc::new(FakeImageStore));

        let result = signup(
            State(state),
            Json(signup_req("Jane Doe", "jane@example.com", "abcdef")),
        )
        .await;
        let (status, _, _) = response_parts(result.into_response()).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn login_happy_path_sets_cookie() {
        let state = state();
        signup(
            State(state.clone()),
            Json(signup_req("Jane Doe", "jane@example.com", "abcdef")),
        )
        .await
        .ok()
        .unwrap();

        let result = login(State(state), Json(login_req("jane@example.com", "abcdef"))).await;
        let (status, headers, body) = response_parts(result.into_response()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "jane@example.com");
        assert!(body.get("password").is_none());
        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("jwt="));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let state = state();
        signup(
            State(state.clone()),
            Json(signup_req("Jane Doe", "jane@example.com", "abcdef")),
        )
        .await
        .ok()
        .unwrap();

        let unknown_email = login(
            State(state.clone()),
            Json(login_req("nobody@example.com", "abcdef")),
        )
        .await
        .err()
        .unwrap();
        let wrong_password = login(
            State(state),
            Json(login_req("jane@example.com", "wrong-pass")),
        )
        .await
        .err()
        .unwrap();

        assert_eq!(unknown_email.status(), StatusCode::BAD_REQUEST);
        assert_eq!(wrong_password.status(), StatusCode::BAD_REQUEST);
        assert_eq!(unknown_email.to_string(), wrong_password.to_string());
    }

    #[tokio::test]
    async fn logout_always_clears_the_cookie() {
        let state = state();

        // No prior session needed
        let (status, headers, body) = response_parts(logout(State(state)).await.into_response()).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].is_string());
        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("jwt=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn update_profile_stores_the_uploaded_url() {
        let state = state();
        let result = signup(
            State(state.clone()),
            Json(signup_req("Jane Doe", "jane@example.com", "abcdef")),
        )
        .await;
        let (_, _, body) = response_parts(result.into_response()).await;
        let user: UserPublic = serde_json::from_value(body).unwrap();

        let req: UpdateProfileRequest =
            serde_json::from_value(json!({ "profilePic": "aGVsbG8=" })).unwrap();
        let result = update_profile(State(state.clone()), Extension(user), Json(req)).await;
        let (status, _, body) = response_parts(result.into_response()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profilePic"], "https://cdn.example.com/fake.png");

        let row = state.db.get_user_by_email("jane@example.com").unwrap().unwrap();
        assert_eq!(row.profile_pic, "https://cdn.example.com/fake.png");
    }

    #[tokio::test]
    async fn update_profile_requires_an_image() {
        let state = state();
        let user = UserPublic {
            id: Uuid::new_v4(),
            full_name: "Jane Doe".into(),
            email: "jane@example.com".into(),
            profile_pic: String::new(),
        };

        let req: UpdateProfileRequest = serde_json::from_value(json!({})).unwrap();
        let err = update_profile(State(state), Extension(user), Json(req))
            .await
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "A foto de perfil é obrigatória.");
    }
}
