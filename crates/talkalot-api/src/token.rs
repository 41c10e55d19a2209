//! Session token issuance and the cookie that carries it.

use anyhow::Result;
use axum::http::{HeaderMap, header};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use talkalot_types::api::Claims;

/// Cookie the session token travels in.
pub const SESSION_COOKIE: &str = "jwt";

/// Sessions last 7 days; the JWT expiry and the cookie Max-Age agree.
const SESSION_TTL_DAYS: i64 = 7;

/// Mint a signed token carrying only the user id and an expiry.
pub fn issue(secret: &str, user_id: Uuid) -> Result<String> {
    let claims = Claims {
        sub: user_id,
        exp: (Utc::now() + Duration::days(SESSION_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Verify signature and expiry, returning the claims.
pub fn verify(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// Build the Set-Cookie value for a fresh session. HttpOnly keeps the token
/// away from page scripts; SameSite=Strict keeps cross-site requests from
/// attaching it; Secure is on in production deployments.
pub fn session_cookie(token: &str, secure: bool) -> String {
    let max_age = SESSION_TTL_DAYS * 24 * 60 * 60;
    let secure_attr = if secure { "; Secure" } else { "" };
    format!(
        "{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Strict; Max-Age={max_age}{secure_attr}"
    )
}

/// Build the Set-Cookie value that clears the session (empty value,
/// zero Max-Age).
pub fn clear_session_cookie(secure: bool) -> String {
    let secure_attr = if secure { "; Secure" } else { "" };
    format!("{SESSION_COOKIE}=; HttpOnly; Path=/; SameSite=Strict; Max-Age=0{secure_attr}")
}

/// Pull one cookie's value out of the request headers.
pub fn cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in raw.split(';') {
        let trimmed = part.trim();
        let Some((name, value)) = trimmed.split_once('=') else {
            continue;
        };
        if name == cookie_name {
            return Some(value.to_string());
        }
    }
    None
}
