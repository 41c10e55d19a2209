pub mod auth;
pub mod error;
pub mod mail;
pub mod messages;
pub mod middleware;
pub mod password;
pub mod storage;
pub mod token;

use std::sync::Arc;

use anyhow::anyhow;
use uuid::Uuid;

use talkalot_db::Database;
use talkalot_db::models::UserRow;
use talkalot_gateway::dispatcher::Dispatcher;
use talkalot_types::api::UserPublic;

use crate::error::ApiError;
use crate::mail::Mailer;
use crate::storage::ImageStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    /// Secure attribute on the session cookie; on in production.
    pub secure_cookies: bool,
    /// Frontend origin, linked from the welcome email.
    pub client_url: String,
    pub mailer: Arc<dyn Mailer>,
    pub images: Arc<dyn ImageStore>,
    pub dispatcher: Dispatcher,
}


/// Strip a user row down to its client-visible fields. The password hash
/// stops here; a row with a corrupt id is a server fault, not a client one.
pub(crate) fn to_public(row: UserRow) -> Result<UserPublic, ApiError> {
    let id = row
        .id
        .parse::<Uuid>()
        .map_err(|e| ApiError::Dependency(anyhow!("corrupt user id '{}': {}", row.id, e)))?;
    Ok(UserPublic {
        id,
        full_name: row.full_name,
        email: row.email,
        profile_pic: row.profile_pic,
    })
}
