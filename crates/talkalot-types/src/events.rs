use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent over the WebSocket connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the handshake was authenticated
    Ready { user_id: Uuid, full_name: String },

    /// A direct message was delivered to this user
    NewMessage {
        id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        text: Option<String>,
        image: Option<String>,
        created_at: chrono::DateTime<chrono::Utc>,
    },

    /// A user came online or went offline
    PresenceUpdate {
        user_id: Uuid,
        full_name: String,
        online: bool,
    },
}
