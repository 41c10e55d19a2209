mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{State, WebSocketUpgrade},
    http::{HeaderValue, Method, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use talkalot_api::mail::{Mailer, NoopMailer, ResendMailer};
use talkalot_api::middleware::{require_auth, require_socket_auth};
use talkalot_api::storage::{DisabledImageStore, HttpImageStore, ImageStore};
use talkalot_api::{AppState, AppStateInner, auth, messages};
use talkalot_types::api::UserPublic;
use talkalot_gateway::connection;
use talkalot_gateway::dispatcher::Dispatcher;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "talkalot=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database; an unopenable store is fatal
    let db = talkalot_db::Database::open(&PathBuf::from(&config.database_path))?;

    // Collaborators
    let mailer: Arc<dyn Mailer> = match (&config.resend_api_key, &config.email_from) {
        (Some(key), Some(from)) => Arc::new(ResendMailer::new(
            key.clone(),
            from.clone(),
            config.email_from_name.clone(),
        )),
        _ => {
            warn!("RESEND_API_KEY not set, welcome emails disabled");
            Arc::new(NoopMailer)
        }
    };

    let images: Arc<dyn ImageStore> = match &config.storage_upload_url {
        Some(url) => Arc::new(HttpImageStore::new(url.clone())),
        None => {
            warn!("STORAGE_UPLOAD_URL not set, image uploads disabled");
            Arc::new(DisabledImageStore)
        }
    };

    // Shared state
    let dispatcher = Dispatcher::new();
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        secure_cookies: config.app_env.secure_cookies(),
        client_url: config.client_url.clone(),
        mailer,
        images,
        dispatcher,
    });

    let app = build_router(state, &config.client_url)?;

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Talkalot server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState, client_url: &str) -> anyhow::Result<Router> {
    let public_routes = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/check", get(auth::check))
        .route("/api/auth/update-profile", put(auth::update_profile))
        .route("/api/messages/contacts", get(messages::get_contacts))
        .route("/api/messages/chats", get(messages::get_chat_partners))
        .route("/api/messages/{id}", get(messages::get_conversation))
        .route("/api/messages/send/{id}", post(messages::send_message))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/socket", get(ws_upgrade))
        .layer(middleware::from_fn_with_state(state.clone(), require_socket_auth))
        .with_state(state);

    // Cookie auth needs credentialed CORS, so the origin is pinned to the
    // configured frontend rather than wildcarded.
    let cors = CorsLayer::new()
        .allow_origin(client_url.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    Ok(Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

/// The session was already validated by `require_socket_auth`; only an
/// authenticated user gets as far as negotiating the upgrade.
async fn ws_upgrade(
    State(state): State<AppState>,
    Extension(user): Extension<UserPublic>,
    ws: WebSocketUpgrade,
) -> Response {
    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, dispatcher, user.id, user.full_name)
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn test_router() -> Router {
        let state: AppState = Arc::new(AppStateInner {
            db: talkalot_db::Database::open_in_memory().unwrap(),
            jwt_secret: "test-secret".into(),
            secure_cookies: false,
            client_url: "http://localhost:5173".into(),
            mailer: Arc::new(NoopMailer),
            images: Arc::new(DisabledImageStore),
            dispatcher: Dispatcher::new(),
        });
        build_router(state, "http://localhost:5173").unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn signup_session_reaches_protected_routes() {
        let app = test_router();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/signup",
                json!({ "fullName": "Jane Doe", "email": "jane@example.com", "password": "abcdef" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        let body = body_json(response).await;
        assert_eq!(body["fullName"], "Jane Doe");
        assert!(body.get("password").is_none());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/messages/contacts")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn protected_routes_reject_missing_session() {
        let app = test_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/messages/contacts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Acesso negado. Token não fornecido.");
    }

    #[tokio::test]
    async fn socket_handshake_rejects_missing_session() {
        let app = test_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/socket")
                    .header(header::UPGRADE, "websocket")
                    .header(header::CONNECTION, "upgrade")
                    .header(header::SEC_WEBSOCKET_VERSION, "13")
                    .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_clears_cookie_without_a_session() {
        let app = test_router();

        let response = app
            .oneshot(json_request("POST", "/api/auth/logout", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.starts_with("jwt=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
