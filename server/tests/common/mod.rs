//! Shared fixtures for integration tests

use axum::{Router, routing::get};
use slidecast_server::auth::ConnectionIdentity;
use slidecast_server::config::Config;
use slidecast_server::protocol::ServerMessage;
use slidecast_server::server::{AppState, ws_handler};
use slidecast_server::store::{
    MemoryPresentationStore, MemorySlideStore, Presentation, PresentationStore, SlideStore,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct TestContext {
    pub state: AppState,
    pub presentations: Arc<MemoryPresentationStore>,
    pub slides: Arc<MemorySlideStore>,
}

impl TestContext {
    pub fn new() -> Self {
        let presentations = Arc::new(MemoryPresentationStore::new());
        let slides = Arc::new(MemorySlideStore::new());
        let presentation_store: Arc<dyn PresentationStore> = presentations.clone();
        let slide_store: Arc<dyn SlideStore> = slides.clone();
        let state = AppState::new(&Config::default(), presentation_store, slide_store);
        Self {
            state,
            presentations,
            slides,
        }
    }

    /// Seed a presentation record plus its slide count
    pub async fn seed_presentation(
        &self,
        id: &str,
        access_code: &str,
        presenter_id: &str,
        is_active: bool,
        total_slides: u32,
    ) {
        self.presentations
            .insert(Presentation {
                id: id.to_string(),
                access_code: access_code.to_string(),
                presenter_id: presenter_id.to_string(),
                title: format!("Presentation {}", id),
                is_active,
                current_slide_index: 0,
                expires_at: None,
            })
            .await;
        self.slides.set_count(id, total_slides).await;
    }

    /// Register a fake connection and return its id plus outbound receiver
    pub fn connect(&self) -> (Uuid, mpsc::Receiver<ServerMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(16);
        self.state.rooms.register_connection(id, tx);
        (id, rx)
    }

    /// Router exposing the WebSocket endpoint, as `main` wires it
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .with_state(self.state.clone())
    }

    /// Bind an ephemeral port and serve the router for real WS handshakes
    pub async fn spawn_server(&self) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let router = self.router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        addr
    }
}

/// Anonymous participant identity for driving flows directly
pub fn anonymous_identity() -> ConnectionIdentity {
    ConnectionIdentity::Participant {
        participant_id: "anon-fixture1".to_string(),
        display_name: "CalmOtter33".to_string(),
        is_anonymous: true,
    }
}

pub fn presenter_identity(principal: &str) -> ConnectionIdentity {
    ConnectionIdentity::Presenter {
        principal_id: principal.to_string(),
    }
}

/// Drain a receiver until it would block, returning everything received
pub fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        messages.push(msg);
    }
    messages
}

/// Secret matching `Config::default()`
pub const TOKEN_SECRET: &str = "dev-secret-change-me";

/// Mint a signed token the way the (out-of-scope) issuer would
pub fn make_token(role: &str, sub: &str) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let claims = slidecast_server::auth::Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        name: None,
        iat: now,
        exp: now + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TOKEN_SECRET.as_bytes()),
    )
    .unwrap()
}
