use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use concourse_api::collaborators::{InMemoryAttachmentStore, InMemoryDirectory, LoggingNotifier};
use concourse_api::identity::require_identity;
use concourse_api::state::{AppState, AppStateInner};
use concourse_api::{channels, chat_list, conversations, messages, reactions, typing};
use concourse_gateway::connection;
use concourse_gateway::dispatcher::Dispatcher;
use concourse_gateway::typing::TypingTracker;
use concourse_types::collaborators::DirectoryUser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "concourse=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("CONCOURSE_DB_PATH").unwrap_or_else(|_| "concourse.db".into());
    let host = std::env::var("CONCOURSE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CONCOURSE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = concourse_db::Database::open(&PathBuf::from(&db_path))?;

    // Collaborators. Real deployments wire their own directory,
    // notification and attachment adapters here.
    let directory = Arc::new(load_directory()?);

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        dispatcher: Dispatcher::new(),
        typing: TypingTracker::new(),
        directory,
        notifier: Arc::new(LoggingNotifier),
        attachments: Arc::new(InMemoryAttachmentStore::new()),
    });

    // Routes
    let api_routes = Router::new()
        .route(
            "/channels",
            get(channels::list_channels).post(channels::create_channel),
        )
        .route("/channels/{channel_id}/join", post(channels::join_channel))
        .route("/channels/{channel_id}/leave", post(channels::leave_channel))
        .route(
            "/channels/{channel_id}/deactivate",
            post(channels::deactivate_channel),
        )
        .route(
            "/channels/{channel_id}/pins/{message_id}",
            post(channels::pin_message).delete(channels::unpin_message),
        )
        .route(
            "/channels/{channel_id}/messages",
            get(messages::get_channel_messages).post(messages::send_channel_message),
        )
        .route(
            "/channels/{channel_id}/typing",
            get(typing::get_channel_typing),
        )
        .route(
            "/channels/{channel_id}/read",
            post(chat_list::mark_channel_read),
        )
        .route("/conversations", post(conversations::open_conversation))
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::get_conversation_messages).post(messages::send_conversation_message),
        )
        .route(
            "/conversations/{conversation_id}/typing",
            get(typing::get_conversation_typing),
        )
        .route(
            "/conversations/{conversation_id}/read",
            post(chat_list::mark_conversation_read),
        )
        .route(
            "/messages/{message_id}/reactions",
            post(reactions::toggle_reaction),
        )
        .route("/chat-list", get(chat_list::get_chat_list))
        .layer(middleware::from_fn_with_state(state.clone(), require_identity))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let app = Router::new()
        .merge(api_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Concourse server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.dispatcher.clone(),
            state.typing.clone(),
            state.directory.clone(),
        )
    })
}

/// The user directory is an external collaborator. When
/// `CONCOURSE_DIRECTORY` points at a JSON roster we load it; otherwise a
/// tiny fixed dev roster keeps a fresh checkout usable.
fn load_directory() -> anyhow::Result<InMemoryDirectory> {
    let directory = InMemoryDirectory::new();

    match std::env::var("CONCOURSE_DIRECTORY") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)?;
            let users: Vec<DirectoryUser> = serde_json::from_str(&raw)?;
            info!("Loaded {} directory users from {}", users.len(), path);
            for user in users {
                directory.insert(user);
            }
        }
        Err(_) => {
            warn!("CONCOURSE_DIRECTORY not set, seeding the dev roster");
            for (seq, handle) in [(1u128, "alice"), (2, "bob")] {
                directory.insert(DirectoryUser {
                    id: Uuid::from_u128(seq),
                    handle: handle.to_string(),
                    display_name: handle.to_string(),
                    email: format!("{handle}@concourse.local"),
                    avatar_url: None,
                    role: "staff".to_string(),
                    online: false,
                    last_seen_at: None,
                });
            }
        }
    }

    Ok(directory)
}
