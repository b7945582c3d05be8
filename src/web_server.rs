use std::{convert::Infallible, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, Request, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, patch, post, put},
    serve, Json, Router,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::Deserialize;
use thiserror::Error;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::app_state::{AppState, StateEvent, StateSnapshot};
use crate::constants::{LOGIN_FAILED_PATH, OAUTH_CALLBACK_PATH};
use crate::error::{GatewayError, RegistryError, SendError};
use crate::gateway::Provider;
use crate::messages::ChatMessage;
use crate::registry::{ChatId, ChatItem};
use crate::session::UserInfo;

/// Where the server finds its page template and static assets.
#[derive(Debug, Clone)]
pub struct WebOptions {
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
}

impl Default for WebOptions {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            static_dir: PathBuf::from("static"),
        }
    }
}

#[derive(Clone)]
struct WebState {
    app: AppState,
    templates: Arc<AutoReloader>,
}

#[derive(Debug, Error)]
enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("sign in to change settings")]
    Unauthorized,

    #[error("no chat with id {0}")]
    ChatNotFound(ChatId),

    #[error("failed to render page: {0}")]
    Template(#[from] minijinja::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Registry(_) | ApiError::ChatNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Send(SendError::EmptyMessage) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Send(SendError::ReplyPending) => StatusCode::CONFLICT,
            ApiError::Gateway(GatewayError::MissingConfig(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Gateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: PathBuf) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        // Watch the templates directory for changes
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

#[derive(Debug, Deserialize)]
struct IndexQuery {
    login: Option<String>,
}

async fn index_handler(
    State(state): State<WebState>,
    Query(query): Query<IndexQuery>,
) -> ApiResult<Html<String>> {
    let snapshot = state.app.snapshot().await;
    let env = state.templates.acquire_env()?;
    let tmpl = env.get_template("index.html")?;
    let active_title = snapshot.active_chat().map(|c| c.title.clone());
    let display_name = snapshot
        .logged_in_user
        .as_ref()
        .map(|u| u.display_name().to_string());
    let html = tmpl.render(minijinja::context! {
        title => "Cairo Pilot",
        state => snapshot,
        active_title => active_title,
        display_name => display_name,
        login_failed => query.login.as_deref() == Some("failed"),
    })?;
    Ok(Html(html))
}

async fn state_handler(State(state): State<WebState>) -> Json<StateSnapshot> {
    Json(state.app.snapshot().await)
}

// --- Authentication ---

async fn login_handler(
    State(state): State<WebState>,
    Json(user): Json<UserInfo>,
) -> Json<StateSnapshot> {
    state.app.login(user).await;
    Json(state.app.snapshot().await)
}

async fn logout_handler(State(state): State<WebState>) -> Json<StateSnapshot> {
    state.app.logout().await;
    Json(state.app.snapshot().await)
}

async fn resync_handler(State(state): State<WebState>) -> Json<StateSnapshot> {
    state.app.resync().await;
    Json(state.app.snapshot().await)
}

#[derive(Debug, Deserialize)]
struct ApiKeyBody {
    key: String,
}

async fn api_key_handler(
    State(state): State<WebState>,
    Json(body): Json<ApiKeyBody>,
) -> ApiResult<StatusCode> {
    if !state.app.auth().snapshot().await.is_authenticated() {
        return Err(ApiError::Unauthorized);
    }
    state.app.save_api_key(body.key).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn oauth_handler(
    State(state): State<WebState>,
    Path(provider): Path<Provider>,
) -> ApiResult<Redirect> {
    info!(%provider, "Initiating OAuth login");
    let url = state.app.oauth_url(provider)?;
    Ok(Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
    secret: Option<String>,
}

async fn oauth_callback_handler(
    State(state): State<WebState>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let (Some(user_id), Some(secret)) = (query.user_id, query.secret) else {
        warn!("OAuth callback without token");
        return Redirect::to(LOGIN_FAILED_PATH);
    };
    match state.app.complete_oauth(&user_id, &secret).await {
        Ok(()) => Redirect::to("/"),
        Err(e) => {
            error!("OAuth login failed: {}", e);
            Redirect::to(LOGIN_FAILED_PATH)
        }
    }
}

// --- Chats ---

async fn create_chat_handler(State(state): State<WebState>) -> (StatusCode, Json<ChatItem>) {
    (StatusCode::CREATED, Json(state.app.new_chat().await))
}

#[derive(Debug, Deserialize)]
struct RenameBody {
    title: String,
}

async fn rename_chat_handler(
    State(state): State<WebState>,
    Path(id): Path<ChatId>,
    Json(body): Json<RenameBody>,
) -> ApiResult<StatusCode> {
    if !state.app.rename_chat(id, body.title).await {
        return Err(ApiError::ChatNotFound(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_chat_handler(
    State(state): State<WebState>,
    Path(id): Path<ChatId>,
) -> ApiResult<StatusCode> {
    if !state.app.delete_chat(id).await {
        return Err(ApiError::ChatNotFound(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn select_chat_handler(
    State(state): State<WebState>,
    Path(id): Path<ChatId>,
) -> ApiResult<Json<ChatItem>> {
    Ok(Json(state.app.select_chat(id).await?))
}

// --- Messages ---

#[derive(Debug, Deserialize)]
struct SendBody {
    text: String,
}

async fn send_message_handler(
    State(state): State<WebState>,
    Json(body): Json<SendBody>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    let message = state.app.spawn_send_message(&body.text).await?;
    Ok((StatusCode::ACCEPTED, Json(message)))
}

// --- WebSocket ---

/// Intents a connected page may send over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientCommand {
    Send { text: String },
    NewChat,
    Select { id: ChatId },
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state.app))
}

async fn send_event(socket: &mut SplitSink<WebSocket, Message>, event: &StateEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize state event: {}", e);
            true
        }
    }
}

async fn handle_command(app: &AppState, text: &str) -> Option<StateEvent> {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            warn!("Unrecognized client message: {}", e);
            return Some(StateEvent::Info {
                message: format!("Unrecognized message: {}", e),
            });
        }
    };
    let outcome = match command {
        ClientCommand::Send { text } => app
            .spawn_send_message(&text)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string()),
        ClientCommand::NewChat => {
            app.new_chat().await;
            Ok(())
        }
        ClientCommand::Select { id } => app
            .select_chat(id)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string()),
    };
    outcome.err().map(|message| StateEvent::Info { message })
}

// Handle individual WebSocket connections
async fn handle_socket(socket: WebSocket, app: AppState) {
    info!("New WebSocket connection established");
    let mut events = app.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let welcome = StateEvent::Info {
        message: "Connected to Cairo Pilot".to_string(),
    };
    if !send_event(&mut sender, &welcome).await {
        warn!("Failed to send welcome message to new WebSocket client");
        return;
    }

    loop {
        tokio::select! {
            Ok(event) = events.recv() => {
                if !send_event(&mut sender, &event).await {
                    warn!("WebSocket client disconnected or send error. Closing connection.");
                    break;
                }
            }
            Some(Ok(msg)) = receiver.next() => {
                match msg {
                    Message::Text(text) => {
                        if let Some(reply) = handle_command(&app, &text).await {
                            if !send_event(&mut sender, &reply).await {
                                break;
                            }
                        }
                    }
                    Message::Binary(_) => warn!("Received unexpected binary message from client"),
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(_) => {
                        info!("Client requested WebSocket close");
                        break;
                    }
                }
            }
            else => {
                info!("WebSocket client disconnected");
                break;
            }
        }
    }
    info!("WebSocket connection closed");
}

/// Builds the router; separate from [`start_web_server`] so tests can drive it directly.
pub fn router(app: AppState, options: WebOptions) -> Router {
    let state = WebState {
        app,
        templates: Arc::new(create_minijinja_env(options.templates_dir)),
    };

    let not_found = tower::service_fn(|_req: Request| async {
        Ok::<_, Infallible>((hyper::StatusCode::NOT_FOUND, "Not Found").into_response())
    });
    let static_files_service = ServeDir::new(options.static_dir).not_found_service(not_found);

    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/api/state", get(state_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/resync", post(resync_handler))
        .route("/api/settings/api-key", put(api_key_handler))
        .route("/api/chats", post(create_chat_handler))
        .route(
            "/api/chats/:id",
            patch(rename_chat_handler).delete(delete_chat_handler),
        )
        .route("/api/chats/:id/select", post(select_chat_handler))
        .route("/api/messages", post(send_message_handler))
        .route("/auth/oauth/:provider", get(oauth_handler))
        .route(OAUTH_CALLBACK_PATH, get(oauth_callback_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(port: u16, app: AppState, options: WebOptions) -> Result<()> {
    let router = router(app, options);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, router.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
