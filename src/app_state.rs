use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::error::{GatewayError, RegistryError, SendError};
use crate::gateway::{IdentityGateway, Provider};
use crate::messages::{ChatMessage, Epoch, MessageLog};
use crate::registry::{ChatId, ChatItem, ChatRegistry};
use crate::scope::TaskScope;
use crate::session::{AuthStore, UserInfo};
use crate::simulator::ResponseSimulator;

/// Pushed to every subscriber after a state change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "message_type", content = "payload")]
pub enum StateEvent {
    Info {
        message: String,
    },
    Auth {
        #[serde(rename = "loggedInUser")]
        logged_in_user: Option<UserInfo>,
        #[serde(rename = "loadingAuth")]
        loading_auth: bool,
    },
    Chats {
        chats: Vec<ChatItem>,
        #[serde(rename = "activeChatId")]
        active_chat_id: Option<ChatId>,
    },
    /// The log was replaced wholesale.
    Log {
        messages: Vec<ChatMessage>,
    },
    Message(ChatMessage),
    Typing {
        #[serde(rename = "isBotTyping")]
        is_bot_typing: bool,
    },
}

/// Everything a view needs to render. Never contains the API key itself.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub logged_in_user: Option<UserInfo>,
    pub loading_auth: bool,
    pub has_api_key: bool,
    pub chats: Vec<ChatItem>,
    pub active_chat_id: Option<ChatId>,
    pub messages: Vec<ChatMessage>,
    pub is_bot_typing: bool,
}

impl StateSnapshot {
    pub fn active_chat(&self) -> Option<&ChatItem> {
        let id = self.active_chat_id?;
        self.chats.iter().find(|c| c.id == id)
    }
}

/// Sidebar chats and the log of the active one, changed together.
#[derive(Debug, Default)]
pub struct ChatView {
    pub registry: ChatRegistry,
    pub log: MessageLog,
}

impl ChatView {
    pub fn new(registry: ChatRegistry) -> Self {
        let mut view = Self {
            registry,
            log: MessageLog::new(),
        };
        view.reset_log();
        view
    }

    /// Greets with the active chat's title, or empties the log when nothing is active.
    fn reset_log(&mut self) {
        match self.registry.active() {
            Some(chat) => {
                let title = chat.title.clone();
                self.log.greet(&title);
            }
            None => self.log.clear(),
        }
    }

    fn chats_event(&self) -> StateEvent {
        StateEvent::Chats {
            chats: self.registry.chats().to_vec(),
            active_chat_id: self.registry.active_id(),
        }
    }

    fn log_event(&self) -> StateEvent {
        StateEvent::Log {
            messages: self.log.messages().to_vec(),
        }
    }
}

struct Inner {
    auth: AuthStore,
    chats: RwLock<ChatView>,
    simulator: ResponseSimulator,
    scope: TaskScope,
    events: broadcast::Sender<StateEvent>,
}

/// Application state handed to every view. Cloning is cheap and shares the state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

impl AppState {
    pub fn new(gateway: Arc<dyn IdentityGateway>, simulator: ResponseSimulator) -> Self {
        Self::with_registry(gateway, simulator, ChatRegistry::seeded())
    }

    pub fn with_registry(
        gateway: Arc<dyn IdentityGateway>,
        simulator: ResponseSimulator,
        registry: ChatRegistry,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                auth: AuthStore::new(gateway),
                chats: RwLock::new(ChatView::new(registry)),
                simulator,
                scope: TaskScope::new(),
                events,
            }),
        }
    }

    pub fn auth(&self) -> &AuthStore {
        &self.inner.auth
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.inner.events.subscribe()
    }

    fn publish(&self, event: StateEvent) {
        if self.inner.events.send(event).is_err() {
            debug!("No state subscribers");
        }
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        let session = self.inner.auth.snapshot().await;
        let view = self.inner.chats.read().await;
        StateSnapshot {
            logged_in_user: session.logged_in_user,
            loading_auth: session.loading_auth,
            has_api_key: !session.api_key.is_empty(),
            chats: view.registry.chats().to_vec(),
            active_chat_id: view.registry.active_id(),
            messages: view.log.messages().to_vec(),
            is_bot_typing: view.log.is_bot_typing(),
        }
    }

    // --- Authentication ---

    async fn publish_auth(&self) {
        let session = self.inner.auth.snapshot().await;
        self.publish(StateEvent::Auth {
            logged_in_user: session.logged_in_user,
            loading_auth: session.loading_auth,
        });
    }

    pub async fn login(&self, user: UserInfo) {
        self.inner.auth.login(user).await;
        self.publish_auth().await;
    }

    pub async fn logout(&self) {
        self.inner.auth.logout().await;
        self.publish_auth().await;
    }

    pub async fn save_api_key(&self, key: impl Into<String>) {
        self.inner.auth.save_api_key(key).await;
    }

    pub async fn resync(&self) {
        self.inner.auth.resync().await;
        self.publish_auth().await;
    }

    /// Resyncs in the background; the result is dropped if the app shuts down first.
    pub fn spawn_resync(&self) -> JoinHandle<Option<()>> {
        let state = self.clone();
        self.inner.scope.spawn(async move { state.resync().await })
    }

    pub fn oauth_url(&self, provider: Provider) -> Result<String, GatewayError> {
        self.inner.auth.gateway().oauth_url(provider)
    }

    /// Finishes an OAuth redirect and picks up the new session.
    pub async fn complete_oauth(&self, user_id: &str, secret: &str) -> Result<(), GatewayError> {
        self.inner.auth.gateway().complete_oauth(user_id, secret).await?;
        self.resync().await;
        Ok(())
    }

    // --- Chats ---

    pub async fn new_chat(&self) -> ChatItem {
        let mut view = self.inner.chats.write().await;
        let chat = view.registry.create().clone();
        view.reset_log();
        self.publish(view.chats_event());
        self.publish(view.log_event());
        info!(chat_id = %chat.id, title = %chat.title, "New chat");
        chat
    }

    pub async fn rename_chat(&self, id: ChatId, title: impl Into<String>) -> bool {
        let mut view = self.inner.chats.write().await;
        let renamed = view.registry.rename(id, title);
        if renamed {
            self.publish(view.chats_event());
        }
        renamed
    }

    pub async fn delete_chat(&self, id: ChatId) -> bool {
        let mut view = self.inner.chats.write().await;
        let was_active = view.registry.active_id() == Some(id);
        if !view.registry.delete(id) {
            return false;
        }
        self.publish(view.chats_event());
        if was_active {
            view.reset_log();
            self.publish(view.log_event());
        }
        info!(chat_id = %id, "Deleted chat");
        true
    }

    /// Switching chats starts a fresh transcript; re-selecting the active chat keeps it.
    pub async fn select_chat(&self, id: ChatId) -> Result<ChatItem, RegistryError> {
        let mut view = self.inner.chats.write().await;
        let changed = view.registry.active_id() != Some(id);
        let chat = view.registry.select(id)?.clone();
        if changed {
            view.reset_log();
            self.publish(view.chats_event());
            self.publish(view.log_event());
        }
        Ok(chat)
    }

    // --- Messages ---

    async fn begin_send(&self, text: &str) -> Result<(ChatMessage, Epoch), SendError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SendError::EmptyMessage);
        }
        let mut view = self.inner.chats.write().await;
        if view.log.is_bot_typing() {
            return Err(SendError::ReplyPending);
        }
        let message = ChatMessage::user(text);
        view.log.append(message.clone());
        let epoch = view.log.start_typing();
        self.publish(StateEvent::Message(message.clone()));
        self.publish(StateEvent::Typing { is_bot_typing: true });
        Ok((message, epoch))
    }

    async fn finish_send(&self, epoch: Epoch, reply: String) -> Option<ChatMessage> {
        let mut view = self.inner.chats.write().await;
        let message = ChatMessage::bot(reply);
        if !view.log.finish_typing(epoch, message.clone()) {
            debug!("Chat changed while replying; reply discarded");
            return None;
        }
        self.publish(StateEvent::Message(message.clone()));
        self.publish(StateEvent::Typing { is_bot_typing: false });
        Some(message)
    }

    /// Sends and waits for the reply. `Ok(None)` means the chat was switched meanwhile.
    pub async fn send_message(&self, text: &str) -> Result<Option<ChatMessage>, SendError> {
        let (message, epoch) = self.begin_send(text).await?;
        let reply = self.inner.simulator.reply(&message.text).await;
        Ok(self.finish_send(epoch, reply).await)
    }

    /// Appends the user message and replies in the background.
    pub async fn spawn_send_message(&self, text: &str) -> Result<ChatMessage, SendError> {
        let (message, epoch) = self.begin_send(text).await?;
        let state = self.clone();
        let input = message.text.clone();
        self.inner.scope.spawn(async move {
            let reply = state.inner.simulator.reply(&input).await;
            state.finish_send(epoch, reply).await;
        });
        Ok(message)
    }

    /// Cancels background work; nothing is written to the state afterwards.
    pub async fn shutdown(&self) {
        info!("Shutting down application state");
        self.inner.scope.shutdown().await;
    }
}
