// Constants and environment-derived defaults.

use std::env;

/// Port the web server listens on unless `--port` says otherwise.
pub const DEFAULT_PORT: u16 = 9900;

/// How long the simulated assistant "thinks" before replying.
pub const DEFAULT_REPLY_DELAY_MS: u64 = 1500;

/// Title given to new chats, suffixed with the chat count.
pub const NEW_CHAT_TITLE_PREFIX: &str = "New Chat";

/// Chats the sidebar starts with, first one active.
pub const SEEDED_CHAT_TITLES: [&str; 3] = [
    "Cairo Contract Review",
    "Next.js Debugging Session",
    "Project Planning",
];

/// Display name used for the avatar when the gateway has none.
pub const FALLBACK_DISPLAY_NAME: &str = "User";

/// Route the gateway redirects to after a successful OAuth login.
pub const OAUTH_CALLBACK_PATH: &str = "/auth/callback";

/// Page shown after a failed OAuth login.
pub const LOGIN_FAILED_PATH: &str = "/?login=failed";

/// Capacity of the state-event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

// Use lazy_static to read the environment once, at first access.
lazy_static::lazy_static! {
    pub static ref APPWRITE_ENDPOINT: Option<String> = non_empty_var("APPWRITE_ENDPOINT");
    pub static ref APPWRITE_PROJECT_ID: Option<String> = non_empty_var("APPWRITE_PROJECT_ID");
    pub static ref APPWRITE_API_KEY: Option<String> = non_empty_var("APPWRITE_API_KEY");
    // Unset redirects point back at the local web server (`GatewayConfig::with_local_redirects`).
    pub static ref OAUTH_SUCCESS_URL: Option<String> = non_empty_var("APPWRITE_OAUTH_SUCCESS_URL");
    pub static ref OAUTH_FAILURE_URL: Option<String> = non_empty_var("APPWRITE_OAUTH_FAILURE_URL");
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
