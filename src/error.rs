use thiserror::Error;

use crate::registry::ChatId;

/// Failures talking to the identity gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("identity gateway is not configured: missing {0}")]
    MissingConfig(&'static str),

    #[error("request to identity gateway failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("identity gateway returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid identity gateway URL: {0}")]
    Url(String),

    #[error("identity gateway did not return a session secret")]
    NoSessionSecret,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no chat with id {0}")]
    UnknownChat(ChatId),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("the assistant is still replying to the previous message")]
    ReplyPending,
}
