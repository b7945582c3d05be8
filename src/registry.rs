use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::constants::{NEW_CHAT_TITLE_PREFIX, SEEDED_CHAT_TITLES};
use crate::error::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(Uuid);

impl ChatId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChatId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ChatId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatItem {
    pub id: ChatId,
    pub title: String,
}

/// Ordered chat sessions shown in the sidebar, newest first, plus the active one.
///
/// The active id is only ever set to an id present in `chats`.
#[derive(Debug, Clone, Default)]
pub struct ChatRegistry {
    chats: Vec<ChatItem>,
    active: Option<ChatId>,
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chats a fresh session starts with; the first is active.
    pub fn seeded() -> Self {
        let chats: Vec<ChatItem> = SEEDED_CHAT_TITLES
            .iter()
            .map(|title| ChatItem {
                id: ChatId::new(),
                title: title.to_string(),
            })
            .collect();
        let active = chats.first().map(|c| c.id);
        Self { chats, active }
    }

    pub fn chats(&self) -> &[ChatItem] {
        &self.chats
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    pub fn get(&self, id: ChatId) -> Option<&ChatItem> {
        self.chats.iter().find(|c| c.id == id)
    }

    pub fn active_id(&self) -> Option<ChatId> {
        self.active
    }

    pub fn active(&self) -> Option<&ChatItem> {
        self.active.and_then(|id| self.get(id))
    }

    /// Inserts a new chat at the front and makes it active.
    pub fn create(&mut self) -> &ChatItem {
        let item = ChatItem {
            id: ChatId::new(),
            title: format!("{} {}", NEW_CHAT_TITLE_PREFIX, self.chats.len() + 1),
        };
        debug!(id = %item.id, title = %item.title, "Creating chat");
        self.active = Some(item.id);
        self.chats.insert(0, item);
        &self.chats[0]
    }

    /// Returns false, changing nothing, when the id is unknown.
    pub fn rename(&mut self, id: ChatId, title: impl Into<String>) -> bool {
        match self.chats.iter_mut().find(|c| c.id == id) {
            Some(chat) => {
                chat.title = title.into();
                true
            }
            None => false,
        }
    }

    /// Removes the chat; if it was active the first remaining chat becomes active.
    pub fn delete(&mut self, id: ChatId) -> bool {
        let before = self.chats.len();
        self.chats.retain(|c| c.id != id);
        if self.chats.len() == before {
            return false;
        }
        if self.active == Some(id) {
            self.active = self.chats.first().map(|c| c.id);
            debug!(deleted = %id, active = ?self.active, "Active chat deleted, reselected");
        }
        true
    }

    pub fn select(&mut self, id: ChatId) -> Result<&ChatItem, RegistryError> {
        let index = self
            .chats
            .iter()
            .position(|c| c.id == id)
            .ok_or(RegistryError::UnknownChat(id))?;
        self.active = Some(id);
        Ok(&self.chats[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_active_consistent(registry: &ChatRegistry) {
        if let Some(id) = registry.active_id() {
            assert!(registry.get(id).is_some(), "active id {} is dangling", id);
        } else {
            assert!(registry.active().is_none());
        }
    }

    #[test]
    fn test_seeded_registry() {
        let registry = ChatRegistry::seeded();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.chats()[0].title, "Cairo Contract Review");
        assert_eq!(registry.active().unwrap().title, "Cairo Contract Review");
    }

    #[test]
    fn test_create_inserts_at_front_and_activates() {
        let mut registry = ChatRegistry::seeded();
        let id = registry.create().id;
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.chats()[0].id, id);
        assert_eq!(registry.chats()[0].title, "New Chat 4");
        assert_eq!(registry.active_id(), Some(id));
    }

    #[test]
    fn test_create_generates_unique_ids() {
        let mut registry = ChatRegistry::new();
        let a = registry.create().id;
        let b = registry.create().id;
        assert_ne!(a, b);
        assert_eq!(registry.chats()[0].title, "New Chat 2");
        assert_eq!(registry.chats()[1].title, "New Chat 1");
    }

    #[test]
    fn test_rename_preserves_position() {
        let mut registry = ChatRegistry::seeded();
        let id = registry.chats()[1].id;
        assert!(registry.rename(id, "Renamed"));
        assert_eq!(registry.chats()[1].id, id);
        assert_eq!(registry.chats()[1].title, "Renamed");
    }

    #[test]
    fn test_rename_unknown_id_is_noop() {
        let mut registry = ChatRegistry::seeded();
        let before = registry.chats().to_vec();
        let active = registry.active_id();
        assert!(!registry.rename(ChatId::new(), "Nope"));
        assert_eq!(registry.chats(), before.as_slice());
        assert_eq!(registry.active_id(), active);
    }

    #[test]
    fn test_delete_active_selects_first_remaining() {
        let mut registry = ChatRegistry::seeded();
        let first = registry.chats()[0].id;
        let second = registry.chats()[1].id;
        assert!(registry.delete(first));
        assert_eq!(registry.active_id(), Some(second));
        assert_active_consistent(&registry);
    }

    #[test]
    fn test_delete_inactive_keeps_selection() {
        let mut registry = ChatRegistry::seeded();
        let active = registry.active_id();
        let last = registry.chats()[2].id;
        assert!(registry.delete(last));
        assert_eq!(registry.active_id(), active);
    }

    #[test]
    fn test_delete_last_chat_clears_active() {
        let mut registry = ChatRegistry::new();
        let id = registry.create().id;
        assert!(registry.delete(id));
        assert!(registry.is_empty());
        assert_eq!(registry.active_id(), None);
    }

    #[test]
    fn test_delete_unknown_returns_false() {
        let mut registry = ChatRegistry::seeded();
        assert!(!registry.delete(ChatId::new()));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_select_unknown_is_rejected() {
        let mut registry = ChatRegistry::seeded();
        let active = registry.active_id();
        let missing = ChatId::new();
        assert_eq!(
            registry.select(missing).unwrap_err(),
            RegistryError::UnknownChat(missing)
        );
        assert_eq!(registry.active_id(), active);
    }

    #[test]
    fn test_select_known_chat() {
        let mut registry = ChatRegistry::seeded();
        let id = registry.chats()[2].id;
        assert_eq!(registry.select(id).unwrap().title, "Project Planning");
        assert_eq!(registry.active_id(), Some(id));
    }

    #[test]
    fn test_active_stays_consistent_over_mixed_operations() {
        let mut registry = ChatRegistry::seeded();
        // A fixed but varied sequence: create, select, delete in different orders.
        for step in 0..30usize {
            match step % 5 {
                0 | 3 => {
                    registry.create();
                }
                1 => {
                    if let Some(last) = registry.chats().last().map(|c| c.id) {
                        registry.select(last).unwrap();
                    }
                }
                2 => {
                    if let Some(id) = registry.active_id() {
                        registry.delete(id);
                    }
                }
                _ => {
                    let ids: Vec<ChatId> = registry.chats().iter().map(|c| c.id).collect();
                    for id in ids.into_iter().skip(1) {
                        registry.delete(id);
                    }
                }
            }
            assert_active_consistent(&registry);
        }
        while let Some(id) = registry.active_id() {
            registry.delete(id);
            assert_active_consistent(&registry);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_chat_id_parses_from_display() {
        let id = ChatId::new();
        let parsed: ChatId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<ChatId>().is_err());
    }
}
