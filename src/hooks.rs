//! After-message-saved hook table
//!
//! Handlers run in descending priority order and thread the message through
//! one another. Within one priority, handlers run in the order they were added.

use crate::message::{Message, Room};
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[async_trait]
pub trait AfterSaveHandler: Send + Sync {
    async fn after_save(&self, message: Message, room: &Room) -> Message;
}

struct HookEntry {
    id: String,
    priority: Priority,
    handler: Arc<dyn AfterSaveHandler>,
}

#[derive(Default)]
pub struct AfterSaveHooks {
    entries: RwLock<Vec<HookEntry>>,
}

impl AfterSaveHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler, replacing any handler already registered under `id`
    pub fn add(&self, id: &str, priority: Priority, handler: Arc<dyn AfterSaveHandler>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|e| e.id != id);
        entries.push(HookEntry {
            id: id.to_string(),
            priority,
            handler,
        });
        debug!(hook = id, ?priority, "after-save hook added");
    }

    /// Remove the handler registered under `id`; unknown ids are ignored
    pub fn remove(&self, id: &str) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() != before {
            debug!(hook = id, "after-save hook removed");
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|e| e.id == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|(id, _)| id).collect()
    }

    /// Run every handler over `message`
    pub async fn run(&self, message: Message, room: &Room) -> Message {
        let mut message = message;
        for (_, handler) in self.snapshot() {
            message = handler.after_save(message, room).await;
        }
        message
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn AfterSaveHandler>)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut ordered: Vec<&HookEntry> = entries.iter().collect();
        // Stable sort keeps insertion order within one priority
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));
        ordered
            .into_iter()
            .map(|e| (e.id.clone(), Arc::clone(&e.handler)))
            .collect()
    }
}
