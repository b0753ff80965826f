//! In-memory collaborators
//!
//! Used by the CLI and tests in place of a real database and room directory.

use crate::error::TranslateResult;
use crate::message::Message;
use crate::provider::Translations;
use crate::services::{MessageStore, SubscriptionDirectory, TranslationStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Translations persisted for one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredTranslations {
    /// Provider that produced the latest body translation
    pub provider: Option<String>,
    pub by_language: BTreeMap<String, String>,
    pub attachments: BTreeMap<usize, BTreeMap<String, String>>,
}

#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<HashMap<String, Message>>,
    translations: RwLock<HashMap<String, StoredTranslations>>,
    persist_calls: AtomicUsize,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, message: Message) {
        self.messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(message.id.clone(), message);
    }

    /// Everything persisted so far for `message_id`
    pub fn translations(&self, message_id: &str) -> Option<StoredTranslations> {
        self.translations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(message_id)
            .cloned()
    }

    pub fn translation(&self, message_id: &str, language: &str) -> Option<String> {
        self.translations(message_id)?
            .by_language
            .get(language)
            .cloned()
    }

    pub fn attachment_translation(
        &self,
        message_id: &str,
        attachment_index: usize,
        language: &str,
    ) -> Option<String> {
        self.translations(message_id)?
            .attachments
            .get(&attachment_index)?
            .get(language)
            .cloned()
    }

    /// Number of persist calls of either kind
    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }

    fn update(&self, message_id: &str, apply: impl FnOnce(&mut StoredTranslations)) {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        let mut translations = self
            .translations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        apply(translations.entry(message_id.to_string()).or_default());
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn fetch_message(&self, message_id: &str) -> TranslateResult<Option<Message>> {
        Ok(self
            .messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(message_id)
            .cloned())
    }
}

#[async_trait]
impl TranslationStore for MemoryMessageStore {
    async fn persist_translation(
        &self,
        message_id: &str,
        translations: &Translations,
        provider_name: &str,
    ) -> TranslateResult<()> {
        debug!(
            message_id,
            provider = provider_name,
            languages = translations.len(),
            "persisting translation"
        );
        self.update(message_id, |stored| {
            stored.provider = Some(provider_name.to_string());
            stored
                .by_language
                .extend(translations.iter().map(|(k, v)| (k.clone(), v.clone())));
        });
        Ok(())
    }

    async fn persist_attachment_translation(
        &self,
        message_id: &str,
        attachment_index: usize,
        translations: &Translations,
    ) -> TranslateResult<()> {
        debug!(message_id, attachment_index, "persisting attachment translation");
        self.update(message_id, |stored| {
            stored
                .attachments
                .entry(attachment_index)
                .or_default()
                .extend(translations.iter().map(|(k, v)| (k.clone(), v.clone())));
        });
        Ok(())
    }
}

/// Fixed table of auto-translate language subscriptions per room
#[derive(Debug, Default)]
pub struct StaticSubscriptions {
    rooms: RwLock<HashMap<String, Vec<(String, String)>>>,
}

impl StaticSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `user_id` in `room_id` to translations into `language`
    pub fn with_subscriber(self, room_id: &str, user_id: &str, language: &str) -> Self {
        self.subscribe(room_id, user_id, language);
        self
    }

    pub fn subscribe(&self, room_id: &str, user_id: &str, language: &str) {
        self.rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(room_id.to_string())
            .or_default()
            .push((user_id.to_string(), language.to_string()));
    }
}

#[async_trait]
impl SubscriptionDirectory for StaticSubscriptions {
    async fn languages_for(
        &self,
        room_id: &str,
        exclude_user_id: Option<&str>,
    ) -> TranslateResult<BTreeSet<String>> {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rooms
            .get(room_id)
            .into_iter()
            .flatten()
            .filter(|(user, _)| Some(user.as_str()) != exclude_user_id)
            .map(|(_, language)| language.clone())
            .collect())
    }
}
