//! Collaborator contracts consumed by the translation engine
//!
//! Rendering, room membership lookup and persistence live outside this crate.
//! The engine only depends on these traits; `memory` and `render` provide
//! in-process implementations.

use crate::error::TranslateResult;
use crate::message::Message;
use crate::provider::Translations;
use crate::settings::Settings;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Markdown rendering step used by the markup pass
///
/// Implementations render `message.html` (or `message.text` when unset) and
/// store the result in `message.html`. Any substring in the marker wrapper
/// form must survive byte-for-byte. A renderer may append tokens of its own
/// to `message.tokens`, using placeholders that do not carry the
/// notranslate flag.
pub trait MessageRenderer: Send + Sync {
    fn render(&self, message: Message) -> Message;
}

/// Room membership lookup of auto-translate languages
#[async_trait]
pub trait SubscriptionDirectory: Send + Sync {
    /// Languages subscribed to in `room_id` by everyone except `exclude_user_id`
    async fn languages_for(
        &self,
        room_id: &str,
        exclude_user_id: Option<&str>,
    ) -> TranslateResult<BTreeSet<String>>;
}

/// Persistence of translation results
#[async_trait]
pub trait TranslationStore: Send + Sync {
    async fn persist_translation(
        &self,
        message_id: &str,
        translations: &Translations,
        provider_name: &str,
    ) -> TranslateResult<()>;

    async fn persist_attachment_translation(
        &self,
        message_id: &str,
        attachment_index: usize,
        translations: &Translations,
    ) -> TranslateResult<()>;
}

/// Read access to persisted messages
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn fetch_message(&self, message_id: &str) -> TranslateResult<Option<Message>>;
}

/// Handles to every collaborator an orchestrator needs
///
/// Cloned into each spawned translation task; all fields are `Arc`-wrapped.
#[derive(Clone)]
pub struct Services {
    pub settings: Arc<dyn Settings>,
    pub renderer: Arc<dyn MessageRenderer>,
    pub subscriptions: Arc<dyn SubscriptionDirectory>,
    pub translations: Arc<dyn TranslationStore>,
    pub messages: Arc<dyn MessageStore>,
}
