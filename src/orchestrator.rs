//! Per-provider translation orchestration
//!
//! One `TranslationOrchestrator` exists per registered provider. Each one
//! follows three settings: whether auto-translation is enabled, whether its
//! provider's credentials are present, and which provider is active. Only the
//! orchestrator of the active provider is subscribed to the after-save hook.
//!
//! Translation work runs in spawned tasks and never blocks the caller that
//! saved the message. Each unit of work (the message body, every attachment)
//! is its own task, so a failing provider call only loses that unit.

use crate::error::TranslateResult;
use crate::hooks::{AfterSaveHandler, AfterSaveHooks, Priority};
use crate::message::{Attachment, Message, Room, escape_html};
use crate::provider::{TranslationProvider, validate_locale};
use crate::registry::ProviderRegistry;
use crate::services::Services;
use crate::settings::{ENABLED_KEY, PROVIDER_KEY, setting_bool, setting_str};
use crate::token::TokenStream;
use crate::tokenizer::Tokenizer;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handles of the tasks spawned for one saved message
///
/// Dropping the dispatch leaves the tasks running.
#[derive(Debug, Default)]
pub struct TranslationDispatch {
    body: Option<JoinHandle<()>>,
    attachments: Vec<JoinHandle<()>>,
}

impl TranslationDispatch {
    pub fn is_empty(&self) -> bool {
        self.body.is_none() && self.attachments.is_empty()
    }

    pub fn task_count(&self) -> usize {
        usize::from(self.body.is_some()) + self.attachments.len()
    }

    /// True once every spawned task has completed
    pub fn is_finished(&self) -> bool {
        self.body
            .iter()
            .chain(&self.attachments)
            .all(JoinHandle::is_finished)
    }

    /// Wait for every task to finish
    pub async fn join(self) {
        for handle in self.body.into_iter().chain(self.attachments) {
            if let Err(e) = handle.await {
                warn!(error = %e, "translation task did not complete");
            }
        }
    }
}

/// Outcome of `handle_message_saved`
#[derive(Debug)]
pub struct SavedMessage {
    /// The persisted message, as fetched after dispatching
    pub message: Message,
    pub dispatch: TranslationDispatch,
}

pub struct TranslationOrchestrator {
    name: String,
    provider: Arc<dyn TranslationProvider>,
    registry: Arc<ProviderRegistry>,
    services: Services,
    enabled: AtomicBool,
    credentials_present: AtomicBool,
    detached: AtomicBool,
    hooks: Mutex<Weak<AfterSaveHooks>>,
    parked: Mutex<Vec<TranslationDispatch>>,
}

impl TranslationOrchestrator {
    /// Create a disabled orchestrator; `attach` wires it to settings
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        registry: Arc<ProviderRegistry>,
        services: Services,
    ) -> Arc<Self> {
        let metadata = provider.metadata();
        Arc::new(TranslationOrchestrator {
            name: metadata.name,
            provider,
            registry,
            services,
            enabled: AtomicBool::new(false),
            credentials_present: AtomicBool::new(metadata.credentials_setting.is_none()),
            detached: AtomicBool::new(false),
            hooks: Mutex::new(Weak::new()),
            parked: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of this orchestrator's entry in the after-save hook table
    pub fn hook_id(&self) -> String {
        format!("autotranslate:{}", self.name)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn credentials_present(&self) -> bool {
        self.credentials_present.load(Ordering::SeqCst)
    }

    /// Follow the enabled, credentials and active-provider settings
    ///
    /// Each watch fires immediately, so the orchestrator reflects the
    /// current configuration when this returns.
    pub fn attach(self: &Arc<Self>, hooks: &Arc<AfterSaveHooks>) {
        *self.hooks.lock().unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(hooks);
        let settings = Arc::clone(&self.services.settings);

        let this = Arc::downgrade(self);
        settings.watch(
            ENABLED_KEY,
            Box::new(move |_: &str, value: Option<&Value>| {
                if let Some(this) = this.upgrade().filter(|o| !o.is_detached()) {
                    this.enabled.store(setting_bool(value), Ordering::SeqCst);
                }
            }),
        );

        if let Some(key) = self.provider.metadata().credentials_setting {
            let this = Arc::downgrade(self);
            settings.watch(
                &key,
                Box::new(move |_: &str, value: Option<&Value>| {
                    if let Some(this) = this.upgrade().filter(|o| !o.is_detached()) {
                        let present = setting_str(value).is_some();
                        this.credentials_present.store(present, Ordering::SeqCst);
                    }
                }),
            );
        }

        let this = Arc::downgrade(self);
        settings.watch(
            PROVIDER_KEY,
            Box::new(move |_: &str, value: Option<&Value>| {
                if let Some(this) = this.upgrade().filter(|o| !o.is_detached()) {
                    this.on_active_provider(setting_str(value).as_deref());
                }
            }),
        );
    }

    /// Subscribe when `active` names this provider, unsubscribe otherwise
    fn on_active_provider(self: Arc<Self>, active: Option<&str>) {
        let Some(hooks) = self.hooks() else {
            return;
        };
        let hook_id = self.hook_id();
        if active == Some(self.name.as_str()) {
            info!(provider = %self.name, "subscribing to saved messages");
            hooks.add(&hook_id, Priority::Medium, self);
        } else {
            hooks.remove(&hook_id);
        }
    }

    /// Stop following settings and leave the hook table
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
        if let Some(hooks) = self.hooks() {
            hooks.remove(&self.hook_id());
        }
    }

    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    fn hooks(&self) -> Option<Arc<AfterSaveHooks>> {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
    }

    /// Dispatch translation of a saved message
    ///
    /// Nothing happens unless the orchestrator is enabled and its credentials
    /// are present. Targets are `target_language` when given, else the
    /// languages subscribed to in `room` by everyone but the author. The body
    /// and every attachment with translatable text get one task each.
    pub async fn handle_message_saved(
        &self,
        message: Message,
        room: &Room,
        target_language: Option<&str>,
    ) -> SavedMessage {
        if !(self.is_enabled() && self.credentials_present()) {
            debug!(provider = %self.name, message_id = %message.id, "auto-translate inactive");
            return SavedMessage {
                message,
                dispatch: TranslationDispatch::default(),
            };
        }

        let targets = self.resolve_targets(&message, room, target_language).await;
        let mut dispatch = TranslationDispatch::default();
        if targets.is_empty() {
            debug!(message_id = %message.id, "no target languages");
        } else {
            if !message.text.is_empty() {
                dispatch.body = Some(self.spawn_body(message.clone(), targets.clone()));
            }
            for (index, attachment) in message.attachments.iter().enumerate() {
                if attachment.translatable_text().is_some() {
                    dispatch.attachments.push(self.spawn_attachment(
                        &message.id,
                        index,
                        attachment.clone(),
                        targets.clone(),
                    ));
                }
            }
            debug!(
                provider = %self.name,
                message_id = %message.id,
                targets = ?targets,
                tasks = dispatch.task_count(),
                "dispatched translation"
            );
        }

        let message = self.refetch(message).await;
        SavedMessage { message, dispatch }
    }

    async fn resolve_targets(
        &self,
        message: &Message,
        room: &Room,
        target_language: Option<&str>,
    ) -> Vec<String> {
        let candidates: Vec<String> = match target_language {
            Some(language) => vec![language.to_string()],
            None => match self
                .services
                .subscriptions
                .languages_for(&room.id, message.author_id.as_deref())
                .await
            {
                Ok(languages) => languages.into_iter().collect(),
                Err(e) => {
                    warn!(room_id = %room.id, error = %e, "language lookup failed");
                    Vec::new()
                }
            },
        };

        candidates
            .into_iter()
            .filter(|language| match validate_locale(language) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "skipping target language");
                    false
                }
            })
            .collect()
    }

    async fn refetch(&self, message: Message) -> Message {
        match self.services.messages.fetch_message(&message.id).await {
            Ok(Some(fetched)) => fetched,
            Ok(None) => message,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "could not re-fetch saved message");
                message
            }
        }
    }

    fn spawn_body(&self, message: Message, targets: Vec<String>) -> JoinHandle<()> {
        let provider = Arc::clone(&self.provider);
        let services = self.services.clone();
        let provider_name = self
            .registry
            .active_provider_name()
            .unwrap_or_else(|| self.name.clone());

        tokio::spawn(async move {
            let message_id = message.id.clone();
            if let Err(e) =
                translate_body(provider, services, &provider_name, message, &targets).await
            {
                warn!(
                    provider = %provider_name,
                    message_id = %message_id,
                    error = %e,
                    "message translation failed"
                );
            }
        })
    }

    fn spawn_attachment(
        &self,
        message_id: &str,
        index: usize,
        attachment: Attachment,
        targets: Vec<String>,
    ) -> JoinHandle<()> {
        let provider = Arc::clone(&self.provider);
        let services = self.services.clone();
        let provider_name = self.name.clone();
        let message_id = message_id.to_string();

        tokio::spawn(async move {
            if let Err(e) =
                translate_attachment(provider, services, &message_id, index, attachment, &targets)
                    .await
            {
                warn!(
                    provider = %provider_name,
                    message_id = %message_id,
                    attachment_index = index,
                    error = %e,
                    "attachment translation failed"
                );
            }
        })
    }

    /// Number of parked dispatches that still have running tasks
    pub fn pending(&self) -> usize {
        let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        parked.retain(|dispatch| !dispatch.is_finished());
        parked.len()
    }

    /// Wait for every dispatch parked by the after-save hook
    pub async fn drain(&self) {
        loop {
            let parked = std::mem::take(
                &mut *self.parked.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if parked.is_empty() {
                break;
            }
            for dispatch in parked {
                dispatch.join().await;
            }
        }
    }
}

#[async_trait]
impl AfterSaveHandler for TranslationOrchestrator {
    async fn after_save(&self, message: Message, room: &Room) -> Message {
        let saved = self.handle_message_saved(message, room, None).await;
        if !saved.dispatch.is_empty() {
            let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
            parked.retain(|dispatch| !dispatch.is_finished());
            parked.push(saved.dispatch);
        }
        saved.message
    }
}

/// Tokenize an escaped copy of the message, translate it and persist the result
async fn translate_body(
    provider: Arc<dyn TranslationProvider>,
    services: Services,
    provider_name: &str,
    message: Message,
    targets: &[String],
) -> TranslateResult<()> {
    let mut clone = message;
    clone.text = escape_html(&clone.text);
    clone.html = None;
    clone.tokens = TokenStream::new();

    let tokenizer = Tokenizer::from_settings(
        services.settings.as_ref(),
        Arc::clone(&services.renderer),
    )?;
    let tokenized = tokenizer.tokenize(clone);

    let translations = provider.translate_message(&tokenized, targets).await?;
    if translations.is_empty() {
        debug!(message_id = %tokenized.id, "provider returned no translations");
        return Ok(());
    }
    services
        .translations
        .persist_translation(&tokenized.id, &translations, provider_name)
        .await
}

async fn translate_attachment(
    provider: Arc<dyn TranslationProvider>,
    services: Services,
    message_id: &str,
    index: usize,
    attachment: Attachment,
    targets: &[String],
) -> TranslateResult<()> {
    let translations = provider.translate_attachment(&attachment, targets).await?;
    if translations.is_empty() {
        return Ok(());
    }
    services
        .translations
        .persist_attachment_translation(message_id, index, &translations)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryMessageStore, StaticSubscriptions};
    use crate::mock::{MockMode, MockProvider};
    use crate::provider::ProviderMetadata;
    use crate::render::CommonMarkRenderer;
    use crate::settings::{LINK_SCHEMES_KEY, MemorySettings};
    use crate::token::marker;

    struct Fixture {
        settings: Arc<MemorySettings>,
        store: Arc<MemoryMessageStore>,
        provider: Arc<MockProvider>,
        hooks: Arc<AfterSaveHooks>,
        orchestrator: Arc<TranslationOrchestrator>,
    }

    fn fixture(provider: MockProvider) -> Fixture {
        let settings = Arc::new(MemorySettings::new());
        settings.set(LINK_SCHEMES_KEY, "http,https");
        settings.set(ENABLED_KEY, true);
        let store = Arc::new(MemoryMessageStore::new());
        let subscriptions = StaticSubscriptions::new()
            .with_subscriber("r1", "alice", "fr")
            .with_subscriber("r1", "bob", "de");
        let services = Services {
            settings: settings.clone(),
            renderer: Arc::new(CommonMarkRenderer::new()),
            subscriptions: Arc::new(subscriptions),
            translations: store.clone(),
            messages: store.clone(),
        };

        let provider = Arc::new(provider);
        let registry = ProviderRegistry::init();
        registry.register_provider(provider.clone());
        registry.load_active_provider(settings.as_ref());

        let hooks = Arc::new(AfterSaveHooks::new());
        let orchestrator = TranslationOrchestrator::new(provider.clone(), registry, services);
        orchestrator.attach(&hooks);

        Fixture {
            settings,
            store,
            provider,
            hooks,
            orchestrator,
        }
    }

    fn saved(store: &MemoryMessageStore, message: Message) -> Message {
        store.insert(message.clone());
        message
    }

    #[tokio::test]
    async fn test_translates_for_room_languages_except_author() {
        let f = fixture(MockProvider::new("mock", MockMode::Suffix));
        let message = saved(&f.store, Message::new("m1", "r1", "hello").with_author("bob"));

        let result = f
            .orchestrator
            .handle_message_saved(message, &Room::new("r1"), None)
            .await;
        assert_eq!(result.dispatch.task_count(), 1);
        result.dispatch.join().await;

        let stored = f.store.translations("m1").unwrap();
        assert_eq!(stored.provider.as_deref(), Some("mock"));
        assert_eq!(stored.by_language.keys().collect::<Vec<_>>(), vec!["fr"]);
        assert_eq!(stored.by_language["fr"], "hello_fr");
    }

    #[tokio::test]
    async fn test_explicit_target_language_wins() {
        let f = fixture(MockProvider::new("mock", MockMode::Suffix));
        let message = saved(&f.store, Message::new("m1", "r1", "hello").with_author("bob"));

        let result = f
            .orchestrator
            .handle_message_saved(message, &Room::new("r1"), Some("ja"))
            .await;
        result.dispatch.join().await;

        assert_eq!(f.store.translation("m1", "ja").as_deref(), Some("hello_ja"));
        assert_eq!(f.store.translation("m1", "fr"), None);
    }

    #[tokio::test]
    async fn test_provider_receives_escaped_tokenized_text() {
        let f = fixture(MockProvider::new("mock", MockMode::Suffix));
        let message = saved(&f.store, Message::new("m1", "r1", "a < b :smile:"));

        let result = f
            .orchestrator
            .handle_message_saved(message, &Room::new("r1"), Some("fr"))
            .await;
        result.dispatch.join().await;

        let translated = f.store.translation("m1", "fr").unwrap();
        assert_eq!(translated, format!("a &lt; b {}_fr", marker(1)));
    }

    #[tokio::test]
    async fn test_disabled_makes_no_calls() {
        let f = fixture(MockProvider::new("mock", MockMode::Suffix));
        f.settings.set(ENABLED_KEY, false);
        let message = Message::new("m1", "r1", "hello")
            .with_attachment(Attachment {
                description: Some("photo".to_string()),
                text: None,
            });

        let result = f
            .orchestrator
            .handle_message_saved(message.clone(), &Room::new("r1"), Some("fr"))
            .await;

        assert!(result.dispatch.is_empty());
        assert_eq!(result.message, message);
        assert_eq!(f.provider.call_count(), 0);
        assert_eq!(f.store.persist_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_credentials_makes_no_calls() {
        let metadata =
            ProviderMetadata::new("deepl", "DeepL").with_credentials("AutoTranslate_DeepLAPIKey");
        let f = fixture(MockProvider::with_metadata(metadata, MockMode::Suffix));
        assert!(!f.orchestrator.credentials_present());

        let message = saved(&f.store, Message::new("m1", "r1", "hello"));
        let result = f
            .orchestrator
            .handle_message_saved(message.clone(), &Room::new("r1"), Some("fr"))
            .await;
        assert!(result.dispatch.is_empty());

        f.settings.set("AutoTranslate_DeepLAPIKey", "secret");
        assert!(f.orchestrator.credentials_present());
        let result = f
            .orchestrator
            .handle_message_saved(message, &Room::new("r1"), Some("fr"))
            .await;
        result.dispatch.join().await;
        assert_eq!(f.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_body_only_translates_attachments() {
        let f = fixture(MockProvider::new("mock", MockMode::Suffix));
        let message = saved(
            &f.store,
            Message::new("m1", "r1", "")
                .with_attachment(Attachment {
                    description: Some("photo".to_string()),
                    text: None,
                })
                .with_attachment(Attachment::default()),
        );

        let result = f
            .orchestrator
            .handle_message_saved(message, &Room::new("r1"), Some("fr"))
            .await;
        assert_eq!(result.dispatch.task_count(), 1);
        result.dispatch.join().await;

        assert_eq!(
            f.store.attachment_translation("m1", 0, "fr").as_deref(),
            Some("photo_fr")
        );
        assert_eq!(f.store.translation("m1", "fr"), None);
    }

    #[tokio::test]
    async fn test_provider_failure_is_swallowed() {
        let f = fixture(MockProvider::new(
            "mock",
            MockMode::Error("quota exceeded".to_string()),
        ));
        let message = saved(&f.store, Message::new("m1", "r1", "hello"));

        let result = f
            .orchestrator
            .handle_message_saved(message, &Room::new("r1"), Some("fr"))
            .await;
        result.dispatch.join().await;

        assert_eq!(result.message.text, "hello");
        assert_eq!(f.store.persist_calls(), 0);
    }

    #[tokio::test]
    async fn test_room_without_subscribers_skips_dispatch() {
        let f = fixture(MockProvider::new("mock", MockMode::Suffix));
        let message = saved(&f.store, Message::new("m1", "r1", "hello").with_author("bob"));

        let result = f
            .orchestrator
            .handle_message_saved(message, &Room::new("r-empty"), None)
            .await;

        assert!(result.dispatch.is_empty());
        assert_eq!(f.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_target_language_skipped() {
        let f = fixture(MockProvider::new("mock", MockMode::Suffix));
        let message = saved(&f.store, Message::new("m1", "r1", "hello"));

        let result = f
            .orchestrator
            .handle_message_saved(message, &Room::new("r1"), Some("fr; drop"))
            .await;

        assert!(result.dispatch.is_empty());
    }

    #[tokio::test]
    async fn test_missing_link_schemes_fails_only_the_body() {
        let f = fixture(MockProvider::new("mock", MockMode::Suffix));
        f.settings.remove(LINK_SCHEMES_KEY);
        let message = saved(
            &f.store,
            Message::new("m1", "r1", "hello").with_attachment(Attachment {
                description: Some("photo".to_string()),
                text: None,
            }),
        );

        let result = f
            .orchestrator
            .handle_message_saved(message, &Room::new("r1"), Some("fr"))
            .await;
        result.dispatch.join().await;

        assert_eq!(f.store.translation("m1", "fr"), None);
        assert_eq!(f.store.attachment_translation("m1", 0, "fr").as_deref(), Some("photo_fr"));
    }

    #[tokio::test]
    async fn test_returns_refetched_message() {
        let f = fixture(MockProvider::new("mock", MockMode::Suffix));
        f.store.insert(Message::new("m1", "r1", "stored copy"));

        let result = f
            .orchestrator
            .handle_message_saved(
                Message::new("m1", "r1", "caller copy"),
                &Room::new("r1"),
                Some("fr"),
            )
            .await;
        assert_eq!(result.message.text, "stored copy");

        let result = f
            .orchestrator
            .handle_message_saved(
                Message::new("m2", "r1", "unsaved"),
                &Room::new("r1"),
                Some("fr"),
            )
            .await;
        assert_eq!(result.message.text, "unsaved");
    }

    #[test]
    fn test_subscribes_only_while_active() {
        let f = fixture(MockProvider::new("mock", MockMode::Suffix));
        assert!(!f.hooks.contains("autotranslate:mock"));

        f.settings.set(PROVIDER_KEY, "mock");
        assert!(f.hooks.contains("autotranslate:mock"));

        f.settings.set(PROVIDER_KEY, "google");
        assert!(!f.hooks.contains("autotranslate:mock"));

        f.settings.set(PROVIDER_KEY, "mock");
        f.orchestrator.detach();
        assert!(!f.hooks.contains("autotranslate:mock"));

        f.settings.set(PROVIDER_KEY, "google");
        f.settings.set(PROVIDER_KEY, "mock");
        assert!(!f.hooks.contains("autotranslate:mock"));
    }

    #[tokio::test]
    async fn test_hook_parks_dispatch_until_drained() {
        let f = fixture(MockProvider::new("mock", MockMode::Suffix).with_delay(20));
        f.settings.set(PROVIDER_KEY, "mock");
        let message = saved(&f.store, Message::new("m1", "r1", "hello").with_author("bob"));

        let returned = f.hooks.run(message, &Room::new("r1")).await;
        assert_eq!(returned.text, "hello");

        f.orchestrator.drain().await;
        assert_eq!(f.store.translation("m1", "fr").as_deref(), Some("hello_fr"));
    }

    #[tokio::test]
    async fn test_finished_dispatches_are_not_kept() {
        let f = fixture(MockProvider::new("mock", MockMode::Suffix));
        f.settings.set(PROVIDER_KEY, "mock");

        for i in 0..50 {
            let id = format!("m{}", i);
            let message = saved(&f.store, Message::new(&id, "r1", "hello").with_author("bob"));
            f.hooks.run(message, &Room::new("r1")).await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert_eq!(f.orchestrator.pending(), 0);
        assert_eq!(f.store.translation("m49", "fr").as_deref(), Some("hello_fr"));
    }

    #[tokio::test]
    async fn test_code_span_with_angle_bracket_round_trips() {
        let f = fixture(MockProvider::new("mock", MockMode::NoOp));
        let message = saved(&f.store, Message::new("m1", "r1", "use `a<b` here"));

        let result = f
            .orchestrator
            .handle_message_saved(message.clone(), &Room::new("r1"), Some("fr"))
            .await;
        result.dispatch.join().await;

        let stored = f.store.translation("m1", "fr").unwrap();
        assert!(!stored.contains("a<b"));

        let mut escaped = message;
        escaped.text = escape_html(&escaped.text);
        let tokenizer =
            Tokenizer::from_settings(f.settings.as_ref(), Arc::new(CommonMarkRenderer::new()))
                .unwrap();
        let tokens = tokenizer.tokenize(escaped).tokens;
        assert_eq!(
            crate::detokenizer::detokenize(&stored, &tokens),
            "use <code>a&lt;b</code> here"
        );
    }
}
