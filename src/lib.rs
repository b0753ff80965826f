//! Automatic translation of chat messages
//!
//! Rich chat messages carry fragments that must survive machine translation
//! untouched: emoji shortcodes, link syntax, rendered markup and mentions.
//! The [`Tokenizer`] replaces each of them with a numbered
//! `<i class=notranslate>{N}</i>` marker and records the original fragment in
//! the message's [`TokenStream`]; [`detokenize`] puts them back.
//!
//! Around that engine sits the orchestration layer: a [`ProviderRegistry`] of
//! pluggable [`TranslationProvider`]s, one [`TranslationOrchestrator`] per
//! provider that follows configuration pushed through [`Settings`], and an
//! after-save hook table that hands every saved message to the orchestrator
//! of the active provider. Translation runs in spawned tasks, so saving a
//! message never waits for a provider.
//!
//! # Example
//!
//! ```ignore
//! use chat_autotranslate::{CommonMarkRenderer, Message, Tokenizer, detokenize};
//! use std::sync::Arc;
//!
//! let tokenizer = Tokenizer::new("http,https", Arc::new(CommonMarkRenderer::new()))?;
//! let message = Message::new("m1", "r1", "Hello @alice :wave:").with_mention("alice");
//! let tokenized = tokenizer.tokenize(message);
//! assert_eq!(detokenize(&tokenized.text, &tokenized.tokens), "Hello @alice :wave:");
//! ```

pub mod detokenizer;
pub mod error;
pub mod hooks;
pub mod memory;
pub mod message;
pub mod mock;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod render;
pub mod service;
pub mod services;
pub mod settings;
pub mod token;
pub mod tokenizer;

pub use detokenizer::{DetokenizeReport, detokenize, detokenize_with_report};
pub use error::{TranslateError, TranslateResult};
pub use hooks::{AfterSaveHandler, AfterSaveHooks, Priority};
pub use memory::{MemoryMessageStore, StaticSubscriptions, StoredTranslations};
pub use message::{Attachment, ChannelRef, Mention, Message, Room, escape_html};
pub use mock::{MockMode, MockProvider};
pub use orchestrator::{SavedMessage, TranslationDispatch, TranslationOrchestrator};
pub use provider::{
    ProviderMetadata, SettingDescriptor, SettingKind, SupportedLanguage, TranslationProvider,
    Translations, validate_locale,
};
pub use registry::ProviderRegistry;
pub use render::CommonMarkRenderer;
pub use service::AutoTranslate;
pub use services::{
    MessageRenderer, MessageStore, Services, SubscriptionDirectory, TranslationStore,
};
pub use settings::{
    DEFAULT_LINK_SCHEMES, ENABLED_KEY, LINK_SCHEMES_KEY, MemorySettings, PROVIDER_KEY,
    SettingCallback, Settings, TranslationConfig, setting_bool, setting_str,
};
pub use token::{NOTRANSLATE_FLAG, Token, TokenStream, is_marker, marker};
pub use tokenizer::{Tokenizer, tokenize, tokenize_mentions};
