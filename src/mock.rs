//! Mock translation provider for testing
//!
//! This module provides a deterministic, API-free provider for exercising the
//! orchestration pipeline without credentials or network access.
//!
//! # Example
//!
//! ```ignore
//! use chat_autotranslate::{MockMode, MockProvider, TranslationProvider};
//!
//! #[tokio::test]
//! async fn test_translation() {
//!     let mock = MockProvider::new("mock", MockMode::Suffix);
//!     let message = Message::new("m1", "r1", "hello");
//!     let result = mock.translate_message(&message, &["fr".to_string()]).await.unwrap();
//!     assert_eq!(result["fr"], "hello_fr");
//! }
//! ```

use crate::error::{TranslateError, TranslateResult};
use crate::message::{Attachment, Message};
use crate::provider::{ProviderMetadata, SupportedLanguage, TranslationProvider, Translations};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Mock translation modes for testing different scenarios
#[derive(Debug, Clone)]
pub enum MockMode {
    /// Append locale suffix: "hello" → "hello_fr"
    /// Markers pass through untouched
    Suffix,

    /// Use predefined mappings: (text, target_locale) → translation,
    /// falling back to `Suffix`
    Mappings(HashMap<(String, String), String>),

    /// Fail every call
    Error(String),

    /// Fail only for inputs containing the needle, `Suffix` otherwise
    FailOn(String),

    /// Return input unchanged
    NoOp,
}

/// Mock provider that simulates various translation scenarios
#[derive(Debug)]
pub struct MockProvider {
    metadata: ProviderMetadata,
    mode: MockMode,
    /// Optional simulated network delay (in milliseconds)
    delay_ms: u64,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: &str, mode: MockMode) -> Self {
        Self::with_metadata(ProviderMetadata::new(name, format!("Mock ({})", name)), mode)
    }

    pub fn with_metadata(metadata: ProviderMetadata, mode: MockMode) -> Self {
        Self {
            metadata,
            mode,
            delay_ms: 0,
            calls: AtomicUsize::new(0),
        }
    }

    /// Simulate a network round trip of `delay_ms` per call
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Number of translate calls received so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn begin_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
    }

    fn apply_translation(&self, text: &str, target: &str) -> TranslateResult<String> {
        match &self.mode {
            MockMode::Suffix => Ok(format!("{}_{}", text, target)),
            MockMode::Mappings(map) => {
                let key = (text.to_string(), target.to_string());
                Ok(map
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| format!("{}_{}", text, target)))
            }
            MockMode::Error(msg) => Err(TranslateError::ProviderError(msg.clone())),
            MockMode::FailOn(needle) if text.contains(needle.as_str()) => Err(
                TranslateError::ProviderError(format!("mock failure on {:?}", needle)),
            ),
            MockMode::FailOn(_) => Ok(format!("{}_{}", text, target)),
            MockMode::NoOp => Ok(text.to_string()),
        }
    }

    fn translate_all(&self, text: &str, targets: &[String]) -> TranslateResult<Translations> {
        targets
            .iter()
            .map(|target| Ok((target.clone(), self.apply_translation(text, target)?)))
            .collect()
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    fn metadata(&self) -> ProviderMetadata {
        self.metadata.clone()
    }

    async fn supported_languages(&self, _target: &str) -> TranslateResult<Vec<SupportedLanguage>> {
        Ok([("de", "German"), ("en", "English"), ("fr", "French"), ("ja", "Japanese")]
            .into_iter()
            .map(|(language, name)| SupportedLanguage {
                language: language.to_string(),
                name: name.to_string(),
            })
            .collect())
    }

    async fn translate_message(
        &self,
        message: &Message,
        targets: &[String],
    ) -> TranslateResult<Translations> {
        self.begin_call().await;
        self.translate_all(&message.text, targets)
    }

    async fn translate_attachment(
        &self,
        attachment: &Attachment,
        targets: &[String],
    ) -> TranslateResult<Translations> {
        self.begin_call().await;
        match attachment.translatable_text() {
            Some(text) => self.translate_all(text, targets),
            None => Ok(Translations::new()),
        }
    }
}
