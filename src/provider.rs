//! Translation provider capability set
//!
//! This module defines the `TranslationProvider` trait that every translation
//! backend implements. The orchestration layer only talks to providers through
//! this trait, so vendors can be swapped at runtime by changing the active
//! provider name in configuration.
//!
//! # Contract
//!
//! Providers receive tokenized text: protected fragments are replaced with
//! markers of the form `<i class=notranslate>{N}</i>`. A provider must pass
//! every span carrying the `notranslate` flag through unchanged. This is not
//! checked by the engine.

use crate::error::{TranslateError, TranslateResult};
use crate::message::{Attachment, Message};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Translated text keyed by language code
pub type Translations = HashMap<String, String>;

/// Kind of a provider-specific setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingKind {
    String,
    Boolean,
    /// A credential; never echoed back to clients
    Secret,
}

/// One entry of a provider's settings schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDescriptor {
    pub key: String,
    pub kind: SettingKind,
    #[serde(default)]
    pub default: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Registry key, matched against the active-provider setting
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub settings: Vec<SettingDescriptor>,
    /// Setting that must hold a non-empty credential before translating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_setting: Option<String>,
}

impl ProviderMetadata {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        ProviderMetadata {
            name: name.into(),
            display_name: display_name.into(),
            settings: Vec::new(),
            credentials_setting: None,
        }
    }

    /// Declare a secret setting that gates translation
    pub fn with_credentials(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.settings.push(SettingDescriptor {
            key: key.clone(),
            kind: SettingKind::Secret,
            default: Value::String(String::new()),
        });
        self.credentials_setting = Some(key);
        self
    }

    pub fn with_setting(mut self, descriptor: SettingDescriptor) -> Self {
        self.settings.push(descriptor);
        self
    }
}

/// A language a provider can translate into, named in some display language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedLanguage {
    pub language: String,
    pub name: String,
}

/// Capability set of a translation backend
///
/// All translation methods are async to support network-bound providers.
/// Timeouts are the provider's concern; the orchestrator never cancels a call.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Name, display name and settings schema of this provider
    fn metadata(&self) -> ProviderMetadata;

    /// Languages this provider supports, with names in the `target` language
    async fn supported_languages(&self, target: &str) -> TranslateResult<Vec<SupportedLanguage>>;

    /// Translate a tokenized message body into every target language
    ///
    /// # Returns
    ///
    /// * `Ok(Translations)` - Translated text per language; languages the
    ///   provider could not handle are simply absent
    /// * `Err(TranslateError)` - If the call failed as a whole
    async fn translate_message(
        &self,
        message: &Message,
        targets: &[String],
    ) -> TranslateResult<Translations>;

    /// Translate an attachment's description (or text) into every target language
    async fn translate_attachment(
        &self,
        attachment: &Attachment,
        targets: &[String],
    ) -> TranslateResult<Translations>;
}

/// Reject language codes that are empty or contain anything besides ASCII
/// alphanumerics, `-` and `_`
pub fn validate_locale(locale: &str) -> TranslateResult<()> {
    if locale.is_empty() {
        return Err(TranslateError::InvalidLocale("empty language code".to_string()));
    }
    match locale
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_')))
    {
        Some(bad) => Err(TranslateError::InvalidLocale(format!(
            "{:?} is not allowed in language code {:?}",
            bad, locale
        ))),
        None => Ok(()),
    }
}
