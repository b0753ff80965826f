//! Registry of translation providers and the active-provider cell

use crate::error::TranslateResult;
use crate::provider::{ProviderMetadata, SupportedLanguage, TranslationProvider, validate_locale};
use crate::settings::{PROVIDER_KEY, Settings, setting_str};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::{debug, info};

/// Providers by name, plus the name of the one configured as active.
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn TranslationProvider>>>,
    active: RwLock<Option<String>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            active: RwLock::new(None),
        }
    }

    /// Create a shared registry handle for a process.
    pub fn init() -> Arc<Self> {
        debug!("Provider registry initialized");
        Arc::new(Self::new())
    }

    /// Register a provider under its metadata name. Re-registering a name
    /// replaces the previous provider.
    pub fn register_provider(&self, provider: Arc<dyn TranslationProvider>) {
        let name = provider.metadata().name;
        let replaced = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), provider)
            .is_some();
        debug!(provider = %name, replaced, "Registered translation provider");
    }

    /// Get a provider by name.
    pub fn get_provider(&self, name: &str) -> Option<Arc<dyn TranslationProvider>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// The provider registered under the active name, if any.
    pub fn get_active_provider(&self) -> Option<Arc<dyn TranslationProvider>> {
        let name = self.active_provider_name()?;
        self.get_provider(&name)
    }

    pub fn active_provider_name(&self) -> Option<String> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_active_provider(&self, name: Option<String>) {
        info!(provider = ?name, "Active translation provider changed");
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = name;
    }

    /// Cache the active provider name from settings and follow its changes.
    pub fn load_active_provider(self: &Arc<Self>, settings: &dyn Settings) {
        let registry: Weak<Self> = Arc::downgrade(self);
        settings.watch(
            PROVIDER_KEY,
            Box::new(move |_: &str, value: Option<&Value>| {
                if let Some(registry) = registry.upgrade() {
                    registry.set_active_provider(setting_str(value));
                }
            }),
        );
    }

    /// Metadata of every registered provider, sorted by name.
    pub fn providers(&self) -> Vec<ProviderMetadata> {
        let mut all: Vec<ProviderMetadata> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|p| p.metadata())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Languages of the active provider, named in `target`; empty when none
    /// is active.
    pub async fn supported_languages(
        &self,
        target: &str,
    ) -> TranslateResult<Vec<SupportedLanguage>> {
        validate_locale(target)?;
        match self.get_active_provider() {
            Some(provider) => provider.supported_languages(target).await,
            None => Ok(Vec::new()),
        }
    }

    /// Drop every provider and forget the active name.
    pub fn shutdown(&self) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = None;
        debug!("Provider registry shut down");
    }
}
