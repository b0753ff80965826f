//! Auto-translate bootstrap
//!
//! Wires a set of providers into a registry, creates their orchestrators and
//! connects everything to settings and the after-save hook table.
//!
//! # Example
//!
//! ```ignore
//! let service = AutoTranslate::start(services, vec![Arc::new(google)]);
//! let message = service.on_message_saved(message, &room).await;
//! service.drain().await;
//! service.shutdown();
//! ```

use crate::hooks::AfterSaveHooks;
use crate::message::{Message, Room};
use crate::orchestrator::TranslationOrchestrator;
use crate::provider::TranslationProvider;
use crate::registry::ProviderRegistry;
use crate::services::Services;
use std::sync::Arc;
use tracing::info;

pub struct AutoTranslate {
    registry: Arc<ProviderRegistry>,
    hooks: Arc<AfterSaveHooks>,
    orchestrators: Vec<Arc<TranslationOrchestrator>>,
}

impl AutoTranslate {
    /// Start with a fresh hook table
    pub fn start(services: Services, providers: Vec<Arc<dyn TranslationProvider>>) -> Self {
        Self::start_with_hooks(services, providers, Arc::new(AfterSaveHooks::new()))
    }

    /// Start on a hook table shared with other after-save handlers
    pub fn start_with_hooks(
        services: Services,
        providers: Vec<Arc<dyn TranslationProvider>>,
        hooks: Arc<AfterSaveHooks>,
    ) -> Self {
        let registry = ProviderRegistry::init();
        for provider in providers {
            registry.register_provider(provider);
        }

        // One orchestrator per name; re-registered names keep the last provider
        let orchestrators: Vec<Arc<TranslationOrchestrator>> = registry
            .providers()
            .iter()
            .filter_map(|metadata| registry.get_provider(&metadata.name))
            .map(|provider| {
                TranslationOrchestrator::new(provider, Arc::clone(&registry), services.clone())
            })
            .collect();
        for orchestrator in &orchestrators {
            orchestrator.attach(&hooks);
        }
        registry.load_active_provider(services.settings.as_ref());

        info!(
            providers = orchestrators.len(),
            active = ?registry.active_provider_name(),
            "auto-translate started"
        );
        AutoTranslate {
            registry,
            hooks,
            orchestrators,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn hooks(&self) -> &Arc<AfterSaveHooks> {
        &self.hooks
    }

    pub fn orchestrator(&self, name: &str) -> Option<&Arc<TranslationOrchestrator>> {
        self.orchestrators.iter().find(|o| o.name() == name)
    }

    /// Run the after-save hooks for a freshly persisted message
    pub async fn on_message_saved(&self, message: Message, room: &Room) -> Message {
        self.hooks.run(message, room).await
    }

    /// Wait for every translation dispatched through the hooks so far
    pub async fn drain(&self) {
        for orchestrator in &self.orchestrators {
            orchestrator.drain().await;
        }
    }

    pub fn shutdown(&self) {
        for orchestrator in &self.orchestrators {
            orchestrator.detach();
        }
        self.registry.shutdown();
        info!("auto-translate stopped");
    }
}
