//! Push-based configuration
//!
//! Components never poll configuration. They register a callback with
//! `Settings::watch`, which fires once with the current value and again on
//! every change.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Whether auto-translation is switched on
pub const ENABLED_KEY: &str = "AutoTranslate_Enabled";
/// Name of the active translation provider
pub const PROVIDER_KEY: &str = "AutoTranslate_ServiceProvider";
/// Comma-separated URL schemes recognized by the link pass
pub const LINK_SCHEMES_KEY: &str = "Markdown_SupportSchemesForLink";

pub const DEFAULT_LINK_SCHEMES: &str = "http,https";

/// Callback invoked with the key and its current value (`None` when unset)
pub type SettingCallback = Box<dyn Fn(&str, Option<&Value>) + Send + Sync>;

pub trait Settings: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    /// Register `on_change` for `key`, invoking it immediately with the
    /// current value
    fn watch(&self, key: &str, on_change: SettingCallback);
}

/// Read a setting as a boolean; accepts `true`, `"true"` and `"1"`
pub fn setting_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim(), "true" | "1"),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// Read a setting as a string, treating blank strings as unset
pub fn setting_str(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

type SharedCallback = Arc<dyn Fn(&str, Option<&Value>) + Send + Sync>;

/// In-process settings store
#[derive(Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, Value>>,
    watchers: RwLock<HashMap<String, Vec<SharedCallback>>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value and notify every watcher of `key`
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        debug!(key, %value, "setting changed");
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.clone());
        self.notify(key, Some(&value));
    }

    pub fn remove(&self, key: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        self.notify(key, None);
    }

    fn notify(&self, key: &str, value: Option<&Value>) {
        // Snapshot first: callbacks may read settings or register watchers
        let callbacks: Vec<SharedCallback> = self
            .watchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default();
        for callback in callbacks {
            callback(key, value);
        }
    }
}

impl Settings for MemorySettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn watch(&self, key: &str, on_change: SettingCallback) {
        let callback: SharedCallback = Arc::from(on_change);
        self.watchers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .push(Arc::clone(&callback));
        let current = self.get(key);
        callback(key, current.as_ref());
    }
}

/// Startup configuration for auto-translation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub enabled: bool,
    pub provider: Option<String>,
    pub link_schemes: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        TranslationConfig {
            enabled: false,
            provider: None,
            link_schemes: DEFAULT_LINK_SCHEMES.to_string(),
        }
    }
}

impl TranslationConfig {
    /// Load from `AUTOTRANSLATE_ENABLED`, `AUTOTRANSLATE_PROVIDER` and
    /// `AUTOTRANSLATE_LINK_SCHEMES`, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(enabled) = std::env::var("AUTOTRANSLATE_ENABLED") {
            config.enabled = setting_bool(Some(&Value::String(enabled)));
        }
        if let Ok(provider) = std::env::var("AUTOTRANSLATE_PROVIDER") {
            config.provider = setting_str(Some(&Value::String(provider)));
        }
        if let Ok(schemes) = std::env::var("AUTOTRANSLATE_LINK_SCHEMES") {
            config.link_schemes = schemes;
        }
        config
    }

    /// Write this configuration into a settings store
    pub fn apply(&self, settings: &MemorySettings) {
        settings.set(LINK_SCHEMES_KEY, self.link_schemes.clone());
        match &self.provider {
            Some(provider) => settings.set(PROVIDER_KEY, provider.clone()),
            None => settings.remove(PROVIDER_KEY),
        }
        settings.set(ENABLED_KEY, self.enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_setting_bool() {
        assert!(setting_bool(Some(&json!(true))));
        assert!(setting_bool(Some(&json!("true"))));
        assert!(setting_bool(Some(&json!("1"))));
        assert!(setting_bool(Some(&json!(1))));
        assert!(!setting_bool(Some(&json!(false))));
        assert!(!setting_bool(Some(&json!("yes please"))));
        assert!(!setting_bool(None));
    }

    #[test]
    fn test_setting_str_blank_is_unset() {
        assert_eq!(setting_str(Some(&json!(" deepl "))), Some("deepl".to_string()));
        assert_eq!(setting_str(Some(&json!("  "))), None);
        assert_eq!(setting_str(Some(&json!(3))), None);
        assert_eq!(setting_str(None), None);
    }

    #[test]
    fn test_watch_fires_immediately_and_on_change() {
        let settings = MemorySettings::new();
        settings.set(PROVIDER_KEY, "google");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        settings.watch(
            PROVIDER_KEY,
            Box::new(move |_: &str, value: Option<&Value>| {
                sink.lock().unwrap().push(setting_str(value))
            }),
        );
        settings.set(PROVIDER_KEY, "deepl");
        settings.remove(PROVIDER_KEY);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some("google".to_string()), Some("deepl".to_string()), None]
        );
    }

    #[test]
    fn test_watch_only_fires_for_its_key() {
        let settings = MemorySettings::new();
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        settings.watch(
            ENABLED_KEY,
            Box::new(move |_: &str, _: Option<&Value>| *sink.lock().unwrap() += 1),
        );

        settings.set(PROVIDER_KEY, "google");
        assert_eq!(*count.lock().unwrap(), 1);

        settings.set(ENABLED_KEY, true);
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn test_callback_can_read_settings() {
        let settings = Arc::new(MemorySettings::new());
        let reader = Arc::clone(&settings);
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        settings.watch(
            ENABLED_KEY,
            Box::new(move |_: &str, _: Option<&Value>| {
                *sink.lock().unwrap() = reader.get(LINK_SCHEMES_KEY)
            }),
        );

        settings.set(LINK_SCHEMES_KEY, "https");
        settings.set(ENABLED_KEY, true);
        assert_eq!(*seen.lock().unwrap(), Some(json!("https")));
    }

    #[test]
    fn test_config_defaults_and_apply() {
        let config: TranslationConfig = serde_json::from_value(json!({ "enabled": true })).unwrap();
        assert!(config.enabled);
        assert_eq!(config.provider, None);
        assert_eq!(config.link_schemes, DEFAULT_LINK_SCHEMES);

        let settings = MemorySettings::new();
        TranslationConfig {
            provider: Some("mock".to_string()),
            ..config
        }
        .apply(&settings);
        assert_eq!(settings.get(ENABLED_KEY), Some(json!(true)));
        assert_eq!(settings.get(PROVIDER_KEY), Some(json!("mock")));
        assert_eq!(settings.get(LINK_SCHEMES_KEY), Some(json!("http,https")));
    }
}
