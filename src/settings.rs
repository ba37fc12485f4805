//! Runtime provider settings, updatable through the admin API.
//!
//! Readers take an immutable snapshot once per request; writers publish a new
//! snapshot with a bumped version. A request that started before an update
//! keeps using the snapshot it took.

use crate::ai::{ProviderConfig, ProviderKind};
use crate::models::SettingsUpdate;
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub hf_token: Option<String>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl RuntimeSettings {
    pub fn new(
        provider: ProviderKind,
        api_key: Option<String>,
        model: Option<String>,
        hf_token: Option<String>,
    ) -> Self {
        Self {
            provider,
            api_key,
            model,
            hf_token,
            version: 1,
            updated_at: Utc::now(),
        }
    }

    /// Model the active provider runs. The configured model only applies to
    /// Gemini; HuggingFace always runs its space.
    pub fn effective_model(&self) -> String {
        match (self.provider, &self.model) {
            (ProviderKind::Gemini, Some(model)) => model.clone(),
            (provider, _) => provider.default_model().to_string(),
        }
    }

    /// Provider construction parameters for this snapshot.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            hf_token: self.hf_token.clone(),
        }
    }
}

pub struct SettingsStore {
    current: RwLock<Arc<RuntimeSettings>>,
}

impl SettingsStore {
    pub fn new(initial: RuntimeSettings) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn snapshot(&self) -> Arc<RuntimeSettings> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Apply a partial update. Empty strings leave a field unchanged; an
    /// unknown provider name rejects the whole update.
    pub fn apply(&self, update: SettingsUpdate) -> Result<Arc<RuntimeSettings>> {
        let provider = match non_empty(update.provider) {
            Some(name) => Some(name.parse::<ProviderKind>()?),
            None => None,
        };

        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let previous = Arc::clone(&guard);

        let next = RuntimeSettings {
            provider: provider.unwrap_or(previous.provider),
            api_key: non_empty(update.api_key).or_else(|| previous.api_key.clone()),
            model: non_empty(update.model).or_else(|| previous.model.clone()),
            hf_token: non_empty(update.hf_token).or_else(|| previous.hf_token.clone()),
            version: previous.version + 1,
            updated_at: Utc::now(),
        };

        tracing::info!(
            "Runtime settings updated to version {} (provider: {}, model: {})",
            next.version,
            next.provider,
            next.effective_model()
        );

        *guard = Arc::new(next);
        Ok(Arc::clone(&guard))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn store() -> SettingsStore {
        SettingsStore::new(RuntimeSettings::new(
            ProviderKind::Gemini,
            Some("key-1".to_string()),
            None,
            None,
        ))
    }

    #[test]
    fn test_apply_switches_provider_and_bumps_version() {
        let store = store();
        let updated = store
            .apply(SettingsUpdate {
                provider: Some("HuggingFace".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(updated.provider, ProviderKind::HuggingFace);
        assert_eq!(updated.version, 2);
        assert_eq!(updated.api_key.as_deref(), Some("key-1"));
        assert_eq!(store.snapshot().provider, ProviderKind::HuggingFace);
    }

    #[test]
    fn test_empty_fields_are_ignored() {
        let store = store();
        let updated = store
            .apply(SettingsUpdate {
                api_key: Some("".to_string()),
                model: Some("  ".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(updated.api_key.as_deref(), Some("key-1"));
        assert_eq!(updated.model, None);
    }

    #[test]
    fn test_unknown_provider_rejects_update() {
        let store = store();
        let err = store
            .apply(SettingsUpdate {
                provider: Some("openai".to_string()),
                api_key: Some("key-2".to_string()),
                ..Default::default()
            })
            .unwrap_err();

        assert!(matches!(err, Error::UnknownProvider(_)));
        let current = store.snapshot();
        assert_eq!(current.version, 1);
        assert_eq!(current.api_key.as_deref(), Some("key-1"));
    }

    #[test]
    fn test_earlier_snapshot_is_unaffected() {
        let store = store();
        let before = store.snapshot();

        store
            .apply(SettingsUpdate {
                model: Some("gemini-2.0-flash-exp".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(before.model, None);
        assert_eq!(before.version, 1);
        assert_eq!(
            store.snapshot().effective_model(),
            "gemini-2.0-flash-exp".to_string()
        );
    }

    #[test]
    fn test_effective_model_falls_back_to_provider_default() {
        let settings = RuntimeSettings::new(ProviderKind::HuggingFace, None, None, None);
        assert_eq!(settings.effective_model(), "yisol/IDM-VTON");
    }

    #[test]
    fn test_gemini_model_is_not_reported_for_huggingface() {
        let store = store();
        store
            .apply(SettingsUpdate {
                model: Some("gemini-2.0-flash-exp".to_string()),
                ..Default::default()
            })
            .unwrap();

        let switched = store
            .apply(SettingsUpdate {
                provider: Some("huggingface".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(switched.effective_model(), crate::config::DEFAULT_HF_SPACE);

        let back = store
            .apply(SettingsUpdate {
                provider: Some("gemini".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(back.effective_model(), "gemini-2.0-flash-exp");
    }
}
