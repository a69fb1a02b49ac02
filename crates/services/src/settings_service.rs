use std::fmt;
use std::sync::Arc;

use drill_core::model::{SessionSettings, SessionSettingsDraft, TopicId};
use storage::repository::SettingsRepository;

use crate::error::SettingsServiceError;

/// Callback invoked after settings for a topic were persisted.
pub type SettingsChangedHook = Arc<dyn Fn(&TopicId, &SessionSettings) + Send + Sync>;

/// The only write path for session settings.
#[derive(Clone)]
pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    on_settings_changed: Option<SettingsChangedHook>,
}

impl fmt::Debug for SettingsService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsService")
            .field("has_hook", &self.on_settings_changed.is_some())
            .finish_non_exhaustive()
    }
}

impl SettingsService {
    #[must_use]
    pub fn new(repo: Arc<dyn SettingsRepository>) -> Self {
        Self {
            repo,
            on_settings_changed: None,
        }
    }

    #[must_use]
    pub fn with_on_settings_changed(mut self, hook: SettingsChangedHook) -> Self {
        self.on_settings_changed = Some(hook);
        self
    }

    /// Load persisted settings (or defaults if missing).
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError` on storage failures.
    pub async fn load(&self, topic: &TopicId) -> Result<SessionSettings, SettingsServiceError> {
        let settings = self.repo.get_settings(topic).await?;
        Ok(settings.unwrap_or_default())
    }

    /// Validate and persist new settings, then notify the hook.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError` if validation fails or persistence fails.
    pub async fn save(
        &self,
        topic: &TopicId,
        draft: SessionSettingsDraft,
    ) -> Result<SessionSettings, SettingsServiceError> {
        let settings = draft.validate()?;
        self.repo.save_settings(topic, &settings).await?;
        if let Some(hook) = &self.on_settings_changed {
            hook(topic, &settings);
        }
        tracing::debug!(topic = %topic, "session settings changed");
        Ok(settings)
    }

    /// Parse settings JSON using the camelCase option names.
    ///
    /// Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError::Json` for malformed JSON and
    /// `SettingsServiceError::Settings` for out-of-range values.
    pub fn parse_json(raw: &str) -> Result<SessionSettingsDraft, SettingsServiceError> {
        let draft: SessionSettingsDraft = serde_json::from_str(raw)?;
        draft.clone().validate()?;
        Ok(draft)
    }
}
