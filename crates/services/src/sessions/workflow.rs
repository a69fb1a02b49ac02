use std::sync::Arc;

use drill_core::model::{SessionSettings, TopicId};
use drill_core::source::ProblemSource;
use storage::repository::{SessionSummaryRepository, SettingsRepository};

use super::controller::{Advance, SessionController};
use super::progress::{NoopProgress, ProgressSink};
use crate::Clock;
use crate::error::SessionError;

/// Result of continuing a session through the loop service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionAdvance {
    pub advance: Advance,
    pub is_complete: bool,
    pub summary_id: Option<i64>,
}

/// Orchestrates session start and summary persistence.
///
/// Settings are read once when a session starts; the controller never goes
/// back to storage mid-session.
#[derive(Clone)]
pub struct SessionLoopService {
    clock: Clock,
    settings: Arc<dyn SettingsRepository>,
    summaries: Arc<dyn SessionSummaryRepository>,
    sink: Arc<dyn ProgressSink>,
}

impl SessionLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        settings: Arc<dyn SettingsRepository>,
        summaries: Arc<dyn SessionSummaryRepository>,
    ) -> Self {
        Self {
            clock,
            settings,
            summaries,
            sink: Arc::new(NoopProgress),
        }
    }

    #[must_use]
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Stored settings for `topic`, or defaults when none were saved.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on repository failures.
    pub async fn load_settings(&self, topic: &TopicId) -> Result<SessionSettings, SessionError> {
        let settings = self.settings.get_settings(topic).await?;
        Ok(settings.unwrap_or_default())
    }

    /// Start a session for the source's topic using its stored settings.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` for storage failures or a malformed first problem.
    pub async fn start_session<S: ProblemSource>(
        &self,
        source: S,
    ) -> Result<SessionController<S>, SessionError> {
        let settings = self.load_settings(&source.topic()).await?;
        self.start_session_with(source, settings)
    }

    /// Start a session with explicit settings, bypassing storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::MalformedProblem` if no first problem can be made.
    pub fn start_session_with<S: ProblemSource>(
        &self,
        source: S,
        settings: SessionSettings,
    ) -> Result<SessionController<S>, SessionError> {
        let controller = SessionController::new(source, settings, self.clock)?;
        Ok(controller.with_progress_sink(Arc::clone(&self.sink)))
    }

    /// Continue past the outcome screen and persist the summary when the
    /// session completes.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` for controller or persistence failures.
    pub async fn continue_session<S: ProblemSource>(
        &self,
        controller: &mut SessionController<S>,
    ) -> Result<SessionAdvance, SessionError> {
        let advance = controller.continue_session()?;
        let summary_id = if controller.is_complete() {
            Some(self.finalize_summary(controller).await?)
        } else {
            None
        };
        Ok(SessionAdvance {
            advance,
            is_complete: controller.is_complete(),
            summary_id,
        })
    }

    /// Persist the summary of a completed session exactly once.
    ///
    /// Safe to call again after a failed append; later calls return the
    /// stored id without writing.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotComplete` if the session is still running.
    /// Returns `SessionError::Storage` if persistence fails.
    pub async fn finalize_summary<S: ProblemSource>(
        &self,
        controller: &mut SessionController<S>,
    ) -> Result<i64, SessionError> {
        if let Some(id) = controller.summary_id() {
            return Ok(id);
        }

        let summary = controller.summary()?;
        let id = self.summaries.append_summary(&summary).await?;
        controller.set_summary_id(id);
        tracing::info!(
            id,
            session_id = %summary.session_id(),
            correct = summary.correct(),
            total = summary.total_problems(),
            "session summary persisted"
        );
        Ok(id)
    }
}
