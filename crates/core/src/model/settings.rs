use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Difficulty, DifficultyError};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error(transparent)]
    Difficulty(#[from] DifficultyError),

    #[error("problem count must be between 1 and {max}")]
    InvalidProblemCount { max: u32 },

    #[error("time limit must be at most {max} seconds")]
    InvalidTimeLimit { max: u32 },

    #[error("max attempts must be at most {max}")]
    InvalidMaxAttempts { max: u32 },

    #[error("auto-continue delay must be between {min} and {max} ms")]
    InvalidAutoContinueDelay { min: u32, max: u32 },
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Validated configuration for one practice session.
///
/// `time_limit_secs == 0` and `max_attempts == 0` mean unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct SessionSettings {
    difficulty: Difficulty,
    problem_count: u32,
    #[serde(rename = "timeLimitSeconds")]
    time_limit_secs: u32,
    max_attempts: u32,
    #[serde(rename = "adaptiveDifficultyEnabled")]
    adaptive_difficulty: bool,
    #[serde(rename = "compensationEnabled")]
    compensation: bool,
    #[serde(rename = "autoContinueEnabled")]
    auto_continue: bool,
    auto_continue_delay_ms: u32,
}

impl SessionSettings {
    pub const MAX_PROBLEM_COUNT: u32 = 500;
    pub const MAX_TIME_LIMIT_SECS: u32 = 3_600;
    pub const MAX_ATTEMPTS_CAP: u32 = 20;
    pub const MIN_AUTO_CONTINUE_DELAY_MS: u32 = 250;
    pub const MAX_AUTO_CONTINUE_DELAY_MS: u32 = 30_000;
    pub const DEFAULT_AUTO_CONTINUE_DELAY_MS: u32 = 1_500;

    /// Rehydrate settings from persisted values.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if any stored value is out of range.
    pub fn from_persisted(draft: SessionSettingsDraft) -> Result<Self, SettingsError> {
        draft.validate()
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn problem_count(&self) -> u32 {
        self.problem_count
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> u32 {
        self.time_limit_secs
    }

    #[must_use]
    pub fn has_time_limit(&self) -> bool {
        self.time_limit_secs > 0
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn adaptive_difficulty(&self) -> bool {
        self.adaptive_difficulty
    }

    #[must_use]
    pub fn compensation(&self) -> bool {
        self.compensation
    }

    #[must_use]
    pub fn auto_continue(&self) -> bool {
        self.auto_continue
    }

    #[must_use]
    pub fn auto_continue_delay_ms(&self) -> u32 {
        self.auto_continue_delay_ms
    }

    /// Editable copy of these settings.
    #[must_use]
    pub fn to_draft(&self) -> SessionSettingsDraft {
        SessionSettingsDraft {
            difficulty: self.difficulty.level(),
            problem_count: self.problem_count,
            time_limit_secs: self.time_limit_secs,
            max_attempts: self.max_attempts,
            adaptive_difficulty: self.adaptive_difficulty,
            compensation: self.compensation,
            auto_continue: self.auto_continue,
            auto_continue_delay_ms: self.auto_continue_delay_ms,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::MIN,
            problem_count: 10,
            time_limit_secs: 0,
            max_attempts: 3,
            adaptive_difficulty: true,
            compensation: false,
            auto_continue: false,
            auto_continue_delay_ms: Self::DEFAULT_AUTO_CONTINUE_DELAY_MS,
        }
    }
}

impl<'de> Deserialize<'de> for SessionSettings {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let draft = SessionSettingsDraft::deserialize(deserializer)?;
        draft.validate().map_err(serde::de::Error::custom)
    }
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Unvalidated settings, as edited by a settings screen or read from a file.
///
/// Missing fields fall back to `SessionSettings::default()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::struct_excessive_bools)]
pub struct SessionSettingsDraft {
    pub difficulty: u8,
    pub problem_count: u32,
    #[serde(rename = "timeLimitSeconds")]
    pub time_limit_secs: u32,
    pub max_attempts: u32,
    #[serde(rename = "adaptiveDifficultyEnabled")]
    pub adaptive_difficulty: bool,
    #[serde(rename = "compensationEnabled")]
    pub compensation: bool,
    #[serde(rename = "autoContinueEnabled")]
    pub auto_continue: bool,
    pub auto_continue_delay_ms: u32,
}

impl Default for SessionSettingsDraft {
    fn default() -> Self {
        SessionSettings::default().to_draft()
    }
}

impl SessionSettingsDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the draft into session settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` for an out-of-range difficulty, problem count,
    /// time limit, attempt cap, or auto-continue delay.
    pub fn validate(self) -> Result<SessionSettings, SettingsError> {
        let difficulty = Difficulty::new(self.difficulty)?;

        if self.problem_count == 0 || self.problem_count > SessionSettings::MAX_PROBLEM_COUNT {
            return Err(SettingsError::InvalidProblemCount {
                max: SessionSettings::MAX_PROBLEM_COUNT,
            });
        }
        if self.time_limit_secs > SessionSettings::MAX_TIME_LIMIT_SECS {
            return Err(SettingsError::InvalidTimeLimit {
                max: SessionSettings::MAX_TIME_LIMIT_SECS,
            });
        }
        if self.max_attempts > SessionSettings::MAX_ATTEMPTS_CAP {
            return Err(SettingsError::InvalidMaxAttempts {
                max: SessionSettings::MAX_ATTEMPTS_CAP,
            });
        }
        if !(SessionSettings::MIN_AUTO_CONTINUE_DELAY_MS
            ..=SessionSettings::MAX_AUTO_CONTINUE_DELAY_MS)
            .contains(&self.auto_continue_delay_ms)
        {
            return Err(SettingsError::InvalidAutoContinueDelay {
                min: SessionSettings::MIN_AUTO_CONTINUE_DELAY_MS,
                max: SessionSettings::MAX_AUTO_CONTINUE_DELAY_MS,
            });
        }

        Ok(SessionSettings {
            difficulty,
            problem_count: self.problem_count,
            time_limit_secs: self.time_limit_secs,
            max_attempts: self.max_attempts,
            adaptive_difficulty: self.adaptive_difficulty,
            compensation: self.compensation,
            auto_continue: self.auto_continue,
            auto_continue_delay_ms: self.auto_continue_delay_ms,
        })
    }
}
