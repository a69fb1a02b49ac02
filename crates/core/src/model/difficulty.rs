use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lowest difficulty level a problem can be generated at.
pub const MIN_DIFFICULTY: u8 = 1;

/// Highest difficulty level; escalation stops here.
pub const MAX_DIFFICULTY: u8 = 5;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DifficultyError {
    #[error("difficulty must be between {MIN_DIFFICULTY} and {MAX_DIFFICULTY}, got {0}")]
    OutOfRange(u8),
}

/// Difficulty level, always within `[MIN_DIFFICULTY, MAX_DIFFICULTY]`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Difficulty(u8);

impl Difficulty {
    pub const MIN: Self = Self(MIN_DIFFICULTY);
    pub const MAX: Self = Self(MAX_DIFFICULTY);

    /// # Errors
    ///
    /// Returns `DifficultyError::OutOfRange` outside `[MIN_DIFFICULTY, MAX_DIFFICULTY]`.
    pub fn new(level: u8) -> Result<Self, DifficultyError> {
        if (MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&level) {
            Ok(Self(level))
        } else {
            Err(DifficultyError::OutOfRange(level))
        }
    }

    /// Clamp an arbitrary level into range.
    #[must_use]
    pub fn clamped(level: u8) -> Self {
        Self(level.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY))
    }

    #[must_use]
    pub fn level(self) -> u8 {
        self.0
    }

    /// The next level up, or `None` at the cap.
    #[must_use]
    pub fn raised(self) -> Option<Self> {
        (self.0 < MAX_DIFFICULTY).then(|| Self(self.0 + 1))
    }

    #[must_use]
    pub fn is_max(self) -> bool {
        self.0 >= MAX_DIFFICULTY
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::MIN
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = DifficultyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Difficulty> for u8 {
    fn from(value: Difficulty) -> Self {
        value.0
    }
}

impl fmt::Debug for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Difficulty({})", self.0)
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
