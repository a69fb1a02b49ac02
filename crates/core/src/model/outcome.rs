use serde::{Deserialize, Serialize};
use std::fmt;

/// Sub-phase of a problem that takes its own submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Step {
    /// Filling the problem's blanks.
    Blanks,
    /// Dependent computation unlocked after the blanks are correct.
    FollowUp,
}

impl Step {
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Step::Blanks => 0,
            Step::FollowUp => 1,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Blanks => f.write_str("blanks"),
            Step::FollowUp => f.write_str("follow-up"),
        }
    }
}

/// Outcome of a graded step.
///
/// `IncorrectRetryable` is transient; the others are terminal and never
/// change once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Correct,
    IncorrectRetryable,
    IncorrectExhausted,
    Revealed,
}

impl StepOutcome {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, StepOutcome::IncorrectRetryable)
    }

    #[must_use]
    pub fn is_correct(self) -> bool {
        matches!(self, StepOutcome::Correct)
    }

    /// Terminal outcomes that break a streak and trigger compensation.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, StepOutcome::IncorrectExhausted | StepOutcome::Revealed)
    }
}
