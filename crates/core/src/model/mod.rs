mod answer;
mod difficulty;
mod ids;
mod outcome;
mod record;
mod settings;
mod summary;

pub use answer::{
    AnswerSet, InputError, SlotError, SlotIssue, SlotKind, parse_decimal, parse_integer,
};
pub use difficulty::{Difficulty, DifficultyError, MAX_DIFFICULTY, MIN_DIFFICULTY};
pub use ids::{SessionId, TopicId, TopicIdError};
pub use outcome::{Step, StepOutcome};
pub use record::{ProblemRecord, StepRecord};
pub use settings::{SessionSettings, SessionSettingsDraft, SettingsError};
pub use summary::{DifficultySpan, OutcomeCounts, SessionSummary, SessionSummaryError};
