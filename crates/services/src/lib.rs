#![forbid(unsafe_code)]

pub mod error;
pub mod sessions;
pub mod settings_service;
pub mod topics;

pub use drill_core::Clock;
pub use sessions as session;

pub use error::{SessionError, SettingsServiceError};
pub use settings_service::{SettingsChangedHook, SettingsService};
pub use topics::Topic;

pub use sessions::{
    Advance, Phase, ProgressEvent, ProgressSink, ProgressTally, Resolution, SessionAdvance,
    SessionController, SessionLoopService, SessionProgress, SessionSummaryListItem,
    SessionSummaryService, SubmitResult, TimerFired,
};
