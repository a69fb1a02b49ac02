mod controller;
mod ledger;
mod progress;
mod review;
mod view;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use controller::{
    Advance, MAX_GENERATION_ATTEMPTS, Phase, Resolution, SessionController, SubmissionTicket,
    SubmitResult, TimerFired,
};
pub use ledger::SessionLedger;
pub use progress::{
    NoopProgress, ProgressEvent, ProgressSink, ProgressTally, SessionProgress, TopicTally,
};
pub use review::ReviewNavigator;
pub use view::{SessionSummaryId, SessionSummaryListItem, SessionSummaryService};
pub use workflow::{SessionAdvance, SessionLoopService};
