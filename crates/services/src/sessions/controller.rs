use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use drill_core::Clock;
use drill_core::adaptive::{DifficultyAdapter, Escalation};
use drill_core::attempts::AttemptTracker;
use drill_core::model::{
    AnswerSet, Difficulty, DifficultySpan, InputError, ProblemRecord, SessionId, SessionSettings,
    SessionSummary, SlotKind, Step, StepOutcome, StepRecord, TopicId,
};
use drill_core::source::{MalformedProblem, ProblemSource, check_grade, check_problem};
use drill_core::timer::{ArmedTimer, TimerKind, TimerSlot, TimerToken};

use super::ledger::SessionLedger;
use super::progress::{NoopProgress, ProgressEvent, ProgressSink, SessionProgress};
use super::review::ReviewNavigator;
use crate::error::SessionError;

/// Fresh problems requested from a source before giving up on it.
pub const MAX_GENERATION_ATTEMPTS: usize = 3;

//
// ─── PHASE ─────────────────────────────────────────────────────────────────────
//

/// Where the live session is. Reviewing is tracked separately and pauses
/// transitions without replacing the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// A problem is live and waiting for a submission on `Step`.
    Active(Step),
    /// The last problem resolved; waiting for continue.
    ShowingOutcome,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Active(step) => write!(f, "answering the {step} step"),
            Phase::ShowingOutcome => f.write_str("showing an outcome"),
            Phase::Complete => f.write_str("complete"),
        }
    }
}

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

/// Identifies one attempt of one step of one problem.
///
/// Hosts take a ticket when input is presented and submit with it, so a
/// duplicate delivery of the same submission is rejected instead of graded
/// twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmissionTicket {
    sequence: u64,
    step: Step,
    attempt: u32,
}

impl SubmissionTicket {
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn step(&self) -> Step {
        self.step
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// A problem reaching its terminal outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Ledger index of the new record.
    pub index: usize,
    pub outcome: StepOutcome,
    pub overall_correct: bool,
    pub was_revealed: bool,
    pub timed_out: bool,
    /// Correctness of the last graded answers; empty when nothing was graded.
    pub per_slot: Vec<bool>,
    /// Correct values for the step that resolved.
    pub solution: AnswerSet,
    pub escalation: Option<Escalation>,
    /// Target after any compensation.
    pub target: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResult {
    /// Input failed slot validation; no attempt was used.
    Invalid(InputError),
    /// Incorrect, with attempts to spare.
    Retry {
        per_slot: Vec<bool>,
        attempts_used: u32,
        /// `None` when attempts are unlimited.
        attempts_left: Option<u32>,
    },
    /// Blanks were correct; the dependent follow-up step is now live.
    NextStep { per_slot: Vec<bool> },
    Resolved(Resolution),
}

/// What `continue_session` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// A new problem is live.
    Next { sequence: u64 },
    /// The target was met; the session is over.
    Complete,
}

/// What a timer firing did.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerFired {
    /// Token no longer matched its slot; nothing happened.
    Stale,
    Advanced(Advance),
    TimedOut(Resolution),
}

//
// ─── LIVE PROBLEM ──────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone)]
struct LiveProblem<P> {
    problem: P,
    difficulty: Difficulty,
    /// Shifted forward by time spent in review, so elapsed time counts only
    /// time on the problem.
    activated_at: DateTime<Utc>,
    resolved_steps: Vec<StepRecord>,
    last_graded: Option<(AnswerSet, Vec<bool>)>,
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Drives one practice session over a pluggable `ProblemSource`.
///
/// All operations run to completion synchronously. Timers are modelled as
/// deadlines: the host sleeps until `next_deadline()` and hands the token back
/// through `fire_timer`, or calls `poll_timers` on its own schedule. Every
/// transition that leaves an arming state cancels the matching timer, so a
/// late token is a no-op.
pub struct SessionController<S: ProblemSource> {
    source: S,
    settings: SessionSettings,
    clock: Clock,
    session_id: SessionId,
    topic: TopicId,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    summary_id: Option<i64>,

    phase: Phase,
    live: Option<LiveProblem<S::Problem>>,
    sequence: u64,
    attempts: AttemptTracker,
    draft: AnswerSet,

    adapter: DifficultyAdapter,
    start_difficulty: Difficulty,
    correct_run: u32,
    best_run: u32,
    target: u32,
    ledger: SessionLedger<S::Problem>,

    review: Option<ReviewNavigator>,
    auto_continue: TimerSlot,
    time_limit: TimerSlot,
    auto_continue_held: bool,
    review_entered_at: Option<DateTime<Utc>>,
    sink: Arc<dyn ProgressSink>,
}

impl<S: ProblemSource> fmt::Debug for SessionController<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("session_id", &self.session_id)
            .field("topic", &self.topic)
            .field("phase", &self.phase)
            .field("sequence", &self.sequence)
            .field("completed", &self.ledger.len())
            .field("target", &self.target)
            .field("difficulty", &self.adapter.level())
            .field("reviewing", &self.review.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: ProblemSource> SessionController<S> {
    /// Start a session and make its first problem live.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::MalformedProblem` if the source cannot produce a
    /// well-formed problem within `MAX_GENERATION_ATTEMPTS` tries.
    pub fn new(source: S, settings: SessionSettings, clock: Clock) -> Result<Self, SessionError> {
        let started_at = clock.now();
        let start_difficulty = settings.difficulty();
        let topic = source.topic();
        let mut controller = Self {
            source,
            clock,
            session_id: SessionId::new(),
            topic,
            started_at,
            completed_at: None,
            summary_id: None,
            phase: Phase::Active(Step::Blanks),
            live: None,
            sequence: 0,
            attempts: AttemptTracker::new(settings.max_attempts()),
            draft: AnswerSet::default(),
            adapter: DifficultyAdapter::new(start_difficulty),
            start_difficulty,
            correct_run: 0,
            best_run: 0,
            target: settings.problem_count(),
            ledger: SessionLedger::new(),
            review: None,
            auto_continue: TimerSlot::new(TimerKind::AutoContinue),
            time_limit: TimerSlot::new(TimerKind::TimeLimit),
            auto_continue_held: false,
            review_entered_at: None,
            sink: Arc::new(NoopProgress),
            settings,
        };
        controller.activate_next()?;
        tracing::info!(
            session_id = %controller.session_id,
            topic = %controller.topic,
            target = controller.target,
            difficulty = %start_difficulty,
            "session started"
        );
        Ok(controller)
    }

    /// Route progress events to `sink` instead of dropping them.
    #[must_use]
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn topic(&self) -> &TopicId {
        &self.topic
    }

    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    #[must_use]
    pub fn is_reviewing(&self) -> bool {
        self.review.is_some()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn summary_id(&self) -> Option<i64> {
        self.summary_id
    }

    pub(crate) fn set_summary_id(&mut self, id: i64) {
        self.summary_id = Some(id);
    }

    /// Sequence number of the live (or last) problem, starting at 1.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.adapter.level()
    }

    /// Consecutive fully-correct problems, counted whether or not adaptive
    /// difficulty is on. Restarts at zero when the level rises.
    #[must_use]
    pub fn streak(&self) -> u32 {
        self.correct_run
    }

    #[must_use]
    pub fn best_streak(&self) -> u32 {
        self.best_run
    }

    #[must_use]
    pub fn target_problem_count(&self) -> u32 {
        self.target
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.ledger.len()
    }

    #[must_use]
    pub fn ledger(&self) -> &SessionLedger<S::Problem> {
        &self.ledger
    }

    #[must_use]
    pub fn current_problem(&self) -> Option<&S::Problem> {
        self.live.as_ref().map(|live| &live.problem)
    }

    #[must_use]
    pub fn current_step(&self) -> Option<Step> {
        match self.phase {
            Phase::Active(step) => Some(step),
            _ => None,
        }
    }

    #[must_use]
    pub fn attempts_used(&self) -> u32 {
        self.attempts.attempts()
    }

    /// Plain-text prompt for the live step.
    #[must_use]
    pub fn prompt(&self) -> Option<String> {
        let step = self.current_step()?;
        let live = self.live.as_ref()?;
        Some(self.source.prompt(&live.problem, step))
    }

    /// Declared slot kinds of the live step; empty when nothing is live.
    #[must_use]
    pub fn slot_kinds(&self) -> Vec<SlotKind> {
        match (self.current_step(), self.live.as_ref()) {
            (Some(step), Some(live)) => self.source.slot_kinds(&live.problem, step),
            _ => Vec::new(),
        }
    }

    /// Pending input for the live step. Survives review untouched.
    #[must_use]
    pub fn draft(&self) -> &AnswerSet {
        &self.draft
    }

    /// Edit one slot of the pending input.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` unless a step is live, or
    /// `SessionError::Reviewing` while reviewing.
    pub fn set_draft(&mut self, slot: usize, value: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_not_reviewing("edit input")?;
        self.active_step("edit input")?;
        self.draft.set(slot, value);
        Ok(())
    }

    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Mutable access for hosts and tests driving a fixed clock.
    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let answered = u32::try_from(self.ledger.len()).unwrap_or(u32::MAX);
        let correct = self
            .ledger
            .iter()
            .filter(|record| record.overall_correct())
            .count();
        SessionProgress {
            total: self.target,
            answered,
            remaining: self.target.saturating_sub(answered),
            correct: u32::try_from(correct).unwrap_or(u32::MAX),
            streak: self.correct_run,
            difficulty: self.adapter.level(),
            is_complete: self.is_complete(),
        }
    }

    //
    // ─── ANSWERING ─────────────────────────────────────────────────────────────
    //

    /// Ticket for the next submission on the live step.
    #[must_use]
    pub fn ticket(&self) -> Option<SubmissionTicket> {
        let step = self.current_step()?;
        Some(SubmissionTicket {
            sequence: self.sequence,
            step,
            attempt: self.attempts.attempts(),
        })
    }

    /// Submit only if `ticket` still names the live attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StaleSubmission` for an outdated ticket, plus
    /// everything `submit_answer` returns.
    pub fn submit_with_ticket(
        &mut self,
        ticket: SubmissionTicket,
        answers: AnswerSet,
    ) -> Result<SubmitResult, SessionError> {
        self.ensure_not_reviewing("submit")?;
        if self.ticket() != Some(ticket) {
            tracing::debug!(?ticket, "rejected stale submission");
            return Err(SessionError::StaleSubmission);
        }
        self.submit_answer(answers)
    }

    /// Submit the pending draft input.
    ///
    /// # Errors
    ///
    /// See `submit_answer`.
    pub fn submit_draft(&mut self) -> Result<SubmitResult, SessionError> {
        let answers = self.draft.clone();
        self.submit_answer(answers)
    }

    /// Grade `answers` against the live step.
    ///
    /// Input that fails slot validation is returned as `SubmitResult::Invalid`
    /// without using an attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` unless a step is live,
    /// `SessionError::Reviewing` while reviewing, and
    /// `SessionError::MalformedProblem` if the grade does not match the
    /// declared slots. In that case the problem is discarded unrecorded and a
    /// replacement is made live when possible.
    pub fn submit_answer(&mut self, answers: AnswerSet) -> Result<SubmitResult, SessionError> {
        self.ensure_not_reviewing("submit")?;
        let step = self.active_step("submit")?;
        let Some(live) = self.live.as_ref() else {
            return Err(self.invalid_state("submit"));
        };

        let kinds = self.source.slot_kinds(&live.problem, step);
        if let Err(input) = answers.validate(&kinds) {
            tracing::debug!(%step, issues = input.issues().len(), "rejected invalid input");
            return Ok(SubmitResult::Invalid(input));
        }

        self.attempts.record_attempt();
        let grade = self.source.grade(&live.problem, step, &answers);
        if let Err(malformed) = check_grade(step, kinds.len(), &grade) {
            return Err(self.discard_malformed(malformed));
        }

        if grade.correct {
            let second_step =
                step == Step::Blanks && self.source.requires_second_step(&live.problem);
            self.close_step(step, answers, StepOutcome::Correct, grade.per_slot.clone());
            if second_step {
                self.enter_follow_up();
                return Ok(SubmitResult::NextStep {
                    per_slot: grade.per_slot,
                });
            }
            return self.resolve("submit", false).map(SubmitResult::Resolved);
        }

        if self.attempts.has_retries_left() {
            if let Some(live) = self.live.as_mut() {
                live.last_graded = Some((answers.clone(), grade.per_slot.clone()));
            }
            self.draft = answers;
            tracing::debug!(
                %step,
                attempts = self.attempts.attempts(),
                "incorrect, retry allowed"
            );
            return Ok(SubmitResult::Retry {
                per_slot: grade.per_slot,
                attempts_used: self.attempts.attempts(),
                attempts_left: self.attempts.remaining(),
            });
        }

        self.close_step(step, answers, StepOutcome::IncorrectExhausted, grade.per_slot);
        self.resolve("submit", false).map(SubmitResult::Resolved)
    }

    /// Give up on the blanks and show the answer.
    ///
    /// Counts as if every attempt was used.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::RevealUnavailable` on the follow-up step,
    /// `SessionError::InvalidState` unless the blanks step is live, and
    /// `SessionError::Reviewing` while reviewing.
    pub fn reveal_answer(&mut self) -> Result<Resolution, SessionError> {
        self.ensure_not_reviewing("reveal")?;
        match self.phase {
            Phase::Active(Step::Blanks) => {}
            Phase::Active(Step::FollowUp) => return Err(SessionError::RevealUnavailable),
            _ => return Err(self.invalid_state("reveal")),
        }

        self.attempts.exhaust();
        let (answers, per_slot) = self.last_graded();
        self.close_step(Step::Blanks, answers, StepOutcome::Revealed, per_slot);
        self.resolve("reveal", false)
    }

    //
    // ─── CONTINUE ──────────────────────────────────────────────────────────────
    //

    /// Leave the outcome screen: finish the session or make the next problem
    /// live. A no-op once complete.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` while a problem is live,
    /// `SessionError::Reviewing` while reviewing, and
    /// `SessionError::MalformedProblem` if no well-formed problem could be
    /// generated (the session stays on the outcome screen).
    pub fn continue_session(&mut self) -> Result<Advance, SessionError> {
        match self.phase {
            Phase::Complete => return Ok(Advance::Complete),
            Phase::Active(_) => return Err(self.invalid_state("continue")),
            Phase::ShowingOutcome => {}
        }
        self.ensure_not_reviewing("continue")?;
        self.auto_continue.cancel();

        if self.ledger.len() >= self.target_len() {
            self.finish();
            return Ok(Advance::Complete);
        }

        self.activate_next()?;
        Ok(Advance::Next {
            sequence: self.sequence,
        })
    }

    //
    // ─── TIMERS ────────────────────────────────────────────────────────────────
    //

    /// Earliest armed timer, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<ArmedTimer> {
        [self.time_limit.armed(), self.auto_continue.armed()]
            .into_iter()
            .flatten()
            .min_by_key(|armed| armed.deadline)
    }

    /// Time left on the live problem's time limit, armed or suspended.
    #[must_use]
    pub fn time_remaining(&self) -> Option<Duration> {
        self.time_limit.remaining(self.clock.now())
    }

    /// Handle a timer firing. Stale tokens are ignored.
    ///
    /// # Errors
    ///
    /// Propagates `continue_session` errors for an auto-continue firing.
    pub fn fire_timer(&mut self, token: TimerToken) -> Result<TimerFired, SessionError> {
        match token.kind() {
            TimerKind::AutoContinue => {
                if !self.auto_continue.accept(token) {
                    tracing::debug!(epoch = token.epoch(), "ignored stale auto-continue timer");
                    return Ok(TimerFired::Stale);
                }
                if self.phase != Phase::ShowingOutcome || self.review.is_some() {
                    return Ok(TimerFired::Stale);
                }
                self.continue_session().map(TimerFired::Advanced)
            }
            TimerKind::TimeLimit => {
                if !self.time_limit.accept(token) {
                    tracing::debug!(epoch = token.epoch(), "ignored stale time-limit timer");
                    return Ok(TimerFired::Stale);
                }
                let Phase::Active(step) = self.phase else {
                    return Ok(TimerFired::Stale);
                };
                if self.review.is_some() {
                    return Ok(TimerFired::Stale);
                }
                tracing::info!(sequence = self.sequence, %step, "time limit expired");
                let (answers, per_slot) = self.last_graded();
                self.close_step(step, answers, StepOutcome::IncorrectExhausted, per_slot);
                self.resolve("time limit", true).map(TimerFired::TimedOut)
            }
        }
    }

    /// Fire the earliest timer whose deadline has passed on the controller's
    /// clock. Call repeatedly until it returns `None`.
    ///
    /// # Errors
    ///
    /// See `fire_timer`.
    pub fn poll_timers(&mut self) -> Result<Option<TimerFired>, SessionError> {
        let now = self.clock.now();
        let due = self
            .time_limit
            .due(now)
            .or_else(|| self.auto_continue.due(now));
        match due {
            Some(token) => self.fire_timer(token).map(Some),
            None => Ok(None),
        }
    }

    /// Hold-to-pause: stop auto-continue until released or the next problem
    /// goes live.
    pub fn hold_auto_continue(&mut self) {
        if self.auto_continue_held {
            return;
        }
        self.auto_continue_held = true;
        self.auto_continue.suspend(self.clock.now());
    }

    /// Release a hold; a paused auto-continue resumes with its remaining time.
    pub fn release_auto_continue(&mut self) {
        if !self.auto_continue_held {
            return;
        }
        self.auto_continue_held = false;
        if self.review.is_none() {
            self.auto_continue.resume(self.clock.now());
        }
    }

    #[must_use]
    pub fn is_auto_continue_held(&self) -> bool {
        self.auto_continue_held
    }

    /// Cancel every timer. Call when the host drops the session.
    pub fn teardown(&mut self) {
        self.auto_continue.cancel();
        self.time_limit.cancel();
        self.review = None;
        self.review_entered_at = None;
        tracing::debug!(session_id = %self.session_id, "session torn down");
    }

    //
    // ─── REVIEW ────────────────────────────────────────────────────────────────
    //

    /// Start browsing resolved problems, beginning at the most recent one.
    ///
    /// Live timers are suspended with their remaining time.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NothingToReview` if no problem has resolved yet.
    pub fn enter_review(&mut self) -> Result<&ProblemRecord<S::Problem>, SessionError> {
        if self.review.is_none() {
            let nav = ReviewNavigator::new(self.ledger.len()).ok_or(SessionError::NothingToReview)?;
            let now = self.clock.now();
            self.auto_continue.suspend(now);
            self.time_limit.suspend(now);
            self.review = Some(nav);
            self.review_entered_at = Some(now);
            tracing::debug!(records = nav.len(), "entered review");
        }
        self.reviewed_record().ok_or(SessionError::NothingToReview)
    }

    /// Record under the review cursor.
    #[must_use]
    pub fn reviewed_record(&self) -> Option<&ProblemRecord<S::Problem>> {
        self.review.and_then(|nav| self.ledger.at(nav.index()))
    }

    #[must_use]
    pub fn review_position(&self) -> Option<ReviewNavigator> {
        self.review
    }

    pub fn review_next(&mut self) -> Option<&ProblemRecord<S::Problem>> {
        let index = self.review.as_mut()?.next();
        self.ledger.at(index)
    }

    pub fn review_prev(&mut self) -> Option<&ProblemRecord<S::Problem>> {
        let index = self.review.as_mut()?.prev();
        self.ledger.at(index)
    }

    pub fn review_jump(&mut self, index: usize) -> Option<&ProblemRecord<S::Problem>> {
        let index = self.review.as_mut()?.jump(index);
        self.ledger.at(index)
    }

    /// Return to the live session exactly where it was left, resuming any
    /// suspended timers.
    pub fn exit_review(&mut self) {
        if self.review.take().is_none() {
            return;
        }
        if let Some(entered) = self.review_entered_at.take() {
            let paused = self.clock.since(entered);
            if let Some(live) = self.live.as_mut() {
                live.activated_at += paused;
            }
        }
        let now = self.clock.now();
        self.time_limit.resume(now);
        if !self.auto_continue_held {
            self.auto_continue.resume(now);
        }
        tracing::debug!("left review");
    }

    //
    // ─── SUMMARY ───────────────────────────────────────────────────────────────
    //

    /// Aggregate results of a completed session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotComplete` before completion, or
    /// `SessionError::Summary` if the records cannot be summarized.
    pub fn summary(&self) -> Result<SessionSummary, SessionError> {
        let completed_at = self.completed_at.ok_or(SessionError::NotComplete)?;
        let summary = SessionSummary::from_records(
            self.session_id,
            self.topic.clone(),
            self.started_at,
            completed_at,
            self.ledger.records(),
            DifficultySpan {
                start: self.start_difficulty,
                end: self.adapter.level(),
                best_streak: self.best_run,
            },
        )?;
        Ok(summary)
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    fn invalid_state(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            phase: self.phase,
        }
    }

    fn ensure_not_reviewing(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.review.is_some() {
            Err(SessionError::Reviewing { operation })
        } else {
            Ok(())
        }
    }

    fn active_step(&self, operation: &'static str) -> Result<Step, SessionError> {
        match self.phase {
            Phase::Active(step) => Ok(step),
            _ => Err(self.invalid_state(operation)),
        }
    }

    fn target_len(&self) -> usize {
        usize::try_from(self.target).unwrap_or(usize::MAX)
    }

    fn last_graded(&self) -> (AnswerSet, Vec<bool>) {
        self.live
            .as_ref()
            .and_then(|live| live.last_graded.clone())
            .unwrap_or_default()
    }

    fn close_step(
        &mut self,
        step: Step,
        answers: AnswerSet,
        outcome: StepOutcome,
        per_slot: Vec<bool>,
    ) {
        let attempts = self.attempts.attempts();
        let Some(live) = self.live.as_mut() else {
            return;
        };
        let solution = self.source.solution(&live.problem, step);
        live.resolved_steps.push(StepRecord {
            step,
            answers,
            outcome,
            attempts,
            solution,
            per_slot,
        });
        live.last_graded = None;
    }

    fn enter_follow_up(&mut self) {
        self.attempts.reset();
        self.phase = Phase::Active(Step::FollowUp);
        let slots = self
            .live
            .as_ref()
            .map_or(0, |live| self.source.slot_kinds(&live.problem, Step::FollowUp).len());
        self.draft = AnswerSet::blank(slots);
        tracing::debug!(sequence = self.sequence, "blanks correct, follow-up step live");
    }

    /// Turn the live problem into a ledger record and show its outcome.
    fn resolve(
        &mut self,
        operation: &'static str,
        timed_out: bool,
    ) -> Result<Resolution, SessionError> {
        let Some(live) = self.live.take() else {
            return Err(self.invalid_state(operation));
        };
        let now = self.clock.now();
        self.time_limit.cancel();

        let last_step = live.resolved_steps.last().cloned();
        let record = ProblemRecord::new(
            live.problem,
            live.resolved_steps,
            live.difficulty,
            live.activated_at,
            now,
            timed_out,
        );
        let outcome = record.outcome();

        let escalation = if record.overall_correct() {
            self.correct_run = self.correct_run.saturating_add(1);
            self.best_run = self.best_run.max(self.correct_run);
            self.settings
                .adaptive_difficulty()
                .then(|| self.adapter.on_correct())
        } else {
            self.correct_run = 0;
            if self.settings.adaptive_difficulty() {
                self.adapter.on_incorrect_or_revealed();
            }
            if self.settings.compensation() {
                self.target = self.target.saturating_add(1);
                tracing::debug!(target = self.target, "compensation extended the session");
            }
            None
        };
        if let Some(Escalation::Raised { from, to }) = escalation {
            self.correct_run = 0;
            tracing::info!(%from, %to, "difficulty raised");
        }

        let event = ProgressEvent {
            topic: self.topic.clone(),
            correct: record.overall_correct(),
            time_spent_seconds: record.time_spent_seconds(),
            difficulty: record.difficulty(),
            attempts: record.total_attempts(),
            revealed: record.was_revealed(),
            timed_out,
        };
        let resolution = Resolution {
            index: 0,
            outcome,
            overall_correct: record.overall_correct(),
            was_revealed: record.was_revealed(),
            timed_out,
            per_slot: last_step
                .as_ref()
                .map(|step| step.per_slot.clone())
                .unwrap_or_default(),
            solution: last_step.map(|step| step.solution).unwrap_or_default(),
            escalation,
            target: self.target,
        };
        let index = self.ledger.append(record);

        self.sink.record(&event);
        self.phase = Phase::ShowingOutcome;
        self.draft = AnswerSet::default();
        self.attempts.reset();
        if self.settings.auto_continue() {
            let delay = Duration::milliseconds(i64::from(self.settings.auto_continue_delay_ms()));
            self.auto_continue.arm(now, delay);
            if self.auto_continue_held {
                self.auto_continue.suspend(now);
            }
        }

        tracing::info!(
            sequence = self.sequence,
            ?outcome,
            completed = index + 1,
            target = self.target,
            "problem resolved"
        );
        Ok(Resolution { index, ..resolution })
    }

    fn finish(&mut self) {
        let now = self.clock.now();
        self.phase = Phase::Complete;
        self.completed_at = Some(now);
        self.live = None;
        self.draft = AnswerSet::default();
        self.auto_continue.cancel();
        self.time_limit.cancel();
        tracing::info!(
            session_id = %self.session_id,
            completed = self.ledger.len(),
            difficulty = %self.adapter.level(),
            "session complete"
        );
    }

    /// Generate and check a problem at the current level, making it live.
    fn activate_next(&mut self) -> Result<(), SessionError> {
        let difficulty = self.adapter.level();
        let problem = self.generate_checked(difficulty)?;
        let now = self.clock.now();
        let slots = self.source.slot_kinds(&problem, Step::Blanks).len();

        self.sequence += 1;
        self.live = Some(LiveProblem {
            problem,
            difficulty,
            activated_at: now,
            resolved_steps: Vec::with_capacity(2),
            last_graded: None,
        });
        self.phase = Phase::Active(Step::Blanks);
        self.attempts.reset();
        self.draft = AnswerSet::blank(slots);
        self.auto_continue.cancel();
        self.auto_continue_held = false;
        if self.settings.has_time_limit() {
            let limit = Duration::seconds(i64::from(self.settings.time_limit_secs()));
            self.time_limit.arm(now, limit);
        } else {
            self.time_limit.cancel();
        }
        tracing::debug!(sequence = self.sequence, %difficulty, "problem live");
        Ok(())
    }

    fn generate_checked(&mut self, difficulty: Difficulty) -> Result<S::Problem, MalformedProblem> {
        let mut last_error = None;
        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let problem = self.source.generate(difficulty);
            match check_problem(&self.source, &problem, difficulty) {
                Ok(()) => return Ok(problem),
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "discarded malformed problem");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or(MalformedProblem::NoSlots { step: Step::Blanks }))
    }

    /// Drop a problem whose grade broke its shape and try to replace it.
    fn discard_malformed(&mut self, malformed: MalformedProblem) -> SessionError {
        tracing::warn!(
            sequence = self.sequence,
            error = %malformed,
            "discarded problem after malformed grade"
        );
        self.live = None;
        self.time_limit.cancel();
        self.phase = Phase::ShowingOutcome;
        if let Err(err) = self.activate_next() {
            tracing::warn!(error = %err, "no replacement problem available");
        }
        SessionError::MalformedProblem(malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::model::{SessionSettingsDraft, parse_integer};
    use drill_core::source::Grade;
    use drill_core::time::fixed_clock;

    /// Deterministic source: problem `n` asks for `n`, or for `n` and `n + 1`.
    struct Counting {
        next: i64,
        blanks: usize,
        follow_up: bool,
    }

    impl Counting {
        fn single() -> Self {
            Self {
                next: 1,
                blanks: 1,
                follow_up: false,
            }
        }
    }

    impl ProblemSource for Counting {
        type Problem = (i64, Difficulty);

        fn topic(&self) -> TopicId {
            TopicId::new("counting").unwrap()
        }

        fn generate(&mut self, difficulty: Difficulty) -> Self::Problem {
            let value = self.next;
            self.next += 1;
            (value, difficulty)
        }

        fn difficulty_of(&self, problem: &Self::Problem) -> Difficulty {
            problem.1
        }

        fn slot_kinds(&self, _problem: &Self::Problem, step: Step) -> Vec<SlotKind> {
            match step {
                Step::Blanks => vec![SlotKind::Integer; self.blanks],
                Step::FollowUp => vec![SlotKind::Integer],
            }
        }

        fn solution(&self, problem: &Self::Problem, step: Step) -> AnswerSet {
            match step {
                Step::Blanks => (0..self.blanks)
                    .map(|i| (problem.0 + i64::try_from(i).unwrap()).to_string())
                    .collect(),
                Step::FollowUp => AnswerSet::new([(problem.0 * 10).to_string()]),
            }
        }

        fn grade(&self, problem: &Self::Problem, step: Step, answers: &AnswerSet) -> Grade {
            let expected = self.solution(problem, step);
            Grade::from_slots(
                (0..expected.len())
                    .map(|i| {
                        answers.get(i).and_then(parse_integer)
                            == expected.get(i).and_then(parse_integer)
                    })
                    .collect(),
            )
        }

        fn requires_second_step(&self, _problem: &Self::Problem) -> bool {
            self.follow_up
        }

        fn prompt(&self, problem: &Self::Problem, _step: Step) -> String {
            format!("say {}", problem.0)
        }
    }

    fn settings(edit: impl FnOnce(&mut SessionSettingsDraft)) -> SessionSettings {
        let mut draft = SessionSettingsDraft::new();
        edit(&mut draft);
        draft.validate().unwrap()
    }

    fn correct_answers(controller: &SessionController<Counting>) -> AnswerSet {
        let problem = controller.current_problem().unwrap();
        let step = controller.current_step().unwrap();
        controller.source().solution(problem, step)
    }

    #[test]
    fn first_problem_is_live_at_start() {
        let controller =
            SessionController::new(Counting::single(), SessionSettings::default(), fixed_clock())
                .unwrap();
        assert_eq!(controller.phase(), Phase::Active(Step::Blanks));
        assert_eq!(controller.sequence(), 1);
        assert_eq!(controller.draft().len(), 1);
        assert_eq!(controller.prompt().as_deref(), Some("say 1"));
        assert!(controller.ticket().is_some());
    }

    #[test]
    fn invalid_input_does_not_use_an_attempt() {
        let mut controller = SessionController::new(
            Counting::single(),
            settings(|d| d.max_attempts = 1),
            fixed_clock(),
        )
        .unwrap();

        let result = controller.submit_answer(AnswerSet::new(["  "])).unwrap();
        assert!(matches!(result, SubmitResult::Invalid(_)));
        assert_eq!(controller.attempts_used(), 0);
        assert_eq!(controller.phase(), Phase::Active(Step::Blanks));
    }

    #[test]
    fn per_problem_time_is_recorded() {
        let mut controller =
            SessionController::new(Counting::single(), SessionSettings::default(), fixed_clock())
                .unwrap();
        controller.clock_mut().advance(Duration::seconds(4));
        let answers = correct_answers(&controller);
        controller.submit_answer(answers).unwrap();

        let record = controller.ledger().last().unwrap();
        assert_eq!(record.time_spent(), Duration::seconds(4));
    }

    #[test]
    fn time_in_review_is_not_time_spent() {
        let mut controller = SessionController::new(
            Counting::single(),
            settings(|d| d.time_limit_secs = 30),
            fixed_clock(),
        )
        .unwrap();
        let answers = correct_answers(&controller);
        controller.submit_answer(answers).unwrap();
        controller.continue_session().unwrap();

        controller.clock_mut().advance(Duration::seconds(3));
        controller.enter_review().unwrap();
        controller.clock_mut().advance(Duration::minutes(5));
        controller.exit_review();
        controller.clock_mut().advance(Duration::seconds(2));
        let answers = correct_answers(&controller);
        controller.submit_answer(answers).unwrap();

        let record = controller.ledger().last().unwrap();
        assert_eq!(record.time_spent(), Duration::seconds(5));
        assert!(!record.timed_out());
    }

    #[test]
    fn follow_up_step_resolves_problem_once() {
        let source = Counting {
            next: 3,
            blanks: 2,
            follow_up: true,
        };
        let mut controller =
            SessionController::new(source, SessionSettings::default(), fixed_clock()).unwrap();

        let answers = correct_answers(&controller);
        let result = controller.submit_answer(answers).unwrap();
        assert_eq!(
            result,
            SubmitResult::NextStep {
                per_slot: vec![true, true]
            }
        );
        assert_eq!(controller.phase(), Phase::Active(Step::FollowUp));
        assert!(controller.ledger().is_empty());
        assert_eq!(controller.streak(), 0);
        assert_eq!(controller.draft().len(), 1);

        let result = controller.submit_answer(AnswerSet::new(["30"])).unwrap();
        let SubmitResult::Resolved(resolution) = result else {
            panic!("expected resolution, got {result:?}");
        };
        assert!(resolution.overall_correct);
        let record = controller.ledger().at(0).unwrap();
        assert_eq!(record.steps().len(), 2);
        assert_eq!(record.attempts_used(), vec![1, 1]);
        assert_eq!(controller.streak(), 1);
    }

    #[test]
    fn reveal_is_rejected_on_follow_up_step() {
        let source = Counting {
            next: 1,
            blanks: 1,
            follow_up: true,
        };
        let mut controller =
            SessionController::new(source, SessionSettings::default(), fixed_clock()).unwrap();
        controller.submit_answer(AnswerSet::new(["1"])).unwrap();

        assert!(matches!(
            controller.reveal_answer(),
            Err(SessionError::RevealUnavailable)
        ));
        assert_eq!(controller.phase(), Phase::Active(Step::FollowUp));
        assert!(controller.ledger().is_empty());
    }

    #[test]
    fn reveal_uses_all_attempts_and_marks_record() {
        let mut controller = SessionController::new(
            Counting::single(),
            settings(|d| {
                d.max_attempts = 3;
                d.compensation = true;
                d.problem_count = 2;
            }),
            fixed_clock(),
        )
        .unwrap();
        controller.submit_answer(AnswerSet::new(["9"])).unwrap();

        let resolution = controller.reveal_answer().unwrap();
        assert_eq!(resolution.outcome, StepOutcome::Revealed);
        assert!(resolution.was_revealed);
        assert_eq!(resolution.solution, AnswerSet::new(["1"]));
        assert_eq!(resolution.target, 3);

        let record = controller.ledger().at(0).unwrap();
        assert_eq!(record.attempts_used(), vec![3]);
        assert_eq!(record.steps()[0].answers, AnswerSet::new(["9"]));
        assert!(record.was_revealed());
    }

    #[test]
    fn stale_ticket_is_rejected() {
        let mut controller = SessionController::new(
            Counting::single(),
            settings(|d| d.max_attempts = 3),
            fixed_clock(),
        )
        .unwrap();
        let ticket = controller.ticket().unwrap();

        let first = controller
            .submit_with_ticket(ticket, AnswerSet::new(["5"]))
            .unwrap();
        assert!(matches!(first, SubmitResult::Retry { attempts_used: 1, .. }));

        let duplicate = controller.submit_with_ticket(ticket, AnswerSet::new(["5"]));
        assert!(matches!(duplicate, Err(SessionError::StaleSubmission)));
        assert_eq!(controller.attempts_used(), 1);
    }

    #[test]
    fn continue_requires_outcome_screen() {
        let mut controller =
            SessionController::new(Counting::single(), SessionSettings::default(), fixed_clock())
                .unwrap();
        assert!(matches!(
            controller.continue_session(),
            Err(SessionError::InvalidState { .. })
        ));
    }

    #[test]
    fn time_limit_expiry_resolves_as_timed_out() {
        let mut controller = SessionController::new(
            Counting::single(),
            settings(|d| {
                d.time_limit_secs = 10;
                d.compensation = true;
            }),
            fixed_clock(),
        )
        .unwrap();
        let armed = controller.next_deadline().unwrap();
        assert_eq!(armed.token.kind(), TimerKind::TimeLimit);

        controller.clock_mut().advance(Duration::seconds(9));
        assert!(controller.poll_timers().unwrap().is_none());
        controller.clock_mut().advance(Duration::seconds(1));

        let fired = controller.poll_timers().unwrap().unwrap();
        let TimerFired::TimedOut(resolution) = fired else {
            panic!("expected timeout, got {fired:?}");
        };
        assert_eq!(resolution.outcome, StepOutcome::IncorrectExhausted);
        assert!(resolution.timed_out);
        assert_eq!(controller.target_problem_count(), 11);
        assert_eq!(controller.phase(), Phase::ShowingOutcome);

        // the same token cannot fire twice
        assert_eq!(controller.fire_timer(armed.token).unwrap(), TimerFired::Stale);
    }

    #[test]
    fn answering_cancels_time_limit() {
        let mut controller = SessionController::new(
            Counting::single(),
            settings(|d| d.time_limit_secs = 5),
            fixed_clock(),
        )
        .unwrap();
        let token = controller.next_deadline().unwrap().token;
        let answers = correct_answers(&controller);
        controller.submit_answer(answers).unwrap();

        controller.clock_mut().advance(Duration::seconds(30));
        assert_eq!(controller.fire_timer(token).unwrap(), TimerFired::Stale);
        assert_eq!(controller.ledger().len(), 1);
        assert!(!controller.ledger().at(0).unwrap().timed_out());
    }

    #[test]
    fn held_auto_continue_waits_for_release() {
        let mut controller = SessionController::new(
            Counting::single(),
            settings(|d| {
                d.auto_continue = true;
                d.auto_continue_delay_ms = 1_000;
            }),
            fixed_clock(),
        )
        .unwrap();
        controller.hold_auto_continue();
        let answers = correct_answers(&controller);
        controller.submit_answer(answers).unwrap();
        assert!(controller.next_deadline().is_none());

        controller.clock_mut().advance(Duration::seconds(5));
        assert!(controller.poll_timers().unwrap().is_none());

        controller.release_auto_continue();
        let armed = controller.next_deadline().unwrap();
        assert_eq!(armed.deadline, controller.clock().now() + Duration::seconds(1));
        controller.clock_mut().advance(Duration::seconds(1));
        assert_eq!(
            controller.poll_timers().unwrap(),
            Some(TimerFired::Advanced(Advance::Next { sequence: 2 }))
        );
    }

    #[test]
    fn hold_ends_with_its_outcome() {
        let mut controller = SessionController::new(
            Counting::single(),
            settings(|d| {
                d.auto_continue = true;
                d.auto_continue_delay_ms = 1_000;
            }),
            fixed_clock(),
        )
        .unwrap();
        let answers = correct_answers(&controller);
        controller.submit_answer(answers).unwrap();
        controller.hold_auto_continue();
        assert!(controller.next_deadline().is_none());

        controller.continue_session().unwrap();
        assert!(!controller.is_auto_continue_held());

        let answers = correct_answers(&controller);
        controller.submit_answer(answers).unwrap();
        let armed = controller.next_deadline().unwrap();
        assert_eq!(armed.token.kind(), TimerKind::AutoContinue);
        controller.clock_mut().advance(Duration::seconds(1));
        assert_eq!(
            controller.poll_timers().unwrap(),
            Some(TimerFired::Advanced(Advance::Next { sequence: 3 }))
        );
    }

    #[test]
    fn teardown_cancels_pending_timers() {
        let mut controller = SessionController::new(
            Counting::single(),
            settings(|d| d.time_limit_secs = 5),
            fixed_clock(),
        )
        .unwrap();
        let token = controller.next_deadline().unwrap().token;
        controller.teardown();
        assert!(controller.next_deadline().is_none());
        assert_eq!(controller.fire_timer(token).unwrap(), TimerFired::Stale);
        assert!(controller.ledger().is_empty());
    }

    #[test]
    fn summary_requires_completion() {
        let controller =
            SessionController::new(Counting::single(), SessionSettings::default(), fixed_clock())
                .unwrap();
        assert!(matches!(controller.summary(), Err(SessionError::NotComplete)));
    }
}
