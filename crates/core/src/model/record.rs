use chrono::{DateTime, Duration, Utc};

use crate::model::{AnswerSet, Difficulty, Step, StepOutcome};

//
// ─── STEP RECORD ───────────────────────────────────────────────────────────────
//

/// Final state of one step of a resolved problem.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub step: Step,
    /// Last graded submission; blank when the step resolved without one.
    pub answers: AnswerSet,
    pub outcome: StepOutcome,
    pub attempts: u32,
    /// Correct values, exposed for display after resolution.
    pub solution: AnswerSet,
    /// Per-slot correctness of `answers`; empty when nothing was graded.
    pub per_slot: Vec<bool>,
}

//
// ─── PROBLEM RECORD ────────────────────────────────────────────────────────────
//

/// Ledger entry for a problem that reached a terminal outcome.
///
/// Built exactly once at resolution and never mutated afterwards; all
/// fields are read through accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemRecord<P> {
    problem: P,
    steps: Vec<StepRecord>,
    overall_correct: bool,
    was_revealed: bool,
    timed_out: bool,
    time_spent: Duration,
    difficulty: Difficulty,
    resolved_at: DateTime<Utc>,
}

impl<P> ProblemRecord<P> {
    /// Assemble a record from the steps the problem went through.
    ///
    /// Negative elapsed time (clock skew) is stored as zero.
    #[must_use]
    pub fn new(
        problem: P,
        steps: Vec<StepRecord>,
        difficulty: Difficulty,
        activated_at: DateTime<Utc>,
        resolved_at: DateTime<Utc>,
        timed_out: bool,
    ) -> Self {
        let overall_correct =
            !steps.is_empty() && steps.iter().all(|step| step.outcome.is_correct());
        let was_revealed = steps
            .iter()
            .any(|step| step.outcome == StepOutcome::Revealed);
        let time_spent = (resolved_at - activated_at).max(Duration::zero());

        Self {
            problem,
            steps,
            overall_correct,
            was_revealed,
            timed_out,
            time_spent,
            difficulty,
            resolved_at,
        }
    }

    #[must_use]
    pub fn problem(&self) -> &P {
        &self.problem
    }

    #[must_use]
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    #[must_use]
    pub fn step(&self, step: Step) -> Option<&StepRecord> {
        self.steps.iter().find(|record| record.step == step)
    }

    #[must_use]
    pub fn overall_correct(&self) -> bool {
        self.overall_correct
    }

    #[must_use]
    pub fn was_revealed(&self) -> bool {
        self.was_revealed
    }

    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Terminal outcome of the problem (that of its last step).
    #[must_use]
    pub fn outcome(&self) -> StepOutcome {
        self.steps
            .last()
            .map_or(StepOutcome::IncorrectExhausted, |step| step.outcome)
    }

    #[must_use]
    pub fn attempts_used(&self) -> Vec<u32> {
        self.steps.iter().map(|step| step.attempts).collect()
    }

    #[must_use]
    pub fn total_attempts(&self) -> u32 {
        self.steps
            .iter()
            .fold(0_u32, |acc, step| acc.saturating_add(step.attempts))
    }

    /// Time on the problem across all its steps, excluding time the session
    /// spent in review.
    #[must_use]
    pub fn time_spent(&self) -> Duration {
        self.time_spent
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn time_spent_seconds(&self) -> f64 {
        self.time_spent.num_milliseconds() as f64 / 1000.0
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }
}
