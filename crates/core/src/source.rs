use std::fmt;
use thiserror::Error;

use crate::model::{AnswerSet, Difficulty, SlotKind, Step, TopicId};

//
// ─── GRADE ─────────────────────────────────────────────────────────────────────
//

/// Result of grading one full answer set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grade {
    pub correct: bool,
    pub per_slot: Vec<bool>,
}

impl Grade {
    /// Overall correctness is every slot being correct.
    #[must_use]
    pub fn from_slots(per_slot: Vec<bool>) -> Self {
        let correct = !per_slot.is_empty() && per_slot.iter().all(|ok| *ok);
        Self { correct, per_slot }
    }
}

//
// ─── CONTRACT VIOLATIONS ───────────────────────────────────────────────────────
//

/// A problem source broke its own declared shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MalformedProblem {
    #[error("{step} step declares no answer slots")]
    NoSlots { step: Step },

    #[error("{step} step declares {slots} slots but its solution has {solution}")]
    SolutionShape {
        step: Step,
        slots: usize,
        solution: usize,
    },

    #[error("{step} step declares {slots} slots but grading returned {graded}")]
    GradeShape {
        step: Step,
        slots: usize,
        graded: usize,
    },

    #[error("problem generated at level {generated} when {requested} was requested")]
    DifficultyMismatch {
        requested: Difficulty,
        generated: Difficulty,
    },
}

//
// ─── SOURCE ────────────────────────────────────────────────────────────────────
//

/// Pluggable per-topic problem generator and grader.
///
/// Implementations must be free of session state: `generate` may use its own
/// randomness, and `grade` must be deterministic for a given problem and
/// answer set. Numeric slots should accept string-to-number coercion (see
/// [`crate::model::parse_integer`]) while still rejecting semantically
/// different values the topic does not allow.
pub trait ProblemSource {
    type Problem: Clone + fmt::Debug;

    /// Stable key used for settings and summaries.
    fn topic(&self) -> TopicId;

    fn generate(&mut self, difficulty: Difficulty) -> Self::Problem;

    /// Level the problem was built at.
    fn difficulty_of(&self, problem: &Self::Problem) -> Difficulty;

    /// Declared kinds of each answer slot for `step`; fixed per problem.
    fn slot_kinds(&self, problem: &Self::Problem, step: Step) -> Vec<SlotKind>;

    /// Correct values for `step`, one per slot.
    fn solution(&self, problem: &Self::Problem, step: Step) -> AnswerSet;

    fn grade(&self, problem: &Self::Problem, step: Step, answers: &AnswerSet) -> Grade;

    /// Whether a dependent follow-up computation follows the blanks.
    fn requires_second_step(&self, _problem: &Self::Problem) -> bool {
        false
    }

    /// Plain-text rendition of the step for hosts without a renderer.
    fn prompt(&self, problem: &Self::Problem, step: Step) -> String;
}

/// Verify a freshly generated problem against its own declarations.
///
/// # Errors
///
/// Returns `MalformedProblem` when a step has no slots, a solution does not
/// match the slot count, or the problem reports a different level than requested.
pub fn check_problem<S>(
    source: &S,
    problem: &S::Problem,
    requested: Difficulty,
) -> Result<(), MalformedProblem>
where
    S: ProblemSource + ?Sized,
{
    let generated = source.difficulty_of(problem);
    if generated != requested {
        return Err(MalformedProblem::DifficultyMismatch {
            requested,
            generated,
        });
    }

    let mut steps = vec![Step::Blanks];
    if source.requires_second_step(problem) {
        steps.push(Step::FollowUp);
    }

    for step in steps {
        let slots = source.slot_kinds(problem, step).len();
        if slots == 0 {
            return Err(MalformedProblem::NoSlots { step });
        }
        let solution = source.solution(problem, step).len();
        if solution != slots {
            return Err(MalformedProblem::SolutionShape {
                step,
                slots,
                solution,
            });
        }
    }
    Ok(())
}

/// Verify a grade lines up with the declared slot count.
///
/// # Errors
///
/// Returns `MalformedProblem::GradeShape` on a length mismatch.
pub fn check_grade(step: Step, slots: usize, grade: &Grade) -> Result<(), MalformedProblem> {
    if grade.per_slot.len() == slots {
        Ok(())
    } else {
        Err(MalformedProblem::GradeShape {
            step,
            slots,
            graded: grade.per_slot.len(),
        })
    }
}
