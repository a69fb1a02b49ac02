use drill_core::model::{AnswerSet, Difficulty, SlotKind, Step, TopicId, parse_integer};
use drill_core::source::{Grade, ProblemSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{BLANK, Topic};

/// `a × (b + c) = ☐ × b + a × ☐`, then the value of the expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributiveProblem {
    pub a: i64,
    pub b: i64,
    pub c: i64,
    pub difficulty: Difficulty,
}

impl DistributiveProblem {
    #[must_use]
    pub fn value(&self) -> i64 {
        self.a * (self.b + self.c)
    }
}

/// Two-step distributive property drill.
///
/// The blanks step asks for the factors of the expansion; once correct, the
/// follow-up step asks for its value.
#[derive(Debug, Clone)]
pub struct DistributiveSource {
    rng: StdRng,
}

impl Default for DistributiveSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DistributiveSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl ProblemSource for DistributiveSource {
    type Problem = DistributiveProblem;

    fn topic(&self) -> TopicId {
        Topic::Distributive.topic_id()
    }

    fn generate(&mut self, difficulty: Difficulty) -> Self::Problem {
        let level = i64::from(difficulty.level());
        let factor_max = 3 + level * 2;
        let term_max = 5 * level + 5;
        DistributiveProblem {
            a: self.rng.random_range(2..=factor_max),
            b: self.rng.random_range(1..=term_max),
            c: self.rng.random_range(1..=term_max),
            difficulty,
        }
    }

    fn difficulty_of(&self, problem: &Self::Problem) -> Difficulty {
        problem.difficulty
    }

    fn slot_kinds(&self, _problem: &Self::Problem, step: Step) -> Vec<SlotKind> {
        match step {
            Step::Blanks => vec![SlotKind::Integer, SlotKind::Integer],
            Step::FollowUp => vec![SlotKind::Integer],
        }
    }

    fn solution(&self, problem: &Self::Problem, step: Step) -> AnswerSet {
        match step {
            Step::Blanks => AnswerSet::new([problem.a.to_string(), problem.c.to_string()]),
            Step::FollowUp => AnswerSet::new([problem.value().to_string()]),
        }
    }

    fn grade(&self, problem: &Self::Problem, step: Step, answers: &AnswerSet) -> Grade {
        let given = |slot| answers.get(slot).and_then(parse_integer);
        match step {
            Step::Blanks => {
                Grade::from_slots(vec![given(0) == Some(problem.a), given(1) == Some(problem.c)])
            }
            Step::FollowUp => Grade::from_slots(vec![given(0) == Some(problem.value())]),
        }
    }

    fn requires_second_step(&self, _problem: &Self::Problem) -> bool {
        true
    }

    fn prompt(&self, problem: &Self::Problem, step: Step) -> String {
        let DistributiveProblem { a, b, c, .. } = *problem;
        match step {
            Step::Blanks => format!("{a} × ({b} + {c}) = {BLANK} × {b} + {a} × {BLANK}"),
            Step::FollowUp => format!("{a} × {b} + {a} × {c} = {BLANK}"),
        }
    }
}
