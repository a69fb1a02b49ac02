use std::fmt;

use drill_core::model::{AnswerSet, Difficulty, SlotKind, Step, TopicId, parse_integer};
use drill_core::source::{Grade, ProblemSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{BLANK, Topic};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operation {
    #[must_use]
    pub fn symbol(self) -> char {
        match self {
            Operation::Add => '+',
            Operation::Subtract => '-',
            Operation::Multiply => '×',
            Operation::Divide => '÷',
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// `left op right = ☐`, always with an integer result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArithmeticProblem {
    pub left: i64,
    pub right: i64,
    pub operation: Operation,
    pub difficulty: Difficulty,
}

impl ArithmeticProblem {
    #[must_use]
    pub fn answer(&self) -> i64 {
        match self.operation {
            Operation::Add => self.left + self.right,
            Operation::Subtract => self.left - self.right,
            Operation::Multiply => self.left * self.right,
            // divisions are generated exact and with a non-zero divisor
            Operation::Divide => self.left.checked_div(self.right).unwrap_or(0),
        }
    }
}

/// Single-blank arithmetic; operand ranges and operations grow with level.
#[derive(Debug, Clone)]
pub struct ArithmeticSource {
    rng: StdRng,
}

impl Default for ArithmeticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ArithmeticSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible sequence of problems.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn pick_operation(&mut self, difficulty: Difficulty) -> Operation {
        let choices: &[Operation] = match difficulty.level() {
            1 => &[Operation::Add, Operation::Subtract],
            2 => &[Operation::Add, Operation::Subtract, Operation::Multiply],
            _ => &[
                Operation::Add,
                Operation::Subtract,
                Operation::Multiply,
                Operation::Divide,
            ],
        };
        choices[self.rng.random_range(0..choices.len())]
    }
}

impl ProblemSource for ArithmeticSource {
    type Problem = ArithmeticProblem;

    fn topic(&self) -> TopicId {
        Topic::Arithmetic.topic_id()
    }

    fn generate(&mut self, difficulty: Difficulty) -> Self::Problem {
        let level = i64::from(difficulty.level());
        let operation = self.pick_operation(difficulty);
        let sum_max = [10, 20, 100, 500, 1_000][usize::from(difficulty.level() - 1)];
        let factor_max = 2 + level * 2;

        let (left, right) = match operation {
            Operation::Add => {
                let left = self.rng.random_range(0..=sum_max);
                (left, self.rng.random_range(0..=sum_max - left))
            }
            Operation::Subtract => {
                let left = self.rng.random_range(0..=sum_max);
                let right = if level >= 4 {
                    self.rng.random_range(0..=sum_max)
                } else {
                    self.rng.random_range(0..=left)
                };
                (left, right)
            }
            Operation::Multiply => (
                self.rng.random_range(1..=factor_max),
                self.rng.random_range(1..=factor_max),
            ),
            Operation::Divide => {
                let divisor = self.rng.random_range(2..=factor_max);
                let quotient = self.rng.random_range(1..=factor_max);
                (divisor * quotient, divisor)
            }
        };

        ArithmeticProblem {
            left,
            right,
            operation,
            difficulty,
        }
    }

    fn difficulty_of(&self, problem: &Self::Problem) -> Difficulty {
        problem.difficulty
    }

    fn slot_kinds(&self, _problem: &Self::Problem, step: Step) -> Vec<SlotKind> {
        match step {
            Step::Blanks => vec![SlotKind::Integer],
            Step::FollowUp => Vec::new(),
        }
    }

    fn solution(&self, problem: &Self::Problem, step: Step) -> AnswerSet {
        match step {
            Step::Blanks => AnswerSet::new([problem.answer().to_string()]),
            Step::FollowUp => AnswerSet::default(),
        }
    }

    fn grade(&self, problem: &Self::Problem, step: Step, answers: &AnswerSet) -> Grade {
        match step {
            Step::Blanks => Grade::from_slots(vec![
                answers.get(0).and_then(parse_integer) == Some(problem.answer()),
            ]),
            Step::FollowUp => Grade::from_slots(Vec::new()),
        }
    }

    fn prompt(&self, problem: &Self::Problem, _step: Step) -> String {
        format!(
            "{} {} {} = {BLANK}",
            problem.left, problem.operation, problem.right
        )
    }
}
