use std::fmt;

use drill_core::model::{AnswerSet, Difficulty, SlotKind, Step, TopicId, parse_integer};
use drill_core::source::{Grade, ProblemSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{BLANK, Topic};

/// A fraction with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    pub numerator: i64,
    pub denominator: i64,
}

impl Fraction {
    #[must_use]
    pub fn new(numerator: i64, denominator: i64) -> Self {
        if denominator < 0 {
            Self {
                numerator: -numerator,
                denominator: -denominator,
            }
        } else {
            Self {
                numerator,
                denominator,
            }
        }
    }

    /// Lowest terms; a zero numerator reduces to `0/1`.
    #[must_use]
    pub fn reduced(self) -> Self {
        let divisor = gcd(self.numerator, self.denominator);
        if divisor == 0 {
            return self;
        }
        Self::new(self.numerator / divisor, self.denominator / divisor)
    }

    #[must_use]
    pub fn is_lowest_terms(self) -> bool {
        self.reduced() == self
    }

    #[must_use]
    pub fn plus(self, other: Self) -> Self {
        Self::new(
            self.numerator * other.denominator + other.numerator * self.denominator,
            self.denominator * other.denominator,
        )
        .reduced()
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// `left + right = ☐/☐`; the answer must be in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FractionProblem {
    pub left: Fraction,
    pub right: Fraction,
    pub difficulty: Difficulty,
}

impl FractionProblem {
    #[must_use]
    pub fn answer(&self) -> Fraction {
        self.left.plus(self.right)
    }
}

/// Fraction addition with numerator and denominator blanks.
///
/// An equal but unsimplified answer (`2/4` for `1/2`) is graded incorrect.
#[derive(Debug, Clone)]
pub struct FractionSource {
    rng: StdRng,
}

impl Default for FractionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FractionSource {
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

    fn proper(&mut self, denominator: i64) -> Fraction {
        Fraction::new(self.rng.random_range(1..denominator), denominator)
    }
}

impl ProblemSource for FractionSource {
    type Problem = FractionProblem;

    fn topic(&self) -> TopicId {
        Topic::Fractions.topic_id()
    }

    fn generate(&mut self, difficulty: Difficulty) -> Self::Problem {
        let max_den = [6, 8, 10, 12, 16][usize::from(difficulty.level() - 1)];
        let (left, right) = if difficulty.level() == 1 {
            // shared denominator
            let den = self.rng.random_range(2..=max_den);
            (self.proper(den), self.proper(den))
        } else {
            let a = self.rng.random_range(2..=max_den);
            let b = self.rng.random_range(2..=max_den);
            (self.proper(a), self.proper(b))
        };
        FractionProblem {
            left,
            right,
            difficulty,
        }
    }

    fn difficulty_of(&self, problem: &Self::Problem) -> Difficulty {
        problem.difficulty
    }

    fn slot_kinds(&self, _problem: &Self::Problem, step: Step) -> Vec<SlotKind> {
        match step {
            Step::Blanks => vec![SlotKind::Integer, SlotKind::Integer],
            Step::FollowUp => Vec::new(),
        }
    }

    fn solution(&self, problem: &Self::Problem, step: Step) -> AnswerSet {
        match step {
            Step::Blanks => {
                let answer = problem.answer();
                AnswerSet::new([answer.numerator.to_string(), answer.denominator.to_string()])
            }
            Step::FollowUp => AnswerSet::default(),
        }
    }

    fn grade(&self, problem: &Self::Problem, step: Step, answers: &AnswerSet) -> Grade {
        if step == Step::FollowUp {
            return Grade::from_slots(Vec::new());
        }
        let answer = problem.answer();
        Grade::from_slots(vec![
            answers.get(0).and_then(parse_integer) == Some(answer.numerator),
            answers.get(1).and_then(parse_integer) == Some(answer.denominator),
        ])
    }

    fn prompt(&self, problem: &Self::Problem, _step: Step) -> String {
        format!("{} + {} = {BLANK}/{BLANK}", problem.left, problem.right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::source::check_problem;

    fn problem(left: (i64, i64), right: (i64, i64)) -> FractionProblem {
        FractionProblem {
            left: Fraction::new(left.0, left.1),
            right: Fraction::new(right.0, right.1),
            difficulty: Difficulty::MIN,
        }
    }

    #[test]
    fn reduces_to_lowest_terms() {
        assert_eq!(Fraction::new(6, 8).reduced(), Fraction::new(3, 4));
        assert_eq!(Fraction::new(0, 5).reduced(), Fraction::new(0, 1));
        assert_eq!(Fraction::new(1, -2), Fraction::new(-1, 2));
        assert!(!Fraction::new(2, 4).is_lowest_terms());
        assert_eq!(
            Fraction::new(1, 4).plus(Fraction::new(1, 4)),
            Fraction::new(1, 2)
        );
        assert_eq!(
            Fraction::new(1, 2).plus(Fraction::new(1, 2)),
            Fraction::new(1, 1)
        );
    }

    #[test]
    fn unsimplified_answer_is_incorrect() {
        let source = FractionSource::with_seed(3);
        let quarter_pair = problem((1, 4), (1, 4));

        let exact = source.grade(&quarter_pair, Step::Blanks, &AnswerSet::new(["1", "2"]));
        assert!(exact.correct);

        let unsimplified = source.grade(&quarter_pair, Step::Blanks, &AnswerSet::new(["2", "4"]));
        assert!(!unsimplified.correct);
        assert_eq!(unsimplified.per_slot, vec![false, false]);

        let half_right = source.grade(&quarter_pair, Step::Blanks, &AnswerSet::new(["1", "4"]));
        assert_eq!(half_right.per_slot, vec![true, false]);
    }

    #[test]
    fn generated_problems_are_well_formed() {
        let mut source = FractionSource::with_seed(11);
        for level in 1..=5 {
            let difficulty = Difficulty::new(level).unwrap();
            for _ in 0..50 {
                let problem = source.generate(difficulty);
                assert!(check_problem(&source, &problem, difficulty).is_ok());
                assert!(problem.answer().is_lowest_terms());
                if level == 1 {
                    assert_eq!(problem.left.denominator, problem.right.denominator);
                }
            }
        }
    }
}
