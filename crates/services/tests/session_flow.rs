use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use chrono::Duration;
use drill_core::adaptive::{Escalation, STREAK_THRESHOLD};
use drill_core::model::{
    AnswerSet, Difficulty, SessionSettings, SessionSettingsDraft, SlotIssue, SlotKind, Step,
    StepOutcome, TopicId, parse_integer,
};
use drill_core::source::{Grade, ProblemSource};
use drill_core::time::fixed_clock;
use services::session::SessionLedger;
use services::{
    Advance, Phase, ProgressTally, SessionController, SessionError, SubmitResult, TimerFired,
};

/// Problem `n` asks for `n` in every blank, and for `n * 10` in the follow-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Numbered {
    value: i64,
    difficulty: Difficulty,
}

#[derive(Default)]
struct Scripted {
    next: i64,
    blanks: usize,
    follow_up: bool,
    short_solution: bool,
    short_grade: bool,
    generated: Rc<Cell<usize>>,
}

impl Scripted {
    fn blanks(blanks: usize) -> Self {
        Self {
            next: 1,
            blanks,
            ..Self::default()
        }
    }
}

impl ProblemSource for Scripted {
    type Problem = Numbered;

    fn topic(&self) -> TopicId {
        TopicId::new("scripted").unwrap()
    }

    fn generate(&mut self, difficulty: Difficulty) -> Numbered {
        self.generated.set(self.generated.get() + 1);
        let value = self.next;
        self.next += 1;
        Numbered { value, difficulty }
    }

    fn difficulty_of(&self, problem: &Numbered) -> Difficulty {
        problem.difficulty
    }

    fn slot_kinds(&self, _problem: &Numbered, step: Step) -> Vec<SlotKind> {
        match step {
            Step::Blanks => vec![SlotKind::Integer; self.blanks],
            Step::FollowUp => vec![SlotKind::Integer],
        }
    }

    fn solution(&self, problem: &Numbered, step: Step) -> AnswerSet {
        match step {
            Step::Blanks => {
                let len = if self.short_solution {
                    self.blanks - 1
                } else {
                    self.blanks
                };
                AnswerSet::new(vec![problem.value.to_string(); len])
            }
            Step::FollowUp => AnswerSet::new([(problem.value * 10).to_string()]),
        }
    }

    fn grade(&self, problem: &Numbered, step: Step, answers: &AnswerSet) -> Grade {
        let expected = match step {
            Step::Blanks => problem.value,
            Step::FollowUp => problem.value * 10,
        };
        let mut per_slot: Vec<bool> = answers
            .values()
            .iter()
            .map(|raw| parse_integer(raw) == Some(expected))
            .collect();
        if self.short_grade {
            per_slot.pop();
        }
        Grade::from_slots(per_slot)
    }

    fn requires_second_step(&self, _problem: &Numbered) -> bool {
        self.follow_up
    }

    fn prompt(&self, problem: &Numbered, _step: Step) -> String {
        format!("#{}", problem.value)
    }
}

fn settings(edit: impl FnOnce(&mut SessionSettingsDraft)) -> SessionSettings {
    let mut draft = SessionSettingsDraft::new();
    edit(&mut draft);
    draft.validate().unwrap()
}

fn start(source: Scripted, settings: SessionSettings) -> SessionController<Scripted> {
    SessionController::new(source, settings, fixed_clock()).unwrap()
}

fn right(controller: &SessionController<Scripted>) -> AnswerSet {
    let problem = controller.current_problem().unwrap();
    let step = controller.current_step().unwrap();
    controller.source().solution(problem, step)
}

fn wrong(controller: &SessionController<Scripted>) -> AnswerSet {
    AnswerSet::new(vec!["-1"; controller.slot_kinds().len()])
}

fn answer_correctly(controller: &mut SessionController<Scripted>) -> SubmitResult {
    let answers = right(controller);
    controller.submit_answer(answers).unwrap()
}

fn assert_ledger_matches(ledger: &SessionLedger<Numbered>, snapshot: &[Numbered]) {
    let current: Vec<_> = ledger.iter().map(|record| *record.problem()).collect();
    assert_eq!(&current[..snapshot.len()], snapshot);
}

#[test]
fn single_attempt_failure_resolves_immediately() {
    let mut controller = start(
        Scripted::blanks(1),
        settings(|d| d.max_attempts = 1),
    );
    for _ in 0..3 {
        answer_correctly(&mut controller);
        controller.continue_session().unwrap();
    }
    assert_eq!(controller.streak(), 3);

    let answers = wrong(&controller);
    let result = controller.submit_answer(answers).unwrap();
    let SubmitResult::Resolved(resolution) = result else {
        panic!("expected immediate resolution, got {result:?}");
    };

    assert_eq!(resolution.outcome, StepOutcome::IncorrectExhausted);
    assert_eq!(resolution.solution, AnswerSet::new(["4"]));
    assert_eq!(controller.streak(), 0);
    assert_eq!(controller.ledger().len(), 4);
    let record = controller.ledger().last().unwrap();
    assert_eq!(record.attempts_used(), vec![1]);
    assert!(!record.was_revealed());
    assert!(!record.overall_correct());
    assert_eq!(record.steps()[0].answers, AnswerSet::new(["-1"]));
}

#[test]
fn correct_on_third_attempt_counts_all_attempts() {
    let mut controller = start(
        Scripted::blanks(1),
        settings(|d| d.max_attempts = 3),
    );

    for used in 1..=2 {
        let answers = wrong(&controller);
        let result = controller.submit_answer(answers).unwrap();
        assert_eq!(
            result,
            SubmitResult::Retry {
                per_slot: vec![false],
                attempts_used: used,
                attempts_left: Some(3 - used),
            }
        );
        assert!(controller.ledger().is_empty());
    }

    let result = answer_correctly(&mut controller);
    let SubmitResult::Resolved(resolution) = result else {
        panic!("expected resolution, got {result:?}");
    };
    assert_eq!(resolution.outcome, StepOutcome::Correct);
    assert_eq!(controller.ledger().at(0).unwrap().attempts_used(), vec![3]);
    assert_eq!(controller.streak(), 1);
}

#[test]
fn streak_counts_with_adaptation_disabled() {
    let mut controller = start(
        Scripted::blanks(1),
        settings(|d| {
            d.max_attempts = 3;
            d.adaptive_difficulty = false;
        }),
    );
    for _ in 0..2 {
        let answers = wrong(&controller);
        controller.submit_answer(answers).unwrap();
    }
    let result = answer_correctly(&mut controller);
    assert!(matches!(result, SubmitResult::Resolved(_)));
    assert_eq!(controller.ledger().at(0).unwrap().attempts_used(), vec![3]);
    assert_eq!(controller.streak(), 1);
    assert_eq!(controller.progress().streak, 1);

    controller.continue_session().unwrap();
    answer_correctly(&mut controller);
    assert_eq!(controller.streak(), 2);
    assert_eq!(controller.progress().streak, 2);
    assert_eq!(controller.best_streak(), 2);
    assert_eq!(controller.difficulty(), Difficulty::MIN);
}

#[test]
fn partially_correct_blanks_report_per_slot_feedback() {
    let mut controller = start(Scripted::blanks(2), settings(|d| d.max_attempts = 2));

    let result = controller
        .submit_answer(AnswerSet::new(["1", "7"]))
        .unwrap();
    assert_eq!(
        result,
        SubmitResult::Retry {
            per_slot: vec![true, false],
            attempts_used: 1,
            attempts_left: Some(1),
        }
    );
    assert_eq!(controller.draft(), &AnswerSet::new(["1", "7"]));
}

#[test]
fn session_completes_at_target_and_stays_complete() {
    let mut controller = start(Scripted::blanks(1), settings(|d| d.problem_count = 5));

    for n in 1..=5 {
        if n % 2 == 0 {
            controller.reveal_answer().unwrap();
        } else {
            answer_correctly(&mut controller);
        }
        let advance = controller.continue_session().unwrap();
        if n < 5 {
            assert_eq!(advance, Advance::Next { sequence: n + 1 });
        } else {
            assert_eq!(advance, Advance::Complete);
        }
    }

    assert_eq!(controller.phase(), Phase::Complete);
    assert_eq!(controller.target_problem_count(), 5);
    assert_eq!(controller.continue_session().unwrap(), Advance::Complete);
    assert_eq!(controller.continue_session().unwrap(), Advance::Complete);
    assert_eq!(controller.sequence(), 5);
    assert_eq!(controller.ledger().len(), 5);
    assert!(matches!(
        controller.submit_answer(AnswerSet::new(["1"])),
        Err(SessionError::InvalidState { .. })
    ));

    let summary = controller.summary().unwrap();
    assert_eq!(summary.total_problems(), 5);
    assert_eq!(summary.correct(), 3);
    assert_eq!(summary.revealed(), 2);
    assert_eq!(summary.difficulty().best_streak, 1);
}

#[test]
fn review_during_auto_continue_advances_exactly_once() {
    let mut controller = start(
        Scripted::blanks(1),
        settings(|d| {
            d.auto_continue = true;
            d.auto_continue_delay_ms = 1_500;
        }),
    );
    answer_correctly(&mut controller);
    let original = controller.next_deadline().unwrap();

    controller.clock_mut().advance(Duration::milliseconds(500));
    let reviewed = *controller.enter_review().unwrap().problem();
    assert_eq!(reviewed.value, 1);
    assert!(controller.next_deadline().is_none());

    // the suspended timer does not fire while reviewing
    controller.clock_mut().advance(Duration::milliseconds(300));
    assert_eq!(controller.fire_timer(original.token).unwrap(), TimerFired::Stale);
    assert!(controller.poll_timers().unwrap().is_none());

    controller.exit_review();
    let resumed = controller.next_deadline().unwrap();
    assert_eq!(resumed.deadline, controller.clock().now() + Duration::seconds(1));
    assert_eq!(controller.fire_timer(original.token).unwrap(), TimerFired::Stale);

    controller.clock_mut().advance(Duration::milliseconds(999));
    assert!(controller.poll_timers().unwrap().is_none());
    controller.clock_mut().advance(Duration::milliseconds(1));
    assert_eq!(
        controller.poll_timers().unwrap(),
        Some(TimerFired::Advanced(Advance::Next { sequence: 2 }))
    );
    assert!(controller.poll_timers().unwrap().is_none());
    assert_eq!(controller.fire_timer(resumed.token).unwrap(), TimerFired::Stale);

    assert_eq!(controller.sequence(), 2);
    assert_eq!(controller.ledger().len(), 1);
    assert_eq!(controller.phase(), Phase::Active(Step::Blanks));
}

#[test]
fn manual_continue_cancels_auto_continue() {
    let mut controller = start(
        Scripted::blanks(1),
        settings(|d| d.auto_continue = true),
    );
    answer_correctly(&mut controller);
    let token = controller.next_deadline().unwrap().token;

    controller.continue_session().unwrap();
    controller.clock_mut().advance(Duration::seconds(10));
    assert_eq!(controller.fire_timer(token).unwrap(), TimerFired::Stale);
    assert_eq!(controller.sequence(), 2);
}

#[test]
fn review_keeps_live_input_and_blocks_answers() {
    let mut controller = start(Scripted::blanks(2), settings(|d| d.time_limit_secs = 30));
    answer_correctly(&mut controller);
    controller.continue_session().unwrap();
    answer_correctly(&mut controller);
    controller.continue_session().unwrap();

    controller.set_draft(0, "3").unwrap();
    controller.clock_mut().advance(Duration::seconds(10));
    controller.enter_review().unwrap();

    assert!(matches!(
        controller.submit_answer(AnswerSet::new(["3", "3"])),
        Err(SessionError::Reviewing { .. })
    ));
    assert!(matches!(
        controller.reveal_answer(),
        Err(SessionError::Reviewing { .. })
    ));
    assert_eq!(controller.review_prev().unwrap().problem().value, 1);
    assert_eq!(controller.review_prev().unwrap().problem().value, 1);
    assert_eq!(controller.review_next().unwrap().problem().value, 2);
    assert_eq!(controller.review_next().unwrap().problem().value, 2);

    // a long review does not eat into the time limit
    controller.clock_mut().advance(Duration::minutes(5));
    controller.exit_review();
    assert_eq!(controller.time_remaining(), Some(Duration::seconds(20)));
    assert_eq!(controller.draft(), &AnswerSet::new(["3", ""]));
    assert_eq!(controller.phase(), Phase::Active(Step::Blanks));

    controller.set_draft(1, "3").unwrap();
    let result = controller.submit_draft().unwrap();
    assert!(matches!(result, SubmitResult::Resolved(_)));
}

#[test]
fn review_needs_history() {
    let mut controller = start(Scripted::blanks(1), SessionSettings::default());
    assert!(matches!(
        controller.enter_review(),
        Err(SessionError::NothingToReview)
    ));
    assert!(controller.review_next().is_none());
}

#[test]
fn ten_correct_in_a_row_raise_difficulty_once() {
    let mut controller = start(Scripted::blanks(1), settings(|d| d.problem_count = 30));
    assert_eq!(STREAK_THRESHOLD, 10);

    for n in 1..=10 {
        let result = answer_correctly(&mut controller);
        let SubmitResult::Resolved(resolution) = result else {
            panic!("expected resolution");
        };
        if n < 10 {
            assert_eq!(resolution.escalation, Some(Escalation::Held));
            assert_eq!(controller.streak(), n);
        } else {
            assert_eq!(
                resolution.escalation,
                Some(Escalation::Raised {
                    from: Difficulty::MIN,
                    to: Difficulty::new(2).unwrap(),
                })
            );
        }
        controller.continue_session().unwrap();
    }

    assert_eq!(controller.difficulty().level(), 2);
    assert_eq!(controller.streak(), 0);
    assert_eq!(controller.current_problem().unwrap().difficulty.level(), 2);
    assert_eq!(controller.ledger().at(9).unwrap().difficulty(), Difficulty::MIN);
}

#[test]
fn failures_reset_streak_and_compensate() {
    let mut controller = start(
        Scripted::blanks(1),
        settings(|d| {
            d.problem_count = 2;
            d.max_attempts = 1;
            d.compensation = true;
        }),
    );
    for _ in 0..3 {
        answer_correctly(&mut controller);
        if controller.continue_session().unwrap() == Advance::Complete {
            break;
        }
    }
    // correct answers never move the target
    assert!(controller.is_complete());
    assert_eq!(controller.target_problem_count(), 2);
    assert_eq!(controller.best_streak(), 2);

    let mut controller = start(
        Scripted::blanks(1),
        settings(|d| {
            d.problem_count = 2;
            d.max_attempts = 1;
            d.compensation = true;
        }),
    );
    answer_correctly(&mut controller);
    controller.continue_session().unwrap();
    assert_eq!(controller.streak(), 1);

    let mut snapshot = vec![*controller.ledger().at(0).unwrap().problem()];
    for failures in 1..=6_u32 {
        if failures % 2 == 0 {
            controller.reveal_answer().unwrap();
        } else {
            let answers = wrong(&controller);
            controller.submit_answer(answers).unwrap();
        }
        snapshot.push(*controller.ledger().last().unwrap().problem());
        assert_eq!(controller.streak(), 0);
        assert_eq!(controller.target_problem_count(), 2 + failures);
        assert_ledger_matches(controller.ledger(), &snapshot);
        assert_eq!(
            controller.continue_session().unwrap(),
            Advance::Next {
                sequence: u64::from(failures) + 2
            }
        );
    }

    answer_correctly(&mut controller);
    assert_eq!(controller.continue_session().unwrap(), Advance::Complete);
    assert_eq!(controller.ledger().len(), 8);
}

#[test]
fn without_compensation_target_is_constant() {
    let mut controller = start(
        Scripted::blanks(1),
        settings(|d| {
            d.problem_count = 3;
            d.max_attempts = 1;
        }),
    );
    for _ in 0..3 {
        let answers = wrong(&controller);
        controller.submit_answer(answers).unwrap();
        assert_eq!(controller.target_problem_count(), 3);
        controller.continue_session().unwrap();
    }
    assert!(controller.is_complete());
    assert_eq!(controller.summary().unwrap().incorrect(), 3);
}

#[test]
fn adaptation_disabled_keeps_starting_level() {
    let mut controller = start(
        Scripted::blanks(1),
        settings(|d| {
            d.problem_count = 12;
            d.difficulty = 3;
            d.adaptive_difficulty = false;
        }),
    );
    for _ in 0..11 {
        let result = answer_correctly(&mut controller);
        let SubmitResult::Resolved(resolution) = result else {
            panic!("expected resolution");
        };
        assert_eq!(resolution.escalation, None);
        controller.continue_session().unwrap();
    }
    assert_eq!(controller.difficulty().level(), 3);
    assert_eq!(controller.best_streak(), 11);
}

#[test]
fn unlimited_attempts_never_exhaust() {
    let mut controller = start(Scripted::blanks(1), settings(|d| d.max_attempts = 0));
    for used in 1..=25 {
        let answers = wrong(&controller);
        let result = controller.submit_answer(answers).unwrap();
        assert_eq!(
            result,
            SubmitResult::Retry {
                per_slot: vec![false],
                attempts_used: used,
                attempts_left: None,
            }
        );
    }
    let resolution = controller.reveal_answer().unwrap();
    assert!(resolution.was_revealed);
    assert_eq!(controller.ledger().at(0).unwrap().attempts_used(), vec![25]);
}

#[test]
fn empty_and_non_numeric_slots_are_rejected_without_an_attempt() {
    let mut controller = start(Scripted::blanks(2), settings(|d| d.max_attempts = 1));
    let result = controller
        .submit_answer(AnswerSet::new(["", "abc"]))
        .unwrap();
    let SubmitResult::Invalid(input) = result else {
        panic!("expected validation failure, got {result:?}");
    };
    assert_eq!(input.issue_for(0), Some(SlotIssue::Empty));
    assert_eq!(input.issue_for(1), Some(SlotIssue::NotANumber));
    assert_eq!(controller.attempts_used(), 0);
    assert!(controller.ledger().is_empty());
}

#[test]
fn two_step_problem_records_both_steps() {
    let source = Scripted {
        follow_up: true,
        ..Scripted::blanks(2)
    };
    let mut controller = start(source, settings(|d| d.max_attempts = 2));

    let result = answer_correctly(&mut controller);
    assert_eq!(
        result,
        SubmitResult::NextStep {
            per_slot: vec![true, true]
        }
    );
    assert!(matches!(
        controller.reveal_answer(),
        Err(SessionError::RevealUnavailable)
    ));

    let answers = wrong(&controller);
    controller.submit_answer(answers).unwrap();
    let answers = wrong(&controller);
    let result = controller.submit_answer(answers).unwrap();
    let SubmitResult::Resolved(resolution) = result else {
        panic!("expected resolution");
    };
    assert_eq!(resolution.outcome, StepOutcome::IncorrectExhausted);
    assert_eq!(resolution.solution, AnswerSet::new(["10"]));

    let record = controller.ledger().at(0).unwrap();
    assert_eq!(record.steps().len(), 2);
    assert_eq!(record.step(Step::Blanks).unwrap().outcome, StepOutcome::Correct);
    assert_eq!(record.attempts_used(), vec![1, 2]);
    assert!(!record.overall_correct());
    assert_eq!(controller.streak(), 0);
}

#[test]
fn time_limit_spans_both_steps_and_expires_on_follow_up() {
    let source = Scripted {
        follow_up: true,
        ..Scripted::blanks(1)
    };
    let mut controller = start(
        source,
        settings(|d| {
            d.problem_count = 3;
            d.max_attempts = 3;
            d.time_limit_secs = 30;
            d.compensation = true;
        }),
    );
    answer_correctly(&mut controller);
    answer_correctly(&mut controller);
    controller.continue_session().unwrap();
    assert_eq!(controller.streak(), 1);

    controller.clock_mut().advance(Duration::seconds(10));
    assert!(matches!(
        answer_correctly(&mut controller),
        SubmitResult::NextStep { .. }
    ));
    let answers = wrong(&controller);
    assert!(matches!(
        controller.submit_answer(answers).unwrap(),
        SubmitResult::Retry { .. }
    ));
    assert_eq!(controller.time_remaining(), Some(Duration::seconds(20)));

    controller.clock_mut().advance(Duration::seconds(19));
    assert!(controller.poll_timers().unwrap().is_none());
    controller.clock_mut().advance(Duration::seconds(1));
    let fired = controller.poll_timers().unwrap();
    let Some(TimerFired::TimedOut(resolution)) = fired else {
        panic!("expected the time limit to fire, got {fired:?}");
    };
    assert_eq!(resolution.outcome, StepOutcome::IncorrectExhausted);
    assert!(!resolution.overall_correct);
    assert!(resolution.timed_out);
    assert_eq!(resolution.solution, AnswerSet::new(["20"]));

    let record = controller.ledger().at(1).unwrap();
    assert_eq!(record.steps().len(), 2);
    assert_eq!(record.step(Step::Blanks).unwrap().outcome, StepOutcome::Correct);
    let follow_up = record.step(Step::FollowUp).unwrap();
    assert_eq!(follow_up.outcome, StepOutcome::IncorrectExhausted);
    assert_eq!(follow_up.answers, AnswerSet::new(["-1"]));
    assert_eq!(record.attempts_used(), vec![1, 1]);
    assert!(record.timed_out());
    assert!(!record.overall_correct());
    assert_eq!(record.time_spent(), Duration::seconds(30));

    assert_eq!(controller.streak(), 0);
    assert_eq!(controller.target_problem_count(), 4);
    assert_eq!(controller.phase(), Phase::ShowingOutcome);
}

#[test]
fn malformed_generation_is_fatal_after_retries() {
    let generated = Rc::new(Cell::new(0));
    let source = Scripted {
        short_solution: true,
        generated: Rc::clone(&generated),
        ..Scripted::blanks(2)
    };
    let err = SessionController::new(source, SessionSettings::default(), fixed_clock())
        .unwrap_err();
    assert!(matches!(err, SessionError::MalformedProblem(_)));
    assert_eq!(generated.get(), 3);
}

#[test]
fn malformed_grade_discards_problem_unrecorded() {
    let source = Scripted {
        short_grade: true,
        ..Scripted::blanks(2)
    };
    let mut controller = start(source, settings(|d| d.max_attempts = 1));
    let answers = right(&controller);

    let err = controller.submit_answer(answers).unwrap_err();
    assert!(matches!(err, SessionError::MalformedProblem(_)));
    assert!(controller.ledger().is_empty());
    assert_eq!(controller.sequence(), 2);
    assert_eq!(controller.phase(), Phase::Active(Step::Blanks));
    assert_eq!(controller.attempts_used(), 0);
}

#[test]
fn progress_events_reach_the_sink() {
    let tally = Arc::new(ProgressTally::new());
    let mut controller = start(
        Scripted::blanks(1),
        settings(|d| {
            d.problem_count = 3;
            d.max_attempts = 2;
        }),
    )
    .with_progress_sink(tally.clone());

    controller.clock_mut().advance(Duration::seconds(2));
    answer_correctly(&mut controller);
    controller.continue_session().unwrap();
    controller.reveal_answer().unwrap();
    controller.continue_session().unwrap();
    let answers = wrong(&controller);
    controller.submit_answer(answers).unwrap();
    let answers = wrong(&controller);
    controller.submit_answer(answers).unwrap();

    let topic = TopicId::new("scripted").unwrap();
    let totals = tally.tally(&topic).unwrap();
    assert_eq!(totals.problems, 3);
    assert_eq!(totals.correct, 1);
    assert_eq!(totals.revealed, 1);
    assert_eq!(totals.attempts, 1 + 2 + 2);
    assert!((totals.time_spent_seconds - 2.0).abs() < f64::EPSILON);

    let progress = controller.progress();
    assert_eq!(progress.answered, 3);
    assert_eq!(progress.remaining, 0);
    assert!(!progress.is_complete);
}
