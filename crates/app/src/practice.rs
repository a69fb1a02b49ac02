//! Interactive terminal loop over a `SessionController`.
//!
//! Input lines and timer deadlines race in one `select!`; the controller
//! rejects anything that arrives in the wrong phase, so the loop never has
//! to guess which one won.

use std::error::Error;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use drill_core::adaptive::Escalation;
use drill_core::model::{AnswerSet, ProblemRecord, SessionSettings, SessionSummary, Step};
use drill_core::source::ProblemSource;
use services::{
    Advance, Phase, Resolution, SessionController, SessionError, SessionLoopService,
    SessionSummaryListItem, SubmitResult, TimerFired, Topic,
};
use tokio::io::{AsyncBufReadExt, BufReader};

enum Flow {
    Stay,
    Quit,
}

/// Run one session to completion (or until the user quits / stdin closes).
///
/// # Errors
///
/// Returns an error if the session cannot start, stdin fails, or the summary
/// cannot be persisted.
pub async fn run<S: ProblemSource>(
    session_loop: &SessionLoopService,
    source: S,
    settings: SessionSettings,
) -> Result<(), Box<dyn Error>> {
    let mut session = session_loop.start_session_with(source, settings)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "{} practice: {} problems, starting at level {}.",
        session.topic(),
        session.target_problem_count(),
        session.difficulty()
    );
    println!("Type answers separated by spaces. Commands: :reveal  :review  :hold  :quit");
    render_live(&session);

    while !session.is_complete() {
        let armed = session.next_deadline();
        let wait = armed.map_or(StdDuration::ZERO, |armed| {
            until(session.clock().now(), armed.deadline)
        });

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match handle_line(session_loop, &mut session, line.trim()).await {
                    Ok(Flow::Stay) => {}
                    Ok(Flow::Quit) => break,
                    Err(err @ SessionError::Storage(_)) => return Err(err.into()),
                    Err(err) => println!("  ! {err}"),
                }
            }
            () = tokio::time::sleep(wait), if armed.is_some() => {
                if let Some(armed) = armed {
                    match session.fire_timer(armed.token) {
                        Ok(fired) => on_timer(&session, fired),
                        Err(err) => println!("  ! {err}"),
                    }
                }
            }
        }
    }

    session.teardown();
    if !session.is_complete() {
        println!("Session ended early; nothing was saved.");
        return Ok(());
    }
    session_loop.finalize_summary(&mut session).await?;
    print_summary(&session.summary()?);
    Ok(())
}

fn until(now: DateTime<Utc>, deadline: DateTime<Utc>) -> StdDuration {
    (deadline - now).to_std().unwrap_or(StdDuration::ZERO)
}

async fn handle_line<S: ProblemSource>(
    session_loop: &SessionLoopService,
    session: &mut SessionController<S>,
    line: &str,
) -> Result<Flow, SessionError> {
    if line == ":quit" || line == ":q" {
        return Ok(Flow::Quit);
    }
    if session.is_reviewing() {
        review_command(session, line);
        return Ok(Flow::Stay);
    }
    if line == ":review" {
        session.enter_review()?;
        print_record(session);
        println!("  (n)ext, (p)rev, a number to jump, empty line to return");
        return Ok(Flow::Stay);
    }

    match session.phase() {
        Phase::Active(_) => answer_command(session, line)?,
        Phase::ShowingOutcome => match line {
            "" => {
                let step = session_loop.continue_session(session).await?;
                if let Advance::Next { .. } = step.advance {
                    render_live(session);
                }
            }
            ":hold" => {
                if session.is_auto_continue_held() {
                    session.release_auto_continue();
                    println!("  resumed");
                } else {
                    session.hold_auto_continue();
                    println!("  paused; :hold again to resume");
                }
            }
            _ => println!("  press Enter to continue"),
        },
        Phase::Complete => {}
    }
    Ok(Flow::Stay)
}

fn answer_command<S: ProblemSource>(
    session: &mut SessionController<S>,
    line: &str,
) -> Result<(), SessionError> {
    if line == ":reveal" || line == "?" {
        let resolution = session.reveal_answer()?;
        render_resolution(session, &resolution);
        return Ok(());
    }
    let Some(ticket) = session.ticket() else {
        return Ok(());
    };
    let answers: AnswerSet = line
        .split(|c: char| c.is_whitespace() || c == '/')
        .filter(|part| !part.is_empty())
        .collect();

    match session.submit_with_ticket(ticket, answers)? {
        SubmitResult::Invalid(input) => {
            for issue in input.issues() {
                println!("  blank {}: {}", issue.slot + 1, issue.issue);
            }
        }
        SubmitResult::Retry {
            per_slot,
            attempts_left,
            ..
        } => {
            let left = attempts_left.map_or_else(|| "unlimited".to_string(), |n| n.to_string());
            println!("  {}  not quite, attempts left: {left}", marks(&per_slot));
        }
        SubmitResult::NextStep { per_slot } => {
            println!("  {}  now finish it:", marks(&per_slot));
            render_live(session);
        }
        SubmitResult::Resolved(resolution) => render_resolution(session, &resolution),
    }
    Ok(())
}

fn review_command<S: ProblemSource>(session: &mut SessionController<S>, line: &str) {
    let moved = match line {
        "" | ":review" => {
            session.exit_review();
            match session.phase() {
                Phase::Active(_) => render_live(session),
                _ => println!("  press Enter to continue"),
            }
            return;
        }
        "n" => session.review_next().is_some(),
        "p" => session.review_prev().is_some(),
        other => match other.parse::<usize>() {
            Ok(n) if n > 0 => session.review_jump(n - 1).is_some(),
            _ => false,
        },
    };
    if moved {
        print_record(session);
    }
}

fn on_timer<S: ProblemSource>(session: &SessionController<S>, fired: TimerFired) {
    match fired {
        TimerFired::Stale | TimerFired::Advanced(Advance::Complete) => {}
        TimerFired::TimedOut(resolution) => {
            println!("  time is up");
            render_resolution(session, &resolution);
        }
        TimerFired::Advanced(Advance::Next { .. }) => render_live(session),
    }
}

//
// ─── RENDERING ─────────────────────────────────────────────────────────────────
//

fn marks(per_slot: &[bool]) -> String {
    per_slot
        .iter()
        .map(|ok| if *ok { "✓" } else { "✗" })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_live<S: ProblemSource>(session: &SessionController<S>) {
    let Some(prompt) = session.prompt() else {
        return;
    };
    let progress = session.progress();
    let mut header = format!(
        "[{}/{} · level {} · streak {}",
        progress.answered + 1,
        progress.total,
        progress.difficulty,
        progress.streak
    );
    if let Some(left) = session.time_remaining() {
        header.push_str(&format!(" · {}s", left.num_seconds()));
    }
    header.push(']');
    println!();
    println!("{header}");
    println!("  {prompt}");
}

fn render_resolution<S: ProblemSource>(session: &SessionController<S>, resolution: &Resolution) {
    if resolution.overall_correct {
        println!("  {}  correct!", marks(&resolution.per_slot));
    } else if resolution.was_revealed {
        println!("  answer: {}", resolution.solution);
    } else {
        println!("  answer was: {}", resolution.solution);
    }
    if let Some(Escalation::Raised { to, .. }) = resolution.escalation {
        println!("  level up! now at level {to}");
    }
    if session.settings().auto_continue() && !session.is_auto_continue_held() {
        println!("  continuing shortly (:hold to pause)");
    } else {
        println!("  press Enter to continue");
    }
}

fn print_record<S: ProblemSource>(session: &SessionController<S>) {
    let (Some(position), Some(record)) = (session.review_position(), session.reviewed_record())
    else {
        return;
    };
    let prompt = session.source().prompt(record.problem(), Step::Blanks);
    println!();
    println!("(review {}/{}) {prompt}", position.index() + 1, position.len());
    print_steps(record);
}

fn print_steps<P>(record: &ProblemRecord<P>) {
    for step in record.steps() {
        println!(
            "  {}: you said {} · answer {} · {:?} after {} attempt(s)",
            step.step, step.answers, step.solution, step.outcome, step.attempts
        );
    }
    if record.timed_out() {
        println!("  ran out of time");
    }
    println!(
        "  {:.1}s at level {}",
        record.time_spent_seconds(),
        record.difficulty()
    );
}

fn print_summary(summary: &SessionSummary) {
    let span = summary.difficulty();
    println!();
    println!("Session complete");
    println!(
        "  {} correct, {} incorrect, {} revealed of {} ({:.0}%)",
        summary.correct(),
        summary.incorrect(),
        summary.revealed(),
        summary.total_problems(),
        summary.accuracy() * 100.0
    );
    if summary.timed_out() > 0 {
        println!("  {} ran out of time", summary.timed_out());
    }
    println!(
        "  level {} → {}, best streak {}",
        span.start, span.end, span.best_streak
    );
    #[allow(clippy::cast_precision_loss)]
    let seconds = summary.time_spent_ms() as f64 / 1000.0;
    println!("  {seconds:.1}s answering");
}

pub fn print_history(topic: Topic, items: &[SessionSummaryListItem]) {
    if items.is_empty() {
        println!("No {} sessions yet.", topic.title());
        return;
    }
    println!("Recent {} sessions:", topic.title());
    for item in items {
        println!(
            "  {}  {}/{} correct  level {} → {}  best streak {}",
            item.completed_at.format("%Y-%m-%d %H:%M"),
            item.correct,
            item.total,
            item.start_difficulty,
            item.end_difficulty,
            item.best_streak
        );
    }
}
