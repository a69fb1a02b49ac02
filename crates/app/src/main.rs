use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use drill_core::model::{SessionSettings, SessionSettingsDraft, TopicId};
use services::topics::{ArithmeticSource, DistributiveSource, FractionSource};
use services::{Clock, SessionLoopService, SessionSummaryService, SettingsService, Topic};
use storage::repository::Storage;
use tracing_subscriber::EnvFilter;

mod practice;

const HISTORY_LIMIT: u32 = 10;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    UnknownTopic { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::UnknownTopic { raw } => write!(
                f,
                "unknown topic: {raw} (expected one of: {})",
                Topic::ALL.map(Topic::as_str).join(", ")
            ),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn require_number<T: FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let raw = require_value(args, flag)?;
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn parse_topic(raw: &str) -> Result<Topic, ArgsError> {
    raw.parse().map_err(|_| ArgsError::UnknownTopic {
        raw: raw.to_string(),
    })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [--topic <name>] [--db <sqlite_url>] [options]");
    eprintln!("  cargo run -p app -- --history [--topic <name>]");
    eprintln!();
    eprintln!("Topics: {}", Topic::ALL.map(Topic::as_str).join(", "));
    eprintln!();
    eprintln!("Session options (this run only):");
    eprintln!("  --count <n>         problems per session");
    eprintln!("  --difficulty <1-5>  starting level");
    eprintln!("  --attempts <n>      attempts per step, 0 = unlimited");
    eprintln!("  --time-limit <s>    seconds per problem, 0 = none");
    eprintln!("  --adaptive | --no-adaptive");
    eprintln!("  --compensate        add a problem after each miss");
    eprintln!("  --auto-continue     advance automatically after each outcome");
    eprintln!();
    eprintln!("  --settings <file>   save JSON settings for the topic, then practice");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:drill.sqlite3");
    eprintln!("  --topic arithmetic");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  DRILL_DB_URL, DRILL_TOPIC, RUST_LOG");
}

/// One-off adjustments layered over the stored settings.
#[derive(Debug, Default)]
struct Overrides {
    problem_count: Option<u32>,
    difficulty: Option<u8>,
    max_attempts: Option<u32>,
    time_limit_secs: Option<u32>,
    adaptive: Option<bool>,
    compensation: Option<bool>,
    auto_continue: Option<bool>,
}

impl Overrides {
    fn is_empty(&self) -> bool {
        self.problem_count.is_none()
            && self.difficulty.is_none()
            && self.max_attempts.is_none()
            && self.time_limit_secs.is_none()
            && self.adaptive.is_none()
            && self.compensation.is_none()
            && self.auto_continue.is_none()
    }

    fn apply(&self, draft: &mut SessionSettingsDraft) {
        if let Some(count) = self.problem_count {
            draft.problem_count = count;
        }
        if let Some(level) = self.difficulty {
            draft.difficulty = level;
        }
        if let Some(attempts) = self.max_attempts {
            draft.max_attempts = attempts;
        }
        if let Some(secs) = self.time_limit_secs {
            draft.time_limit_secs = secs;
        }
        if let Some(adaptive) = self.adaptive {
            draft.adaptive_difficulty = adaptive;
        }
        if let Some(compensation) = self.compensation {
            draft.compensation = compensation;
        }
        if let Some(auto_continue) = self.auto_continue {
            draft.auto_continue = auto_continue;
        }
    }
}

struct Args {
    db_url: String,
    topic: Topic,
    settings_file: Option<PathBuf>,
    overrides: Overrides,
    history: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = normalize_sqlite_url(
            std::env::var("DRILL_DB_URL").unwrap_or_else(|_| "sqlite:drill.sqlite3".into()),
        );
        let mut topic = match std::env::var("DRILL_TOPIC") {
            Ok(raw) => parse_topic(&raw)?,
            Err(_) => Topic::Arithmetic,
        };
        let mut settings_file = None;
        let mut overrides = Overrides::default();
        let mut history = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--topic" => topic = parse_topic(&require_value(args, "--topic")?)?,
                "--count" => overrides.problem_count = Some(require_number(args, "--count")?),
                "--difficulty" => {
                    overrides.difficulty = Some(require_number(args, "--difficulty")?);
                }
                "--attempts" => overrides.max_attempts = Some(require_number(args, "--attempts")?),
                "--time-limit" => {
                    overrides.time_limit_secs = Some(require_number(args, "--time-limit")?);
                }
                "--adaptive" => overrides.adaptive = Some(true),
                "--no-adaptive" => overrides.adaptive = Some(false),
                "--compensate" => overrides.compensation = Some(true),
                "--auto-continue" => overrides.auto_continue = Some(true),
                "--settings" => {
                    settings_file = Some(PathBuf::from(require_value(args, "--settings")?));
                }
                "--history" => history = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            topic,
            settings_file,
            overrides,
            history,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_tracing() {
    // Quiet by default so log lines do not interleave with the prompt.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_tracing();

    // Open + migrate SQLite here so the library crates stay free of process setup.
    prepare_sqlite_file(&args.db_url)?;
    let storage = Storage::sqlite(&args.db_url).await?;
    let clock = Clock::default_clock();
    let topic_id = args.topic.topic_id();

    if args.history {
        let view = SessionSummaryService::new(Arc::clone(&storage.summaries));
        let items = view.list_recent_summaries(&topic_id, HISTORY_LIMIT).await?;
        practice::print_history(args.topic, &items);
        return Ok(());
    }

    if let Some(path) = &args.settings_file {
        let settings_svc = SettingsService::new(Arc::clone(&storage.settings))
            .with_on_settings_changed(Arc::new(|topic: &TopicId, settings: &SessionSettings| {
                println!(
                    "Saved settings for {topic}: {} problems, level {}.",
                    settings.problem_count(),
                    settings.difficulty()
                );
            }));
        let raw = std::fs::read_to_string(path)?;
        let draft = SettingsService::parse_json(&raw)?;
        settings_svc.save(&topic_id, draft).await?;
    }

    let session_loop = SessionLoopService::new(
        clock,
        Arc::clone(&storage.settings),
        Arc::clone(&storage.summaries),
    );
    let mut settings = session_loop.load_settings(&topic_id).await?;
    if !args.overrides.is_empty() {
        let mut draft = settings.to_draft();
        args.overrides.apply(&mut draft);
        settings = draft.validate()?;
    }

    match args.topic {
        Topic::Arithmetic => {
            practice::run(&session_loop, ArithmeticSource::new(), settings).await
        }
        Topic::Fractions => practice::run(&session_loop, FractionSource::new(), settings).await,
        Topic::Distributive => {
            practice::run(&session_loop, DistributiveSource::new(), settings).await
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
