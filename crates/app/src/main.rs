use std::path::PathBuf;

use quiz_core::model::{AttemptId, OptionId, QuestionId, QuestionSetId, UserId};
use quiz_core::scoring::ScoreCard;
use serde::Serialize;
use services::{AppServices, AttemptSession, Clock, StudentContext};
use thiserror::Error;
use tracing::debug;

mod config;
mod seed;
mod telemetry;

use config::AppConfig;

#[derive(Debug, Error, PartialEq, Eq)]
enum ArgsError {
    #[error("{flag} requires a value")]
    MissingValue { flag: &'static str },
    #[error("{command} requires {flag}")]
    MissingFlag {
        command: &'static str,
        flag: &'static str,
    },
    #[error("unknown argument: {0}")]
    UnknownArg(String),
    #[error("unknown subcommand: {0}")]
    UnknownCommand(String),
    #[error("invalid {flag} value: {raw}")]
    InvalidId { flag: &'static str, raw: String },
    #[error("invalid --answer value (expected <question>:<option>): {raw}")]
    InvalidAnswer { raw: String },
    #[error("invalid --db value: {raw}")]
    InvalidDbUrl { raw: String },
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id<T: std::str::FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let raw = require_value(args, flag)?;
    raw.parse().map_err(|_| ArgsError::InvalidId { flag, raw })
}

fn parse_answer(raw: String) -> Result<(QuestionId, OptionId), ArgsError> {
    let parsed = raw
        .split_once(':')
        .and_then(|(q, o)| Some((q.parse().ok()?, o.parse().ok()?)));
    parsed.ok_or(ArgsError::InvalidAnswer { raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app seed");
    eprintln!("  app dashboard --user <id>");
    eprintln!("  app activity  --user <id> [--limit <n>]");
    eprintln!("  app set       --user <id> --set <id>");
    eprintln!("  app practice  --user <id> --set <id>");
    eprintln!("                [--answer <question>:<option> ...] [--submit]");
    eprintln!("  app retry     --user <id> --set <id>");
    eprintln!("  app result    --user <id> --attempt <id>");
    eprintln!();
    eprintln!("Global options:");
    eprintln!("  --config <path>          TOML config file");
    eprintln!("  --db <sqlite_url>        default sqlite://quiz.sqlite3");
    eprintln!("  --pass-threshold <0-100> default 70");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_CONFIG, QUIZ_DB_URL, QUIZ_PASS_THRESHOLD, QUIZ_LOG, QUIZ_LOG_FORMAT");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Help,
    Seed,
    Dashboard {
        user: UserId,
    },
    Activity {
        user: UserId,
        limit: usize,
    },
    Set {
        user: UserId,
        set: QuestionSetId,
    },
    Practice {
        user: UserId,
        set: QuestionSetId,
        answers: Vec<(QuestionId, OptionId)>,
        submit: bool,
    },
    Retry {
        user: UserId,
        set: QuestionSetId,
    },
    Result {
        user: UserId,
        attempt: AttemptId,
    },
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    config_path: Option<PathBuf>,
    db_url: Option<String>,
    pass_threshold: Option<String>,
}

/// Flags collected before the command-specific requirements are checked.
#[derive(Default)]
struct Flags {
    user: Option<UserId>,
    set: Option<QuestionSetId>,
    attempt: Option<AttemptId>,
    limit: Option<usize>,
    answers: Vec<(QuestionId, OptionId)>,
    submit: bool,
}

fn parse_args(argv: impl IntoIterator<Item = String>) -> Result<(Command, Args), ArgsError> {
    let mut args = argv.into_iter();
    let name = match args.next() {
        None => return Ok((Command::Help, Args::default())),
        Some(name) => name,
    };
    if matches!(name.as_str(), "--help" | "-h" | "help") {
        return Ok((Command::Help, Args::default()));
    }

    let mut globals = Args::default();
    let mut flags = Flags::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => globals.config_path = Some(require_value(&mut args, "--config")?.into()),
            "--db" => {
                let value = require_value(&mut args, "--db")?;
                if value.trim().is_empty() {
                    return Err(ArgsError::InvalidDbUrl { raw: value });
                }
                globals.db_url = Some(value);
            }
            "--pass-threshold" => {
                globals.pass_threshold = Some(require_value(&mut args, "--pass-threshold")?);
            }
            "--user" => flags.user = Some(parse_id(&mut args, "--user")?),
            "--set" => flags.set = Some(parse_id(&mut args, "--set")?),
            "--attempt" => flags.attempt = Some(parse_id(&mut args, "--attempt")?),
            "--limit" => flags.limit = Some(parse_id(&mut args, "--limit")?),
            "--answer" => flags
                .answers
                .push(parse_answer(require_value(&mut args, "--answer")?)?),
            "--submit" => flags.submit = true,
            "--help" | "-h" => return Ok((Command::Help, globals)),
            _ => return Err(ArgsError::UnknownArg(arg)),
        }
    }

    let command = build_command(&name, flags)?;
    Ok((command, globals))
}

fn build_command(name: &str, flags: Flags) -> Result<Command, ArgsError> {
    let user = |command: &'static str| {
        flags.user.ok_or(ArgsError::MissingFlag {
            command,
            flag: "--user",
        })
    };
    let set = |command: &'static str| {
        flags.set.ok_or(ArgsError::MissingFlag {
            command,
            flag: "--set",
        })
    };

    let command = match name {
        "seed" => Command::Seed,
        "dashboard" => Command::Dashboard {
            user: user("dashboard")?,
        },
        "activity" => Command::Activity {
            user: user("activity")?,
            limit: flags.limit.unwrap_or(10),
        },
        "set" => Command::Set {
            user: user("set")?,
            set: set("set")?,
        },
        "practice" => Command::Practice {
            user: user("practice")?,
            set: set("practice")?,
            answers: flags.answers.clone(),
            submit: flags.submit,
        },
        "retry" => Command::Retry {
            user: user("retry")?,
            set: set("retry")?,
        },
        "result" => Command::Result {
            user: user("result")?,
            attempt: flags.attempt.ok_or(ArgsError::MissingFlag {
                command: "result",
                flag: "--attempt",
            })?,
        },
        other => return Err(ArgsError::UnknownCommand(other.to_owned())),
    };
    Ok(command)
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") || raw.starts_with("sqlite:file:")
    {
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
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        // In-memory and URI-style databases need no file on disk.
        return Ok(());
    };
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

/// Resolve configuration: file, then environment, then command-line flags.
fn resolve_config(args: &Args) -> Result<AppConfig, config::ConfigError> {
    let path = args
        .config_path
        .clone()
        .or_else(|| std::env::var("QUIZ_CONFIG").ok().map(PathBuf::from));
    let mut cfg = AppConfig::load(path.as_deref())?;
    cfg.apply_env(|key| std::env::var(key).ok())?;
    if let Some(url) = &args.db_url {
        cfg.set_database_url(url.clone())?;
    }
    if let Some(raw) = &args.pass_threshold {
        cfg.set_pass_threshold(raw)?;
    }
    cfg.database_url = normalize_sqlite_url(cfg.database_url);
    Ok(cfg)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PracticeReport {
    attempt_id: Option<AttemptId>,
    question_set_id: QuestionSetId,
    answered: usize,
    total_questions: usize,
    submitted: bool,
    score: Option<ScoreCard>,
}

impl PracticeReport {
    fn from_session(session: &AttemptSession) -> Self {
        Self {
            attempt_id: session.attempt_id(),
            question_set_id: session.question_set().id(),
            answered: session.answered_count(),
            total_questions: session.total_questions(),
            submitted: session.score().is_some(),
            score: session.score().copied(),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let (command, args) = parse_args(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    if command == Command::Help {
        print_usage();
        return Ok(());
    }

    telemetry::init_tracing();
    let cfg = resolve_config(&args)?;
    debug!(
        database_url = %cfg.database_url,
        pass_threshold = cfg.pass_threshold,
        "resolved config"
    );

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&cfg.database_url)?;
    let app = AppServices::new_sqlite(&cfg.database_url, Clock::System, cfg.pass_policy()?).await?;

    match command {
        Command::Help => {}
        Command::Seed => {
            let sets = seed::sample_catalog()?;
            app.install_catalog(&sets).await?;
            let ids: Vec<QuestionSetId> = sets.iter().map(|s| s.id()).collect();
            print_json(&ids)?;
        }
        Command::Dashboard { user } => {
            let dashboard = app.progress().dashboard(StudentContext::new(user)).await?;
            print_json(&dashboard)?;
        }
        Command::Activity { user, limit } => {
            let items = app
                .progress()
                .recent_activity(StudentContext::new(user), limit)
                .await?;
            print_json(&items)?;
        }
        Command::Set { user, set } => {
            let detail = app
                .progress()
                .question_set(StudentContext::new(user), set)
                .await?;
            print_json(&detail)?;
        }
        Command::Practice {
            user,
            set,
            answers,
            submit,
        } => {
            let ctx = StudentContext::new(user);
            let practice = app.practice();
            let mut session = practice.enter_practice(ctx, set).await?;
            for (question_id, option_id) in answers {
                practice
                    .select_answer(ctx, &mut session, question_id, option_id)
                    .await?;
            }
            if submit {
                practice.submit(ctx, &mut session).await?;
            }
            print_json(&PracticeReport::from_session(&session))?;
        }
        Command::Retry { user, set } => {
            let session = app.practice().retry(StudentContext::new(user), set).await?;
            print_json(&PracticeReport::from_session(&session))?;
        }
        Command::Result { user, attempt } => {
            let result = app
                .results()
                .result(StudentContext::new(user), attempt)
                .await?;
            print_json(&result)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn no_arguments_prints_help() {
        assert_eq!(parse_args(argv(&[])).unwrap().0, Command::Help);
        assert_eq!(parse_args(argv(&["-h"])).unwrap().0, Command::Help);
    }

    #[test]
    fn parses_practice_with_answers() {
        let (command, args) = parse_args(argv(&[
            "practice", "--user", "7", "--set", "2", "--answer", "201:2012", "--answer",
            "202:2021", "--submit", "--db", "sqlite://tmp.db",
        ]))
        .unwrap();

        assert_eq!(
            command,
            Command::Practice {
                user: UserId::new(7),
                set: QuestionSetId::new(2),
                answers: vec![
                    (QuestionId::new(201), OptionId::new(2012)),
                    (QuestionId::new(202), OptionId::new(2021)),
                ],
                submit: true,
            }
        );
        assert_eq!(args.db_url.as_deref(), Some("sqlite://tmp.db"));
    }

    #[test]
    fn reports_missing_and_invalid_flags() {
        assert_eq!(
            parse_args(argv(&["retry", "--user", "1"])).unwrap_err(),
            ArgsError::MissingFlag {
                command: "retry",
                flag: "--set"
            }
        );
        assert_eq!(
            parse_args(argv(&["result", "--user", "x"])).unwrap_err(),
            ArgsError::InvalidId {
                flag: "--user",
                raw: "x".into()
            }
        );
        assert_eq!(
            parse_args(argv(&["practice", "--answer", "12"])).unwrap_err(),
            ArgsError::InvalidAnswer { raw: "12".into() }
        );
        assert_eq!(
            parse_args(argv(&["dashboard", "--user"])).unwrap_err(),
            ArgsError::MissingValue { flag: "--user" }
        );
        assert_eq!(
            parse_args(argv(&["grade"])).unwrap_err(),
            ArgsError::UnknownCommand("grade".into())
        );
    }

    #[test]
    fn activity_limit_defaults_to_ten() {
        let (command, _) = parse_args(argv(&["activity", "--user", "3"])).unwrap();
        assert_eq!(
            command,
            Command::Activity {
                user: UserId::new(3),
                limit: 10
            }
        );
    }

    #[test]
    fn set_detail_requires_set_flag() {
        assert_eq!(
            parse_args(argv(&["set", "--user", "1"])).unwrap_err(),
            ArgsError::MissingFlag {
                command: "set",
                flag: "--set"
            }
        );
        let (command, _) = parse_args(argv(&["set", "--set", "2", "--user", "1"])).unwrap();
        assert_eq!(
            command,
            Command::Set {
                user: UserId::new(1),
                set: QuestionSetId::new(2)
            }
        );
    }

    #[test]
    fn normalizes_relative_sqlite_paths() {
        assert_eq!(
            normalize_sqlite_url("sqlite://already.db".into()),
            "sqlite://already.db"
        );
        let url = normalize_sqlite_url("sqlite:data/quiz.db".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/quiz.db"));
    }
}
