use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use quiz_core::model::{QuestionBank, QuestionFilter, QuizMode, QuizSettings, TopicId};
use services::{AppServices, Clock, HttpReportConfig, LiveSession, QuizService};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod input;
mod runner;

use runner::{Exit, Input, print_summary, prompt, run_session};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "quiz", version, about = "NCLEX practice and exam quizzes in the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a quiz
    Run {
        /// Question bank JSON file
        #[arg(long, env = "QUIZ_BANK", default_value = "data/sample_bank.json")]
        bank: PathBuf,

        /// SQLite database for history, re-ask list and saved sessions
        #[arg(long, env = "QUIZ_DB_URL", default_value = "sqlite:quiz.sqlite3")]
        db: String,

        /// Limit to one topic; omit for a mixed quiz
        #[arg(long)]
        topic: Option<String>,

        /// Limit to these categories (repeatable)
        #[arg(long)]
        category: Vec<String>,

        #[arg(long, value_enum, default_value_t = ModeArg::Practice)]
        mode: ModeArg,

        /// Number of questions (default from settings)
        #[arg(long, conflicts_with = "all")]
        size: Option<usize>,

        /// Use every matching question
        #[arg(long)]
        all: bool,

        /// Endpoint that receives completion reports
        #[arg(long, env = "QUIZ_REPORT_URL")]
        report_url: Option<String>,

        /// Bearer token for the report endpoint
        #[arg(long, env = "QUIZ_REPORT_TOKEN", hide_env_values = true)]
        report_token: Option<String>,
    },

    /// Show recent results and topic stats
    History {
        #[arg(long, env = "QUIZ_DB_URL", default_value = "sqlite:quiz.sqlite3")]
        db: String,

        #[arg(long)]
        topic: Option<String>,

        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Check a question bank file
    Validate {
        #[arg(long, env = "QUIZ_BANK", default_value = "data/sample_bank.json")]
        bank: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Practice,
    Exam,
}

impl From<ModeArg> for QuizMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Practice => QuizMode::Practice,
            ModeArg::Exam => QuizMode::Exam,
        }
    }
}

fn load_bank(path: &Path) -> AppResult<QuestionBank> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read bank {}: {e}", path.display()))?;
    Ok(QuestionBank::from_json(&json)?)
}

async fn open_services(
    db: String,
    bank: QuestionBank,
    report: Option<HttpReportConfig>,
) -> AppResult<AppServices> {
    let db_url = normalize_sqlite_url(db);
    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&db_url)?;
    let services = AppServices::new_sqlite(
        &db_url,
        Clock::default(),
        QuizSettings::default(),
        Arc::new(bank),
        report,
    )
    .await?;
    Ok(services)
}

#[allow(clippy::too_many_arguments)]
async fn run_quiz(
    bank: PathBuf,
    db: String,
    topic: Option<String>,
    categories: Vec<String>,
    mode: QuizMode,
    size: Option<usize>,
    all: bool,
    report: Option<HttpReportConfig>,
) -> AppResult<()> {
    let bank = load_bank(&bank)?;
    let services = open_services(db, bank, report).await?;
    let quiz = services.quiz();

    let filter = topic
        .map_or_else(QuestionFilter::any, |t| QuestionFilter::for_topic(TopicId::new(t)))
        .with_categories(categories);
    let size = if all {
        None
    } else {
        Some(size.unwrap_or_else(|| {
            usize::try_from(quiz.settings().session_size()).unwrap_or(usize::MAX)
        }))
    };

    let mut input: Input = BufReader::new(tokio::io::stdin()).lines();
    let mut live = match resume_or_start(&quiz, &filter, mode, size, &mut input).await? {
        Some(live) => live,
        None => return Ok(()),
    };

    loop {
        match run_session(&quiz, &live, &mut input).await? {
            Exit::Suspended => {
                println!("Session saved. Run again within 24 hours to resume.");
                return Ok(());
            }
            Exit::Abandoned => {
                println!("Session abandoned.");
                return Ok(());
            }
            Exit::Completed(summary) => {
                print_summary(&summary);
                live.wait_for_report().await;
            }
        }

        let Some(line) = prompt(&mut input, "\n[r]etake, re[v]iew missed, [q]uit: ").await? else {
            return Ok(());
        };
        live = match line.trim() {
            "r" => quiz.retake(&live).await?,
            "v" => match quiz.review_missed(&live).await {
                Ok(review) => review,
                Err(err) => {
                    println!("{err}");
                    return Ok(());
                }
            },
            _ => return Ok(()),
        };
    }
}

async fn resume_or_start(
    quiz: &QuizService,
    filter: &QuestionFilter,
    mode: QuizMode,
    size: Option<usize>,
    input: &mut Input,
) -> AppResult<Option<LiveSession>> {
    if let Some(saved) = quiz.resume(&filter.scope()).await? {
        let progress = saved.progress().await;
        let question = format!(
            "Resume saved session ({} of {} answered)? [Y/n]: ",
            progress.answered, progress.total
        );
        let Some(answer) = prompt(input, &question).await? else {
            return Ok(None);
        };
        if !answer.trim().eq_ignore_ascii_case("n") {
            return Ok(Some(saved));
        }
        let _ = quiz.abandon(&saved).await;
    }

    let live = quiz.start(filter.clone(), mode, size).await?;
    info!(mode = %mode, "starting quiz");
    Ok(Some(live))
}

async fn show_history(db: String, topic: Option<String>, limit: u32) -> AppResult<()> {
    let db_url = normalize_sqlite_url(db);
    prepare_sqlite_file(&db_url)?;
    let storage = storage::repository::Storage::sqlite(&db_url).await?;
    let history = services::SessionHistoryService::new(storage.reports.clone());
    let topic = topic.map(TopicId::new);

    if let Some(topic) = &topic {
        match history.topic_stats(topic).await? {
            Some(stats) => println!(
                "{topic}: {} attempts, avg {:.0}%, best {:.0}%, last {:.0}%, {}s total",
                stats.attempts,
                stats.avg_score * 100.0,
                stats.best_score * 100.0,
                stats.last_score * 100.0,
                stats.total_seconds
            ),
            None => println!("{topic}: no completed sessions yet"),
        }
    }

    for item in history.list_recent(topic.as_ref(), limit).await? {
        println!(
            "{}  {:<8} {:<20} {:>4.0}%  {}/{}",
            item.completed_at.format("%Y-%m-%d %H:%M"),
            item.mode.as_str(),
            item.topic_id.as_str(),
            item.score * 100.0,
            item.correct_count,
            item.total
        );
    }
    Ok(())
}

fn validate_bank(path: &Path) -> AppResult<()> {
    let bank = load_bank(path)?;
    let topics: Vec<String> = bank.topics().iter().map(ToString::to_string).collect();
    println!(
        "{}: {} questions across {} topics ({})",
        path.display(),
        bank.len(),
        topics.len(),
        topics.join(", ")
    );
    Ok(())
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
    let path = Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> AppResult<()> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| format!("invalid --db value: {db_url}"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(format!("invalid --db value: {db_url}").into());
    }

    let path = Path::new(path);
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

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            bank,
            db,
            topic,
            category,
            mode,
            size,
            all,
            report_url,
            report_token,
        } => {
            let report = HttpReportConfig::from_parts(report_url, report_token);
            run_quiz(bank, db, topic, category, mode.into(), size, all, report).await
        }
        Commands::History { db, topic, limit } => show_history(db, topic, limit).await,
        Commands::Validate { bank } => validate_bank(&bank),
    };

    if let Err(err) = result {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:quiz.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("quiz.sqlite3"));
        assert_eq!(
            normalize_sqlite_url("sqlite::memory:".into()),
            "sqlite::memory:"
        );
    }

    #[test]
    fn cli_parses_exam_run() {
        let cli = Cli::try_parse_from([
            "quiz", "run", "--topic", "cardiac", "--mode", "exam", "--size", "5",
        ])
        .unwrap();
        let Commands::Run { topic, mode, size, all, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(topic.as_deref(), Some("cardiac"));
        assert_eq!(mode, ModeArg::Exam);
        assert_eq!(size, Some(5));
        assert!(!all);
    }

    #[test]
    fn sample_bank_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data/sample_bank.json");
        let bank = load_bank(&path).unwrap();
        assert!(bank.len() >= 6);
    }
}
