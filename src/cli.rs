use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Promptability survey.
///
/// Answer the Promptability feedback questionnaire from the terminal.
/// Answers are saved after every change and survive restarts until they are
/// submitted or reset.
#[derive(Debug, Parser)]
#[command(name = "survey", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
///
/// Each can also be set via config file or `SURVEY_*` env vars.
/// Precedence: CLI > env > file.
#[derive(Debug, Clone, clap::Args)]
pub struct GlobalArgs {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Submission endpoint URL.
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// API key sent with the submission.
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Directory for saved answers (default: ".survey").
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    /// Versioned key the answers are saved under (default: "promptability_survey_v1").
    #[arg(long, global = true)]
    pub storage_key: Option<String>,

    /// TOML questionnaire to use instead of the built-in one.
    #[arg(long, global = true)]
    pub questions: Option<PathBuf>,

    /// HTTP timeout for submission in seconds (default: 30).
    #[arg(long, global = true)]
    pub timeout_sec: Option<u64>,

    /// Language tag reported with the submission (default: from LANG).
    #[arg(long, global = true)]
    pub language: Option<String>,

    /// Log level filter (default: "info"). Supports tracing directives.
    /// Overridden by SURVEY_LOG env var.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Path to a log file. Structured JSON logs are appended here in
    /// addition to the human-readable stderr output.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the questions, grouped by section.
    Questions,

    /// Answer one question.
    Answer(AnswerArgs),

    /// Remove the answer to one question.
    Clear(ClearArgs),

    /// Show unanswered required questions and progress per section.
    Status,

    /// Submit the saved answers.
    Submit(SubmitArgs),

    /// Delete all saved answers.
    Reset(ResetArgs),

    /// Walk through the questionnaire interactively, then submit.
    Fill(FillArgs),
}

#[derive(Debug, Clone, clap::Args)]
pub struct AnswerArgs {
    /// Question id.
    pub id: String,

    /// Answer text. For multiple choice, the option text or its number;
    /// for scales, an integer within the range.
    pub value: String,
}

#[derive(Debug, Clone, clap::Args)]
pub struct ClearArgs {
    /// Question id.
    pub id: String,
}

/// Where the respondent came from and how to reach them.
#[derive(Debug, Clone, clap::Args)]
pub struct RespondentArgs {
    /// Contact email (optional).
    #[arg(long)]
    pub email: Option<String>,

    /// Page URL or query string carrying tester/cohort/source tags.
    #[arg(long)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub respondent: RespondentArgs,

    /// Agree to the collection of your answers.
    #[arg(long, default_value_t = false)]
    pub consent: bool,
}

#[derive(Debug, Clone, clap::Args)]
pub struct ResetArgs {
    /// Skip the confirmation prompt.
    #[arg(long, short = 'y', default_value_t = false)]
    pub yes: bool,
}

#[derive(Debug, Clone, clap::Args)]
pub struct FillArgs {
    #[command(flatten)]
    pub respondent: RespondentArgs,

    /// Ask every question, including ones already answered.
    #[arg(long, default_value_t = false)]
    pub all: bool,
}
