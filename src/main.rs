use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use promptability_survey::app::{self, Completion, FillOptions, PromptConfirm};
use promptability_survey::cli::{Cli, Commands};
use promptability_survey::config::SurveyConfig;
use promptability_survey::submit::HttpTransport;

/// Exit code when the form is not ready to submit.
const EXIT_INCOMPLETE: u8 = 2;
/// Exit code when the endpoint rejected the submission or was unreachable.
const EXIT_SUBMIT_FAILED: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let stdin = io::stdin();
    let stdout = io::stdout();
    match run(cli, &mut stdin.lock(), &mut stdout.lock()) {
        Ok(completion) => exit_code(completion),
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn exit_code(completion: Completion) -> ExitCode {
    match completion {
        Completion::Done => ExitCode::SUCCESS,
        Completion::Incomplete => ExitCode::from(EXIT_INCOMPLETE),
        Completion::SubmitFailed => ExitCode::from(EXIT_SUBMIT_FAILED),
    }
}

fn run(cli: Cli, input: &mut impl BufRead, out: &mut impl Write) -> anyhow::Result<Completion> {
    let config = SurveyConfig::load(cli.global.config.as_deref(), &cli.global)?;

    promptability_survey::logging::init(&config)?;

    config.validate()?;

    info!(
        storage_dir = %config.storage_dir.display(),
        storage_key = %config.storage_key,
        questions = %config
            .questions_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "builtin".to_owned()),
        endpoint = config.endpoint.as_deref().unwrap_or("none"),
        "config loaded"
    );

    match cli.command {
        Commands::Questions => {
            let questionnaire = app::load_questionnaire(&config)?;
            app::list_questions(&questionnaire, out)?;
            Ok(Completion::Done)
        }
        Commands::Answer(args) => {
            let mut form = app::open_form(&config, None)?;
            app::answer(&mut form, &args.id, &args.value, out)?;
            Ok(Completion::Done)
        }
        Commands::Clear(args) => {
            let mut form = app::open_form(&config, None)?;
            app::clear(&mut form, &args.id, out)?;
            Ok(Completion::Done)
        }
        Commands::Status => {
            let form = app::open_form(&config, None)?;
            let complete = app::status(&form, out)?;
            Ok(if complete {
                Completion::Done
            } else {
                Completion::Incomplete
            })
        }
        Commands::Submit(args) => {
            let target = config.submit_target()?;
            let transport = HttpTransport::new(config.timeout(), &config.user_agent)?;
            let mut form = app::open_form(&config, args.respondent.query.as_deref())?;
            app::submit(
                &mut form,
                args.respondent.email.as_deref(),
                args.consent,
                &transport,
                &target,
                out,
            )
        }
        Commands::Reset(args) => {
            let mut form = app::open_form(&config, None)?;
            if args.yes {
                app::reset(&mut form, &mut |_: &str| true, out)?;
            } else {
                let mut prompt_out = io::stderr();
                let mut confirm = PromptConfirm {
                    input,
                    output: &mut prompt_out,
                };
                app::reset(&mut form, &mut confirm, out)?;
            }
            Ok(Completion::Done)
        }
        Commands::Fill(args) => {
            let target = config.submit_target()?;
            let transport = HttpTransport::new(config.timeout(), &config.user_agent)?;
            let mut form = app::open_form(&config, args.respondent.query.as_deref())?;
            app::fill(
                &mut form,
                FillOptions {
                    email: args.respondent.email.as_deref(),
                    all: args.all,
                },
                &transport,
                &target,
                input,
                out,
            )
        }
    }
}
