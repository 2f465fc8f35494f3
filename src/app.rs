//! Command handlers behind the `survey` binary.
//!
//! Every handler writes user-facing text to the given writer and reads
//! answers from the given reader, so sessions can be scripted in tests.

use std::io::{BufRead, Write};

use anyhow::Context;
use tracing::{info, warn};

use crate::config::SurveyConfig;
use crate::error::SurveyError;
use crate::form::{Confirm, SessionContext, SubmitOutcome, SurveyForm};
use crate::question::{Answer, Question, QuestionKind, Questionnaire};
use crate::storage::{FileStorage, Storage};
use crate::submit::{SubmitState, SubmitTarget, Transport};

/// How a command finished, mapped to the process exit code by `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Done,
    /// The form is not ready to submit (consent or required answers missing).
    Incomplete,
    /// The endpoint rejected the submission or could not be reached.
    SubmitFailed,
}

/// Load the configured questionnaire, or the built-in one.
pub fn load_questionnaire(config: &SurveyConfig) -> anyhow::Result<Questionnaire> {
    match &config.questions_path {
        Some(path) => Questionnaire::load(path)
            .with_context(|| format!("cannot use questionnaire {}", path.display())),
        None => Ok(Questionnaire::builtin()),
    }
}

/// Open the form backed by the configured storage directory.
pub fn open_form(
    config: &SurveyConfig,
    query: Option<&str>,
) -> anyhow::Result<SurveyForm<FileStorage>> {
    let questionnaire = load_questionnaire(config)?;
    let context = SessionContext {
        query: query.map(str::to_owned),
        user_agent: config.user_agent.clone(),
        language: config.language.clone(),
    };
    Ok(SurveyForm::initialize(
        questionnaire,
        FileStorage::new(&config.storage_dir),
        config.storage_key.as_str(),
        context,
    ))
}

pub fn list_questions(questionnaire: &Questionnaire, out: &mut impl Write) -> anyhow::Result<()> {
    for section in questionnaire.sections() {
        writeln!(out, "{section}")?;
        for q in questionnaire.section_questions(section) {
            writeln!(out, "  [{}]{} {}", q.id, required_marker(q), q.text)?;
            write_affordance(q, "      ", out)?;
        }
    }
    Ok(())
}

/// Record one answer after checking it against the question's kind.
///
/// Answers to unknown ids are stored as given; the form accepts any id.
pub fn answer<S: Storage>(
    form: &mut SurveyForm<S>,
    id: &str,
    value: &str,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    form.mark_touched(id);
    match form.questionnaire().check_answer(id, value) {
        None => {
            warn!(question_id = %id, "answer stored for unknown question id");
            form.set_answer(id, value);
        }
        Some(Ok(answer)) => form.set_answer(id, answer.into_wire()),
        Some(Err(rejection)) => anyhow::bail!("invalid answer for '{id}': {rejection}"),
    }
    writeln!(out, "Saved answer for '{id}'.")?;
    Ok(())
}

pub fn clear<S: Storage>(
    form: &mut SurveyForm<S>,
    id: &str,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    form.clear_answer(id);
    writeln!(out, "Cleared answer for '{id}'.")?;
    Ok(())
}

/// Print progress; returns whether every required question is answered.
pub fn status<S: Storage>(form: &SurveyForm<S>, out: &mut impl Write) -> anyhow::Result<bool> {
    for (section, progress) in form.sections_completion() {
        writeln!(
            out,
            "{section}: {}/{} required answered ({}%)",
            progress.answered, progress.total, progress.percent
        )?;
    }
    let overall = form.overall_completion();
    writeln!(out, "Overall: {}%", overall.percent)?;

    let missing = form.missing_required();
    if missing.is_empty() {
        writeln!(out, "All required questions are answered.")?;
        return Ok(true);
    }
    writeln!(out, "Unanswered required questions:")?;
    for id in &missing {
        let text = form
            .questionnaire()
            .get(id)
            .map(|q| q.text.as_str())
            .unwrap_or_default();
        writeln!(out, "  [{id}] {text}")?;
    }
    Ok(false)
}

/// Run a submission and report the outcome to the respondent.
pub fn submit<S: Storage, T: Transport + ?Sized>(
    form: &mut SurveyForm<S>,
    email: Option<&str>,
    consent: bool,
    transport: &T,
    target: &SubmitTarget,
    out: &mut impl Write,
) -> anyhow::Result<Completion> {
    let outcome = form.submit(email, consent, transport, target);
    report_outcome(form, &outcome, out)
}

fn report_outcome<S: Storage>(
    form: &SurveyForm<S>,
    outcome: &SubmitOutcome,
    out: &mut impl Write,
) -> anyhow::Result<Completion> {
    let completion = match outcome {
        SubmitOutcome::ConsentRequired => {
            writeln!(
                out,
                "Please confirm you agree to share your answers (--consent) before submitting."
            )?;
            Completion::Incomplete
        }
        SubmitOutcome::MissingRequired { first, missing } => {
            let text = form
                .questionnaire()
                .get(first)
                .map(|q| q.text.as_str())
                .unwrap_or_default();
            writeln!(
                out,
                "{} required question(s) still need an answer. Start with [{first}] {text}",
                missing.len()
            )?;
            Completion::Incomplete
        }
        SubmitOutcome::AlreadySending => {
            writeln!(out, "A submission is already in progress.")?;
            Completion::Incomplete
        }
        SubmitOutcome::Sent(SubmitState::Ok) => {
            writeln!(out, "Thank you! Your answers were submitted.")?;
            Completion::Done
        }
        SubmitOutcome::Sent(_) => {
            writeln!(
                out,
                "Submission failed. Your answers are still saved; please try again."
            )?;
            Completion::SubmitFailed
        }
    };
    Ok(completion)
}

/// Reset after asking `confirm`. Returns whether anything was cleared.
pub fn reset<S: Storage, C: Confirm + ?Sized>(
    form: &mut SurveyForm<S>,
    confirm: &mut C,
    out: &mut impl Write,
) -> anyhow::Result<bool> {
    let cleared = form.reset(confirm);
    if cleared {
        writeln!(out, "All answers cleared.")?;
    } else {
        writeln!(out, "Reset cancelled.")?;
    }
    Ok(cleared)
}

/// Confirmation read from a line of input; only `y`/`yes` confirm.
pub struct PromptConfirm<'a, R, W> {
    pub input: &'a mut R,
    pub output: &'a mut W,
}

impl<R: BufRead, W: Write> Confirm for PromptConfirm<'_, R, W> {
    fn confirm(&mut self, message: &str) -> bool {
        if write!(self.output, "{message} [y/N] ").and_then(|_| self.output.flush()).is_err() {
            return false;
        }
        match read_line(&mut *self.input) {
            Ok(Some(line)) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            _ => false,
        }
    }
}

/// Options for an interactive session.
#[derive(Debug, Clone, Default)]
pub struct FillOptions<'a> {
    pub email: Option<&'a str>,
    /// Ask every question, including already answered ones.
    pub all: bool,
}

/// Walk the questionnaire, then ask for email and consent and submit.
///
/// An empty line keeps the current answer (or skips an optional question).
/// End of input stops the session with answers saved so far.
pub fn fill<S, T, R, W>(
    form: &mut SurveyForm<S>,
    options: FillOptions<'_>,
    transport: &T,
    target: &SubmitTarget,
    input: &mut R,
    out: &mut W,
) -> anyhow::Result<Completion>
where
    S: Storage,
    T: Transport + ?Sized,
    R: BufRead,
    W: Write,
{
    let questions: Vec<Question> = form.questionnaire().questions().to_vec();
    let mut current_section: Option<&str> = None;

    for q in &questions {
        if !options.all && form.responses().is_answered(&q.id) {
            continue;
        }
        if current_section != Some(q.section.as_str()) {
            let progress = form.section_completion(&q.section);
            writeln!(out, "\n== {} ({}% complete) ==", q.section, progress.percent)?;
            current_section = Some(q.section.as_str());
        }
        if !ask_question(form, q, input, out)? {
            writeln!(out, "\nInput ended; your answers are saved.")?;
            return Ok(Completion::Incomplete);
        }
    }

    let email = match options.email {
        Some(e) => Some(e.to_owned()),
        None => {
            write!(out, "\nEmail (optional): ")?;
            out.flush()?;
            read_line(input)?.filter(|l| !l.trim().is_empty())
        }
    };

    let consent = {
        let mut confirm = PromptConfirm {
            input: &mut *input,
            output: &mut *out,
        };
        confirm.confirm("I agree to share these answers with the Promptability team.")
    };

    loop {
        let outcome = form.submit(email.as_deref(), consent, transport, target);
        let completion = report_outcome(form, &outcome, out)?;
        if completion != Completion::SubmitFailed {
            return Ok(completion);
        }
        let mut retry = PromptConfirm {
            input: &mut *input,
            output: &mut *out,
        };
        if !retry.confirm("Try submitting again?") {
            return Ok(completion);
        }
        info!("retrying submission at respondent's request");
    }
}

/// Ask one question until a valid answer, an empty line, or end of input.
/// Returns `false` on end of input.
fn ask_question<S: Storage>(
    form: &mut SurveyForm<S>,
    q: &Question,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> anyhow::Result<bool> {
    loop {
        writeln!(out, "\n{}{}", q.text, required_marker(q))?;
        write_affordance(q, "  ", out)?;
        if let Some(current) = form.responses().get(&q.id) {
            writeln!(out, "  (current: {current})")?;
        }
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = read_line(input)? else {
            return Ok(false);
        };
        form.mark_touched(&q.id);

        if line.trim().is_empty() {
            if form.shows_required_hint(&q.id) {
                writeln!(out, "  This question is required.")?;
                continue;
            }
            return Ok(true);
        }

        match Answer::parse(q, &line) {
            Ok(answer) => {
                form.set_answer(&q.id, answer.into_wire());
                return Ok(true);
            }
            Err(rejection) => writeln!(out, "  {rejection}")?,
        }
    }
}

fn required_marker(q: &Question) -> &'static str {
    if q.required { " *" } else { "" }
}

fn write_affordance(q: &Question, indent: &str, out: &mut impl Write) -> std::io::Result<()> {
    match &q.kind {
        QuestionKind::MultipleChoice { options } => {
            for (i, opt) in options.iter().enumerate() {
                writeln!(out, "{indent}{}. {opt}", i + 1)?;
            }
        }
        QuestionKind::Paragraph => writeln!(out, "{indent}(free text)")?,
        QuestionKind::Linear {
            scale_min,
            scale_max,
            scale_label,
        } => match scale_label {
            Some(label) => writeln!(
                out,
                "{indent}{scale_min} ({}) .. {scale_max} ({})",
                label.min, label.max
            )?,
            None => writeln!(out, "{indent}{scale_min} .. {scale_max}")?,
        },
    }
    Ok(())
}

/// One line without its terminator, or `None` at end of input.
fn read_line(input: &mut impl BufRead) -> Result<Option<String>, SurveyError> {
    let mut line = String::new();
    let n = input
        .read_line(&mut line)
        .map_err(|e| SurveyError::PromptIo {
            detail: e.to_string(),
        })?;
    if n == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(Some(line))
}
