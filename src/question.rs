//! Questionnaire definition: questions, their answer shapes, and sections.
//!
//! A [`Questionnaire`] is immutable once built and is handed to the form at
//! construction, so independent forms never share a question list.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::SurveyError;

/// Semantic labels for the two ends of a linear scale.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScaleLabel {
    pub min: String,
    pub max: String,
}

/// Answer shape and input affordance for a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionKind {
    /// Single selection from an ordered list of options.
    MultipleChoice { options: Vec<String> },
    /// Free text.
    Paragraph,
    /// Integer in the inclusive range `scale_min..=scale_max`.
    Linear {
        scale_min: i64,
        scale_max: i64,
        scale_label: Option<ScaleLabel>,
    },
}

impl QuestionKind {
    /// Wire name of the variant (`multiple_choice`, `paragraph`, `linear`).
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice { .. } => "multiple_choice",
            QuestionKind::Paragraph => "paragraph",
            QuestionKind::Linear { .. } => "linear",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Storage and lookup key. Renaming an id orphans persisted answers.
    pub id: String,
    pub text: String,
    pub kind: QuestionKind,
    pub required: bool,
    pub section: String,
}

/// Typed view of an answer. The wire format is always a string; this type
/// exists only at the input boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Choice(String),
    Text(String),
    Scale(i64),
}

impl Answer {
    /// Convert to the string stored in the response set.
    pub fn into_wire(self) -> String {
        match self {
            Answer::Choice(s) | Answer::Text(s) => s,
            Answer::Scale(n) => n.to_string(),
        }
    }

    /// Interpret `raw` according to `question`'s kind.
    ///
    /// Choices match an option exactly, or by its 1-based position.
    pub fn parse(question: &Question, raw: &str) -> Result<Answer, AnswerRejection> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AnswerRejection::Empty);
        }
        match &question.kind {
            QuestionKind::MultipleChoice { options } => {
                if let Some(opt) = options.iter().find(|o| o.as_str() == trimmed) {
                    return Ok(Answer::Choice(opt.clone()));
                }
                match trimmed.parse::<usize>() {
                    Ok(n) if n >= 1 && n <= options.len() => {
                        Ok(Answer::Choice(options[n - 1].clone()))
                    }
                    _ => Err(AnswerRejection::NotAnOption {
                        value: trimmed.to_owned(),
                    }),
                }
            }
            QuestionKind::Paragraph => Ok(Answer::Text(raw.trim_end().to_owned())),
            QuestionKind::Linear {
                scale_min,
                scale_max,
                ..
            } => {
                let n = trimmed
                    .parse::<i64>()
                    .map_err(|_| AnswerRejection::NotAnInteger {
                        value: trimmed.to_owned(),
                    })?;
                if n < *scale_min || n > *scale_max {
                    return Err(AnswerRejection::OutOfRange {
                        value: n,
                        min: *scale_min,
                        max: *scale_max,
                    });
                }
                Ok(Answer::Scale(n))
            }
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Choice(s) | Answer::Text(s) => f.write_str(s),
            Answer::Scale(n) => write!(f, "{n}"),
        }
    }
}

/// Why a raw value does not fit a question's kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnswerRejection {
    #[error("answer is empty")]
    Empty,
    #[error("'{value}' is not one of the options")]
    NotAnOption { value: String },
    #[error("'{value}' is not a whole number")]
    NotAnInteger { value: String },
    #[error("{value} is outside the scale {min}..={max}")]
    OutOfRange { value: i64, min: i64, max: i64 },
}

/// An ordered, validated list of questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Questionnaire {
    questions: Vec<Question>,
}

impl Questionnaire {
    /// Validate and wrap `questions`, preserving declaration order.
    pub fn new(questions: Vec<Question>) -> Result<Self, SurveyError> {
        if questions.is_empty() {
            return Err(SurveyError::EmptyQuestionnaire);
        }
        let mut seen: HashSet<&str> = HashSet::with_capacity(questions.len());
        for (position, q) in questions.iter().enumerate() {
            if q.id.trim().is_empty() {
                return Err(SurveyError::EmptyQuestionId { position });
            }
            if !seen.insert(q.id.as_str()) {
                return Err(SurveyError::DuplicateQuestionId { id: q.id.clone() });
            }
            match &q.kind {
                QuestionKind::MultipleChoice { options } if options.is_empty() => {
                    return Err(SurveyError::MissingOptions { id: q.id.clone() });
                }
                QuestionKind::Linear {
                    scale_min,
                    scale_max,
                    ..
                } if scale_min > scale_max => {
                    return Err(SurveyError::InvalidScale {
                        id: q.id.clone(),
                        min: *scale_min,
                        max: *scale_max,
                    });
                }
                _ => {}
            }
        }
        Ok(Self { questions })
    }

    /// Read a questionnaire from a TOML file of `[[questions]]` tables.
    pub fn load(path: &Path) -> Result<Self, SurveyError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| SurveyError::QuestionsReadFailed {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            SurveyError::QuestionsParseFailed { detail, .. } => SurveyError::QuestionsParseFailed {
                path: path.to_path_buf(),
                detail,
            },
            other => other,
        })
    }

    /// Parse TOML questionnaire content.
    pub fn from_toml_str(contents: &str) -> Result<Self, SurveyError> {
        let file: QuestionsFile =
            toml::from_str(contents).map_err(|e| SurveyError::QuestionsParseFailed {
                path: Default::default(),
                detail: e.to_string(),
            })?;
        let questions = file
            .questions
            .into_iter()
            .map(QuestionDef::into_question)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(questions)
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Look up a question by id. Linear scan; questionnaires are small.
    pub fn get(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Section labels in order of first appearance.
    pub fn sections(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for q in &self.questions {
            if !out.contains(&q.section.as_str()) {
                out.push(q.section.as_str());
            }
        }
        out
    }

    /// Questions belonging to `section`, in declaration order.
    pub fn section_questions<'a>(
        &'a self,
        section: &'a str,
    ) -> impl Iterator<Item = &'a Question> + 'a {
        self.questions.iter().filter(move |q| q.section == section)
    }

    /// Ids of required questions, in declaration order.
    pub fn required_ids(&self) -> impl Iterator<Item = &str> {
        self.questions
            .iter()
            .filter(|q| q.required)
            .map(|q| q.id.as_str())
    }

    /// Check `raw` against the kind of question `id`.
    ///
    /// Returns `None` for unknown ids: answers to those are still accepted by
    /// the form, they just cannot be checked.
    pub fn check_answer(&self, id: &str, raw: &str) -> Option<Result<Answer, AnswerRejection>> {
        self.get(id).map(|q| Answer::parse(q, raw))
    }

    /// The questionnaire shipped with the Promptability beta.
    pub fn builtin() -> Self {
        let questions = vec![
            choice(
                "role",
                "Which best describes your role?",
                &["Developer", "Writer / marketer", "Researcher", "Student", "Other"],
                true,
                ABOUT_YOU,
            ),
            choice(
                "ai_usage_frequency",
                "How often do you use AI chat assistants?",
                &["Several times a day", "Daily", "Weekly", "Rarely"],
                true,
                ABOUT_YOU,
            ),
            choice(
                "primary_assistant",
                "Which assistant do you use Promptability with most?",
                &["ChatGPT", "Claude", "Gemini", "Perplexity", "Other"],
                true,
                USING,
            ),
            linear(
                "ease_of_use",
                "How easy was it to optimize a prompt with the extension?",
                (1, 5),
                ("Very hard", "Very easy"),
                true,
                USING,
            ),
            linear(
                "output_quality",
                "How much did optimized prompts improve the answers you got?",
                (1, 5),
                ("Not at all", "A great deal"),
                true,
                USING,
            ),
            paragraph(
                "favorite_feature",
                "What did you like most about Promptability?",
                false,
                USING,
            ),
            linear(
                "recommend_likelihood",
                "How likely are you to recommend Promptability to a colleague?",
                (0, 10),
                ("Not likely", "Extremely likely"),
                true,
                FEEDBACK,
            ),
            choice(
                "would_pay",
                "Would you pay for a Pro plan with unlimited optimizations?",
                &["Yes", "Maybe", "No"],
                true,
                FEEDBACK,
            ),
            paragraph(
                "improvements",
                "What should we improve or add next?",
                false,
                FEEDBACK,
            ),
        ];
        // The literal list above satisfies every construction rule.
        Self { questions }
    }
}

const ABOUT_YOU: &str = "About you";
const USING: &str = "Using Promptability";
const FEEDBACK: &str = "Feedback";

fn choice(id: &str, text: &str, options: &[&str], required: bool, section: &str) -> Question {
    Question {
        id: id.to_owned(),
        text: text.to_owned(),
        kind: QuestionKind::MultipleChoice {
            options: options.iter().map(|o| (*o).to_owned()).collect(),
        },
        required,
        section: section.to_owned(),
    }
}

fn paragraph(id: &str, text: &str, required: bool, section: &str) -> Question {
    Question {
        id: id.to_owned(),
        text: text.to_owned(),
        kind: QuestionKind::Paragraph,
        required,
        section: section.to_owned(),
    }
}

fn linear(
    id: &str,
    text: &str,
    (scale_min, scale_max): (i64, i64),
    (low, high): (&str, &str),
    required: bool,
    section: &str,
) -> Question {
    Question {
        id: id.to_owned(),
        text: text.to_owned(),
        kind: QuestionKind::Linear {
            scale_min,
            scale_max,
            scale_label: Some(ScaleLabel {
                min: low.to_owned(),
                max: high.to_owned(),
            }),
        },
        required,
        section: section.to_owned(),
    }
}

/// TOML file layout: a list of `[[questions]]` tables.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QuestionsFile {
    questions: Vec<QuestionDef>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum KindTag {
    MultipleChoice,
    Paragraph,
    Linear,
}

/// Flat form of a question as written in a file. `id`, `text` and `type`
/// are required; kind-specific fields are checked after conversion.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QuestionDef {
    id: String,
    text: String,
    #[serde(rename = "type")]
    kind: KindTag,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    scale_min: Option<i64>,
    #[serde(default)]
    scale_max: Option<i64>,
    #[serde(default)]
    scale_label: Option<ScaleLabel>,
}

impl QuestionDef {
    fn into_question(self) -> Result<Question, SurveyError> {
        let kind = match self.kind {
            KindTag::MultipleChoice => QuestionKind::MultipleChoice {
                options: self.options.unwrap_or_default(),
            },
            KindTag::Paragraph => QuestionKind::Paragraph,
            KindTag::Linear => match (self.scale_min, self.scale_max) {
                (Some(scale_min), Some(scale_max)) => QuestionKind::Linear {
                    scale_min,
                    scale_max,
                    scale_label: self.scale_label,
                },
                _ => return Err(SurveyError::MissingScale { id: self.id }),
            },
        };
        Ok(Question {
            id: self.id,
            text: self.text,
            kind,
            required: self.required,
            section: self.section.unwrap_or_else(|| DEFAULT_SECTION.to_owned()),
        })
    }
}

const DEFAULT_SECTION: &str = "General";
