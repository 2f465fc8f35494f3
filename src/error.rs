use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SurveyError {
    #[error("Questionnaire has no questions.")]
    EmptyQuestionnaire,

    #[error("Question at position {position} has an empty id")]
    EmptyQuestionId { position: usize },

    #[error("Duplicate question id '{id}'")]
    DuplicateQuestionId { id: String },

    #[error("Multiple-choice question '{id}' has no options")]
    MissingOptions { id: String },

    #[error("Linear question '{id}' needs both scale_min and scale_max")]
    MissingScale { id: String },

    #[error("Linear question '{id}' has scale_min {min} greater than scale_max {max}")]
    InvalidScale { id: String, min: i64, max: i64 },

    #[error("Failed to read questionnaire file {path}: {detail}")]
    QuestionsReadFailed { path: PathBuf, detail: String },

    #[error("Failed to parse questionnaire file {path}: {detail}")]
    QuestionsParseFailed { path: PathBuf, detail: String },

    #[error("Invalid storage key '{key}': must be non-empty without path separators or dots")]
    InvalidStorageKey { key: String },

    #[error("Failed to read storage entry '{key}': {detail}")]
    StorageReadFailed { key: String, detail: String },

    #[error("Failed to write storage entry '{key}': {detail}")]
    StorageWriteFailed { key: String, detail: String },

    #[error("Failed to remove storage entry '{key}': {detail}")]
    StorageRemoveFailed { key: String, detail: String },

    #[error("Failed to parse environment variable '{var}': {detail}")]
    ConfigEnvParseError { var: String, detail: String },

    #[error("No submission endpoint configured (set --endpoint, SURVEY_ENDPOINT, or endpoint in the config file)")]
    EndpointNotConfigured,

    #[error("Failed to build HTTP client: {detail}")]
    HttpClientInit { detail: String },

    #[error("Submission endpoint {endpoint} returned status {status}")]
    SubmitRejected { endpoint: String, status: u16 },

    #[error("Submission to {endpoint} failed: {detail}")]
    SubmitTransportFailed { endpoint: String, detail: String },

    #[error("Interactive input failed: {detail}")]
    PromptIo { detail: String },
}
