//! Submission payload and the HTTP transport that delivers it.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::debug;

use crate::error::SurveyError;
use crate::responses::ResponseSet;

/// Header carrying the API key when none is configured explicitly.
pub const DEFAULT_API_KEY_HEADER: &str = "x-api-key";

/// Lifecycle of the submission attempt. There is no automatic way back to
/// `Idle` other than a form reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitState {
    #[default]
    Idle,
    Sending,
    Ok,
    Error,
}

/// Snapshot sent once per submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionPayload {
    pub email: Option<String>,
    pub consent: bool,
    pub responses: ResponseSet,
    pub meta: SubmissionMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMeta {
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub collected_at: String,
    /// Milliseconds since the form was opened.
    pub duration_ms: u64,
    pub user_agent: String,
    pub language: String,
    pub tester: Option<String>,
    pub cohort: Option<String>,
    pub source: Option<String>,
}

/// Where and how to deliver a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitTarget {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub api_key_header: String,
}

impl SubmitTarget {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            api_key_header: DEFAULT_API_KEY_HEADER.to_owned(),
        }
    }

    pub fn with_api_key(mut self, header: impl Into<String>, key: impl Into<String>) -> Self {
        self.api_key_header = header.into();
        self.api_key = Some(key.into());
        self
    }
}

/// Delivers a payload. `Ok(())` means the endpoint answered with a 2xx status.
pub trait Transport {
    fn post(&self, target: &SubmitTarget, payload: &SubmissionPayload) -> Result<(), SurveyError>;
}

/// Blocking reqwest transport: one POST with a JSON body per call.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, SurveyError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| SurveyError::HttpClientInit {
                detail: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn post(&self, target: &SubmitTarget, payload: &SubmissionPayload) -> Result<(), SurveyError> {
        let mut request = self
            .client
            .post(&target.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(payload);
        if let Some(key) = &target.api_key {
            request = request.header(target.api_key_header.as_str(), key.as_str());
        }

        let response = request
            .send()
            .map_err(|e| SurveyError::SubmitTransportFailed {
                endpoint: target.endpoint.clone(),
                detail: e.to_string(),
            })?;

        let status = response.status();
        // Body is informational only.
        let body = response.text().unwrap_or_default();
        debug!(
            endpoint = %target.endpoint,
            status = status.as_u16(),
            body_len = body.len(),
            "submission response received"
        );

        if !status.is_success() {
            return Err(SurveyError::SubmitRejected {
                endpoint: target.endpoint.clone(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
