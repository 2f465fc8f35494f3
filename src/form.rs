//! Survey form state manager.
//!
//! Owns the in-memory [`ResponseSet`] for one questionnaire session, keeps it
//! written through to [`Storage`], derives validation and progress from it,
//! and drives the submission state machine (`idle -> sending -> ok | error`).
//!
//! No error escapes this module: storage failures are logged and ignored,
//! validation results are returned as values, and network failures become
//! [`SubmitState::Error`] with the answers left intact for a retry.

use std::collections::BTreeSet;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, error, info, warn};

use crate::question::Questionnaire;
use crate::responses::{Attribution, ResponseSet};
use crate::storage::Storage;
use crate::submit::{SubmissionMeta, SubmissionPayload, SubmitState, SubmitTarget, Transport};

/// Default storage key. The suffix is the schema version of the stored record.
pub const DEFAULT_STORAGE_KEY: &str = "promptability_survey_v1";

/// Message shown by the reset confirmation prompt.
pub const RESET_CONFIRMATION: &str = "Clear all answers? This cannot be undone.";

/// Environment the form was opened in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// Page URL or bare query string carrying attribution parameters.
    pub query: Option<String>,
    pub user_agent: String,
    pub language: String,
}

/// Blocking yes/no confirmation for irreversible actions.
pub trait Confirm {
    fn confirm(&mut self, message: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, message: &str) -> bool {
        self(message)
    }
}

/// `(answered, total)` required questions in a section, plus the rounded percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionProgress {
    pub answered: usize,
    pub total: usize,
    pub percent: u8,
}

impl SectionProgress {
    /// `round(answered / total * 100)`, or 100 when there is nothing to answer.
    pub fn new(answered: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100
        } else {
            ((answered as f64 / total as f64) * 100.0).round() as u8
        };
        Self {
            answered,
            total,
            percent,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.answered == self.total
    }
}

/// What a call to [`SurveyForm::submit`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Consent was not given; the caller should focus the consent control.
    ConsentRequired,
    /// Required questions are unanswered; `first` is the one to focus.
    MissingRequired { first: String, missing: Vec<String> },
    /// A previous submission is still in flight.
    AlreadySending,
    /// Exactly one request was attempted; carries the resulting state.
    Sent(SubmitState),
}

pub struct SurveyForm<S: Storage> {
    questionnaire: Questionnaire,
    storage: S,
    storage_key: String,
    responses: ResponseSet,
    touched: BTreeSet<String>,
    submitted: bool,
    state: SubmitState,
    opened_at: Instant,
    attribution: Attribution,
    context: SessionContext,
}

impl<S: Storage> SurveyForm<S> {
    /// Open a form session.
    ///
    /// Starts the elapsed-time clock, parses attribution from the context
    /// query, and hydrates answers from `storage` when a well-formed record
    /// exists under `storage_key`. Answers to ids no longer in the
    /// questionnaire are dropped.
    pub fn initialize(
        questionnaire: Questionnaire,
        storage: S,
        storage_key: impl Into<String>,
        context: SessionContext,
    ) -> Self {
        let opened_at = Instant::now();
        let storage_key = storage_key.into();
        let attribution = context
            .query
            .as_deref()
            .map(Attribution::from_query)
            .unwrap_or_default();

        let mut responses = load_responses(&storage, &storage_key).unwrap_or_default();
        let stale = responses.retain_known(&questionnaire);
        if !stale.is_empty() {
            debug!(?stale, "dropped persisted answers for retired questions");
        }

        info!(
            storage_key = %storage_key,
            restored = responses.len(),
            question_count = questionnaire.len(),
            "survey form initialized"
        );

        Self {
            questionnaire,
            storage,
            storage_key,
            responses,
            touched: BTreeSet::new(),
            submitted: false,
            state: SubmitState::Idle,
            opened_at,
            attribution,
            context,
        }
    }

    pub fn questionnaire(&self) -> &Questionnaire {
        &self.questionnaire
    }

    pub fn responses(&self) -> &ResponseSet {
        &self.responses
    }

    pub fn attribution(&self) -> &Attribution {
        &self.attribution
    }

    pub fn state(&self) -> SubmitState {
        self.state
    }

    /// True once a submission has been attempted with consent, whatever its result.
    pub fn submitted(&self) -> bool {
        self.submitted
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Upsert an answer and write through to storage. Unknown ids are accepted.
    pub fn set_answer(&mut self, question_id: &str, value: impl Into<String>) {
        self.responses.set(question_id, value);
        self.persist();
    }

    /// Remove an answer (e.g. an emptied text field) and write through.
    pub fn clear_answer(&mut self, question_id: &str) {
        if self.responses.remove(question_id).is_some() {
            self.persist();
        }
    }

    pub fn mark_touched(&mut self, question_id: &str) {
        self.touched.insert(question_id.to_owned());
    }

    pub fn is_touched(&self, question_id: &str) -> bool {
        self.touched.contains(question_id)
    }

    /// Whether to show the inline "required" hint for a question.
    pub fn shows_required_hint(&self, question_id: &str) -> bool {
        let required = self
            .questionnaire
            .get(question_id)
            .is_some_and(|q| q.required);
        required
            && !self.responses.is_answered(question_id)
            && (self.submitted || self.is_touched(question_id))
    }

    /// Write the full response set under the storage key. Best-effort.
    pub fn persist(&self) {
        let json = match serde_json::to_string(&self.responses) {
            Ok(s) => s,
            Err(e) => {
                warn!(err = %e, "failed to serialize survey answers");
                return;
            }
        };
        if let Err(e) = self.storage.set(&self.storage_key, &json) {
            warn!(
                storage_key = %self.storage_key,
                err = %e,
                "failed to persist survey answers"
            );
        }
    }

    /// Required question ids without a non-empty answer, in declaration order.
    pub fn missing_required(&self) -> Vec<String> {
        self.questionnaire
            .required_ids()
            .filter(|id| !self.responses.is_answered(id))
            .map(str::to_owned)
            .collect()
    }

    /// The required question the respondent should be sent to first.
    pub fn first_missing_required(&self) -> Option<String> {
        self.missing_required().into_iter().next()
    }

    pub fn section_completion(&self, section: &str) -> SectionProgress {
        let (answered, total) = self
            .questionnaire
            .section_questions(section)
            .filter(|q| q.required)
            .fold((0, 0), |(answered, total), q| {
                let done = usize::from(self.responses.is_answered(&q.id));
                (answered + done, total + 1)
            });
        SectionProgress::new(answered, total)
    }

    /// Progress for every section, in section order.
    pub fn sections_completion(&self) -> Vec<(String, SectionProgress)> {
        self.questionnaire
            .sections()
            .into_iter()
            .map(|s| (s.to_owned(), self.section_completion(s)))
            .collect()
    }

    pub fn overall_completion(&self) -> SectionProgress {
        let total = self.questionnaire.required_ids().count();
        let missing = self.missing_required().len();
        SectionProgress::new(total - missing, total)
    }

    /// Validate and, when everything required is present, send one submission.
    ///
    /// Consent is checked first, then required answers. On a failed request
    /// the answers are kept as they were for a retry.
    pub fn submit<T: Transport + ?Sized>(
        &mut self,
        email: Option<&str>,
        consent: bool,
        transport: &T,
        target: &SubmitTarget,
    ) -> SubmitOutcome {
        if self.state == SubmitState::Sending {
            warn!("submission already in flight; ignoring");
            return SubmitOutcome::AlreadySending;
        }
        if !consent {
            info!("submission blocked: consent not given");
            return SubmitOutcome::ConsentRequired;
        }

        self.submitted = true;

        let missing = self.missing_required();
        if let Some(first) = missing.first().cloned() {
            info!(
                missing_count = missing.len(),
                first_missing = %first,
                "submission blocked: required questions unanswered"
            );
            return SubmitOutcome::MissingRequired { first, missing };
        }

        let payload = self.build_payload(email, consent);
        self.state = SubmitState::Sending;
        info!(
            endpoint = %target.endpoint,
            answer_count = payload.responses.len(),
            duration_ms = payload.meta.duration_ms,
            "submitting survey"
        );

        self.state = match transport.post(target, &payload) {
            Ok(()) => {
                info!(endpoint = %target.endpoint, "survey submitted");
                SubmitState::Ok
            }
            Err(e) => {
                error!(endpoint = %target.endpoint, err = %e, "survey submission failed");
                SubmitState::Error
            }
        };
        SubmitOutcome::Sent(self.state)
    }

    /// Snapshot the current answers into a payload.
    pub fn build_payload(&self, email: Option<&str>, consent: bool) -> SubmissionPayload {
        let duration_ms = u64::try_from(self.opened_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        SubmissionPayload {
            email: email
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_owned),
            consent,
            responses: self.responses.clone(),
            meta: SubmissionMeta {
                collected_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                duration_ms,
                user_agent: self.context.user_agent.clone(),
                language: self.context.language.clone(),
                tester: self.attribution.tester.clone(),
                cohort: self.attribution.cohort.clone(),
                source: self.attribution.source.clone(),
            },
        }
    }

    /// Clear everything after confirmation. Returns `false` when declined.
    pub fn reset<C: Confirm + ?Sized>(&mut self, confirm: &mut C) -> bool {
        if !confirm.confirm(RESET_CONFIRMATION) {
            debug!("reset declined");
            return false;
        }
        self.responses.clear();
        self.touched.clear();
        self.submitted = false;
        self.state = SubmitState::Idle;
        if let Err(e) = self.storage.remove(&self.storage_key) {
            warn!(
                storage_key = %self.storage_key,
                err = %e,
                "failed to remove persisted survey answers"
            );
        }
        info!(storage_key = %self.storage_key, "survey form reset");
        true
    }
}

/// Read the persisted response set. Missing, unreadable or malformed records
/// all yield `None`. Inside a well-formed object, entries whose value is not
/// a string are skipped.
fn load_responses<S: Storage>(storage: &S, key: &str) -> Option<ResponseSet> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(storage_key = %key, err = %e, "ignoring unreadable survey answers");
            return None;
        }
    };
    let record = match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(other) => {
            warn!(storage_key = %key, found = json_kind(&other), "ignoring malformed survey answers");
            return None;
        }
        Err(e) => {
            warn!(storage_key = %key, err = %e, "ignoring malformed survey answers");
            return None;
        }
    };

    let mut skipped = Vec::new();
    let responses = record
        .into_iter()
        .filter_map(|(id, value)| match value {
            serde_json::Value::String(v) => Some((id, v)),
            _ => {
                skipped.push(id);
                None
            }
        })
        .collect::<ResponseSet>();
    if !skipped.is_empty() {
        warn!(storage_key = %key, ?skipped, "skipped persisted answers that are not strings");
    }
    Some(responses)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::error::SurveyError;
    use crate::question::tests::three_question_set;
    use crate::storage::{FileStorage, MemoryStorage};

    const KEY: &str = "test_survey_v1";

    /// Records every payload; answers with a fixed result.
    struct RecordingTransport {
        sent: RefCell<Vec<SubmissionPayload>>,
        fail_with: Option<u16>,
    }

    impl RecordingTransport {
        fn accepting() -> Self {
            Self {
                sent: RefCell::new(Vec::new()),
                fail_with: None,
            }
        }

        fn rejecting(status: u16) -> Self {
            Self {
                sent: RefCell::new(Vec::new()),
                fail_with: Some(status),
            }
        }

        fn count(&self) -> usize {
            self.sent.borrow().len()
        }
    }

    impl Transport for RecordingTransport {
        fn post(
            &self,
            target: &SubmitTarget,
            payload: &SubmissionPayload,
        ) -> Result<(), SurveyError> {
            self.sent.borrow_mut().push(payload.clone());
            match self.fail_with {
                None => Ok(()),
                Some(status) => Err(SurveyError::SubmitRejected {
                    endpoint: target.endpoint.clone(),
                    status,
                }),
            }
        }
    }

    /// Storage whose writes and removals always fail.
    struct BrokenStorage;

    impl Storage for BrokenStorage {
        fn get(&self, key: &str) -> Result<Option<String>, SurveyError> {
            Err(SurveyError::StorageReadFailed {
                key: key.to_owned(),
                detail: "unavailable".into(),
            })
        }
        fn set(&self, key: &str, _value: &str) -> Result<(), SurveyError> {
            Err(SurveyError::StorageWriteFailed {
                key: key.to_owned(),
                detail: "quota exceeded".into(),
            })
        }
        fn remove(&self, key: &str) -> Result<(), SurveyError> {
            Err(SurveyError::StorageRemoveFailed {
                key: key.to_owned(),
                detail: "unavailable".into(),
            })
        }
    }

    fn context() -> SessionContext {
        SessionContext {
            query: Some("?tester=ana&cohort=beta".into()),
            user_agent: "survey-test/1.0".into(),
            language: "en-US".into(),
        }
    }

    fn form(storage: &MemoryStorage) -> SurveyForm<&MemoryStorage> {
        SurveyForm::initialize(three_question_set(), storage, KEY, context())
    }

    fn target() -> SubmitTarget {
        SubmitTarget::new("https://example.test/survey")
    }

    fn always(answer: bool) -> impl FnMut(&str) -> bool {
        move |_| answer
    }

    #[test]
    fn starts_empty_without_persisted_state() {
        let storage = MemoryStorage::new();
        let f = form(&storage);
        assert!(f.responses().is_empty());
        assert_eq!(f.state(), SubmitState::Idle);
        assert!(!f.submitted());
        assert_eq!(f.attribution().tester.as_deref(), Some("ana"));
        assert_eq!(f.attribution().cohort.as_deref(), Some("beta"));
        assert_eq!(f.attribution().source, None);
    }

    #[test]
    fn missing_required_is_order_independent() {
        let storage = MemoryStorage::new();
        let mut a = form(&storage);
        a.set_answer("q3", "notes");
        a.set_answer("q2", "c");

        let other = MemoryStorage::new();
        let mut b = form(&other);
        b.set_answer("q2", "d");
        b.set_answer("q3", "more");
        b.set_answer("q2", "c");

        assert_eq!(a.missing_required(), vec!["q1".to_owned()]);
        assert_eq!(a.missing_required(), b.missing_required());
    }

    #[test]
    fn missing_required_matches_final_state_for_every_subset() {
        let ids = ["q1", "q2", "q3"];
        for mask in 0u8..8 {
            let chosen: Vec<&str> = ids
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, id)| *id)
                .collect();
            for reversed in [false, true] {
                let storage = MemoryStorage::new();
                let mut f = form(&storage);
                let order: Vec<&str> = if reversed {
                    chosen.iter().rev().copied().collect()
                } else {
                    chosen.clone()
                };
                for id in order {
                    f.set_answer(id, "x");
                }
                let expected: Vec<String> = ["q1", "q2"]
                    .iter()
                    .filter(|id| !chosen.contains(id))
                    .map(|id| (*id).to_owned())
                    .collect();
                assert_eq!(f.missing_required(), expected, "mask {mask:03b}");
            }
        }
    }

    #[test]
    fn set_answer_accepts_unknown_ids() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("not_a_question", "x");
        assert_eq!(f.responses().get("not_a_question"), Some("x"));
        assert_eq!(f.missing_required(), vec!["q1".to_owned(), "q2".to_owned()]);
    }

    #[test]
    fn whitespace_answer_satisfies_required() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q1", " ");
        f.set_answer("q2", "c");
        assert_eq!(f.responses().get("q1"), Some(" "));
        assert!(f.missing_required().is_empty());
        assert_eq!(f.section_completion("One").percent, 100);
        assert!(!f.shows_required_hint("q1"));
    }

    #[test]
    fn empty_answer_counts_as_missing() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q1", "");
        f.set_answer("q2", "c");
        assert_eq!(f.missing_required(), vec!["q1".to_owned()]);
        assert_eq!(f.section_completion("One").percent, 50);
    }

    #[test]
    fn set_answer_writes_through() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q1", "a");
        assert_eq!(
            storage.get(KEY).unwrap().as_deref(),
            Some(r#"{"q1":"a"}"#)
        );
    }

    #[test]
    fn persist_is_idempotent() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q1", "a");
        f.persist();
        let once = storage.get(KEY).unwrap();
        f.persist();
        assert_eq!(storage.get(KEY).unwrap(), once);
    }

    #[test]
    fn reload_restores_persisted_answers() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q1", "b");
        f.set_answer("q3", "multi\nline");
        let before = f.responses().clone();
        drop(f);

        let reloaded = form(&storage);
        assert_eq!(reloaded.responses(), &before);
    }

    #[test]
    fn reload_from_file_storage() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = SurveyForm::initialize(
            three_question_set(),
            FileStorage::new(dir.path()),
            KEY,
            context(),
        );
        f.set_answer("q2", "d");
        drop(f);

        let reloaded = SurveyForm::initialize(
            three_question_set(),
            FileStorage::new(dir.path()),
            KEY,
            context(),
        );
        assert_eq!(reloaded.responses().get("q2"), Some("d"));
    }

    #[test]
    fn path_like_key_never_writes_outside_storage_dir() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("store");
        let mut f = SurveyForm::initialize(
            three_question_set(),
            FileStorage::new(&inner),
            "../escaped",
            context(),
        );
        f.set_answer("q1", "a");
        assert_eq!(f.responses().get("q1"), Some("a"));
        assert!(!dir.path().join("escaped.json").exists());
        assert!(!inner.exists());
    }

    #[test]
    fn malformed_persisted_state_is_ignored() {
        let storage = MemoryStorage::new();
        storage.set(KEY, "not json {{").unwrap();
        assert!(form(&storage).responses().is_empty());

        storage.set(KEY, r#"["q1","a"]"#).unwrap();
        assert!(form(&storage).responses().is_empty());
    }

    #[test]
    fn non_string_entries_are_skipped_on_load() {
        let storage = MemoryStorage::new();
        storage.set(KEY, r#"{"q1":"a","q2":5,"q3":null}"#).unwrap();
        let f = form(&storage);
        assert_eq!(f.responses().get("q1"), Some("a"));
        assert_eq!(f.responses().get("q2"), None);
        assert_eq!(f.responses().len(), 1);
        assert_eq!(f.missing_required(), vec!["q2".to_owned()]);
    }

    #[test]
    fn retired_question_ids_are_dropped_on_load() {
        let storage = MemoryStorage::new();
        storage.set(KEY, r#"{"q1":"a","retired":"x"}"#).unwrap();
        let f = form(&storage);
        assert_eq!(f.responses().get("q1"), Some("a"));
        assert_eq!(f.responses().get("retired"), None);
    }

    #[test]
    fn separate_keys_do_not_share_state() {
        let storage = MemoryStorage::new();
        let mut a = SurveyForm::initialize(three_question_set(), &storage, "a_v1", context());
        a.set_answer("q1", "a");
        let b = SurveyForm::initialize(three_question_set(), &storage, "b_v1", context());
        assert!(b.responses().is_empty());
    }

    #[test]
    fn storage_failures_are_swallowed() {
        let mut f = SurveyForm::initialize(three_question_set(), BrokenStorage, KEY, context());
        assert!(f.responses().is_empty());
        f.set_answer("q1", "a");
        assert_eq!(f.responses().get("q1"), Some("a"));
        assert!(f.reset(&mut always(true)));
        assert!(f.responses().is_empty());
    }

    #[test]
    fn section_completion_counts_required_only() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        assert_eq!(f.section_completion("One"), SectionProgress::new(0, 2));
        assert_eq!(f.section_completion("One").percent, 0);

        f.set_answer("q1", "a");
        let one = f.section_completion("One");
        assert_eq!((one.answered, one.total, one.percent), (1, 2, 50));

        f.set_answer("q2", "c");
        assert!(f.section_completion("One").is_complete());
        assert_eq!(f.section_completion("One").percent, 100);
    }

    #[test]
    fn section_without_required_questions_is_complete() {
        let storage = MemoryStorage::new();
        let f = form(&storage);
        let two = f.section_completion("Two");
        assert_eq!((two.answered, two.total, two.percent), (0, 0, 100));
        let unknown = f.section_completion("No such section");
        assert_eq!(unknown.percent, 100);
    }

    #[test]
    fn section_progress_rounds_to_nearest() {
        for n in 1..=12usize {
            for k in 0..=n {
                let expected = ((100 * k) as f64 / n as f64).round() as u8;
                assert_eq!(SectionProgress::new(k, n).percent, expected, "{k}/{n}");
            }
        }
        assert_eq!(SectionProgress::new(1, 3).percent, 33);
        assert_eq!(SectionProgress::new(2, 3).percent, 67);
    }

    #[test]
    fn sections_and_overall_completion() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q2", "c");
        let sections = f.sections_completion();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].0, "One");
        assert_eq!(sections[0].1.percent, 50);
        assert_eq!(sections[1].1.percent, 100);
        assert_eq!(f.overall_completion(), SectionProgress::new(1, 2));
    }

    #[test]
    fn submit_without_consent_sends_nothing() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q1", "a");
        f.set_answer("q2", "c");
        let transport = RecordingTransport::accepting();

        let outcome = f.submit(None, false, &transport, &target());

        assert_eq!(outcome, SubmitOutcome::ConsentRequired);
        assert_eq!(transport.count(), 0);
        assert_eq!(f.state(), SubmitState::Idle);
    }

    #[test]
    fn submit_with_missing_required_sends_nothing() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q1", "a");
        let transport = RecordingTransport::accepting();

        let outcome = f.submit(None, true, &transport, &target());

        assert_eq!(
            outcome,
            SubmitOutcome::MissingRequired {
                first: "q2".into(),
                missing: vec!["q2".into()],
            }
        );
        assert_eq!(transport.count(), 0);
        assert_eq!(f.missing_required(), vec!["q2".to_owned()]);
        assert!(f.submitted(), "inline hints become visible");
        assert!(f.shows_required_hint("q2"));
        assert!(!f.shows_required_hint("q1"));
    }

    #[test]
    fn first_missing_follows_declaration_order() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q3", "text");
        f.set_answer("q2", "c");
        f.clear_answer("q2");
        assert_eq!(f.first_missing_required().as_deref(), Some("q1"));
        let transport = RecordingTransport::accepting();
        match f.submit(None, true, &transport, &target()) {
            SubmitOutcome::MissingRequired { first, missing } => {
                assert_eq!(first, "q1");
                assert_eq!(missing, vec!["q1".to_owned(), "q2".to_owned()]);
            }
            other => panic!("expected MissingRequired, got {other:?}"),
        }
    }

    #[test]
    fn submit_sends_exactly_one_request_with_answered_only() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q1", "a");
        f.set_answer("q2", "d");
        let transport = RecordingTransport::accepting();

        let outcome = f.submit(Some(" tester@example.com "), true, &transport, &target());

        assert_eq!(outcome, SubmitOutcome::Sent(SubmitState::Ok));
        assert_eq!(f.state(), SubmitState::Ok);
        assert_eq!(transport.count(), 1);

        let sent = transport.sent.borrow();
        let body = serde_json::to_value(&sent[0]).unwrap();
        assert_eq!(body["responses"], serde_json::json!({"q1": "a", "q2": "d"}));
        assert_eq!(body["email"], "tester@example.com");
        assert_eq!(body["consent"], true);
        assert_eq!(body["meta"]["tester"], "ana");
        assert_eq!(body["meta"]["cohort"], "beta");
        assert_eq!(body["meta"]["source"], serde_json::Value::Null);
        assert_eq!(body["meta"]["userAgent"], "survey-test/1.0");
        assert_eq!(body["meta"]["language"], "en-US");
        let collected = body["meta"]["collectedAt"].as_str().unwrap();
        assert!(
            chrono::DateTime::parse_from_rfc3339(collected).is_ok(),
            "bad timestamp {collected}"
        );
        assert!(body["meta"]["durationMs"].is_u64());
    }

    #[test]
    fn blank_email_is_sent_as_null() {
        let storage = MemoryStorage::new();
        let f = form(&storage);
        assert_eq!(f.build_payload(Some("   "), true).email, None);
        assert_eq!(f.build_payload(None, true).email, None);
    }

    #[test]
    fn failed_submission_keeps_answers() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q1", "b");
        f.set_answer("q2", "c");
        f.set_answer("q3", "keep me");
        let before = f.responses().clone();
        let transport = RecordingTransport::rejecting(503);

        let outcome = f.submit(None, true, &transport, &target());

        assert_eq!(outcome, SubmitOutcome::Sent(SubmitState::Error));
        assert_eq!(f.state(), SubmitState::Error);
        assert_eq!(f.responses(), &before);
        assert!(f.submitted());
        assert!(storage.get(KEY).unwrap().is_some());
    }

    #[test]
    fn resubmit_after_error_reenters_sending() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q1", "a");
        f.set_answer("q2", "c");

        f.submit(None, true, &RecordingTransport::rejecting(500), &target());
        assert_eq!(f.state(), SubmitState::Error);

        let ok = RecordingTransport::accepting();
        assert_eq!(
            f.submit(None, true, &ok, &target()),
            SubmitOutcome::Sent(SubmitState::Ok)
        );
        assert_eq!(ok.count(), 1);
    }

    #[test]
    fn submit_is_ignored_while_sending() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q1", "a");
        f.set_answer("q2", "c");
        f.state = SubmitState::Sending;
        let transport = RecordingTransport::accepting();

        assert_eq!(
            f.submit(None, true, &transport, &target()),
            SubmitOutcome::AlreadySending
        );
        assert_eq!(transport.count(), 0);
    }

    #[test]
    fn reset_clears_everything_once_confirmed() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q1", "a");
        f.set_answer("q3", "x");
        f.mark_touched("q2");
        f.submit(None, true, &RecordingTransport::accepting(), &target());

        let mut asked = Vec::new();
        let confirmed = f.reset(&mut |msg: &str| {
            asked.push(msg.to_owned());
            true
        });

        assert!(confirmed);
        assert_eq!(asked, vec![RESET_CONFIRMATION.to_owned()]);
        assert!(f.responses().is_empty());
        assert!(!f.is_touched("q2"));
        assert!(!f.submitted());
        assert_eq!(f.state(), SubmitState::Idle);
        assert_eq!(f.missing_required(), vec!["q1".to_owned(), "q2".to_owned()]);
        assert_eq!(storage.get(KEY).unwrap(), None);
    }

    #[test]
    fn reset_declined_changes_nothing() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q1", "a");
        f.mark_touched("q1");

        assert!(!f.reset(&mut always(false)));
        assert_eq!(f.responses().get("q1"), Some("a"));
        assert!(f.is_touched("q1"));
        assert!(storage.get(KEY).unwrap().is_some());
    }

    #[test]
    fn touched_drives_hint_before_submit() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        assert!(!f.shows_required_hint("q1"));
        f.mark_touched("q1");
        assert!(f.shows_required_hint("q1"));
        assert!(!f.shows_required_hint("q3"), "optional never hints");
        f.set_answer("q1", "a");
        assert!(!f.shows_required_hint("q1"));
    }

    #[test]
    fn clear_answer_removes_and_persists() {
        let storage = MemoryStorage::new();
        let mut f = form(&storage);
        f.set_answer("q3", "x");
        f.clear_answer("q3");
        assert_eq!(f.responses().get("q3"), None);
        assert_eq!(storage.get(KEY).unwrap().as_deref(), Some("{}"));
    }
}
