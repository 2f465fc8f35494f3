use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::question::Questionnaire;

/// Answers keyed by question id. A missing key means "unanswered".
///
/// Serialized as a flat JSON object of strings. `BTreeMap` keeps the
/// serialized key order deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseSet {
    answers: BTreeMap<String, String>,
}

impl ResponseSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the answer for `id`.
    pub fn set(&mut self, id: impl Into<String>, value: impl Into<String>) {
        self.answers.insert(id.into(), value.into());
    }

    pub fn remove(&mut self, id: &str) -> Option<String> {
        self.answers.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.answers.get(id).map(String::as_str)
    }

    /// True when `id` has a non-empty answer. Whitespace is an answer.
    pub fn is_answered(&self, id: &str) -> bool {
        self.get(id).is_some_and(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn clear(&mut self) {
        self.answers.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.answers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Drop answers whose id is not in `questionnaire`, returning the dropped ids.
    pub fn retain_known(&mut self, questionnaire: &Questionnaire) -> Vec<String> {
        let stale: Vec<String> = self
            .answers
            .keys()
            .filter(|id| !questionnaire.contains(id))
            .cloned()
            .collect();
        for id in &stale {
            self.answers.remove(id);
        }
        stale
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResponseSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            answers: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Attribution tags read from the page query once per session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribution {
    pub tester: Option<String>,
    pub cohort: Option<String>,
    pub source: Option<String>,
}

impl Attribution {
    /// Parse `tester`, `cohort` and `source` from either a full URL or a bare
    /// query string (leading `?` optional).
    ///
    /// Absent or empty parameters become `None`. When a parameter repeats,
    /// the first occurrence wins.
    pub fn from_query(input: &str) -> Self {
        let input = input.trim();
        let query = match Url::parse(input) {
            Ok(url) => url.query().unwrap_or_default().to_owned(),
            Err(_) => input.strip_prefix('?').unwrap_or(input).to_owned(),
        };

        let mut out = Attribution::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "tester" => &mut out.tester,
                "cohort" => &mut out.cohort,
                "source" => &mut out.source,
                _ => continue,
            };
            if slot.is_none() && !value.trim().is_empty() {
                *slot = Some(value.into_owned());
            }
        }
        out
    }
}
