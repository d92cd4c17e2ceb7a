use std::collections::BTreeMap;
use std::time::{Duration, UNIX_EPOCH};

use serde::{Serialize, Serializer};

use heavyrain_http::{HttpRequest, HttpResponse, Timing, version_label};

use crate::error::ScenarioError;
use crate::request::PATH_TAG_HEADER;

use super::stats::GroupKey;

const BODY_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub protocol_version: String,
    pub method: String,
    pub uri: String,
    pub path_tag: String,
    pub size: u64,
    pub headers: BTreeMap<String, String>,
}

impl RequestSummary {
    pub fn from_request(req: &HttpRequest) -> Self {
        Self {
            protocol_version: version_label(req.version).to_string(),
            method: req.method.to_string(),
            uri: req.url.clone(),
            path_tag: req
                .header(PATH_TAG_HEADER)
                .map(str::to_string)
                .unwrap_or_else(|| req.path()),
            size: req.body.len() as u64,
            headers: merge_headers(&req.headers),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSummary {
    pub status_code: u16,
    pub reason_phrase: String,
    pub protocol_version: String,
    pub size: u64,
    pub timing: TimingSummary,
    pub headers: BTreeMap<String, String>,
}

impl ResponseSummary {
    pub fn from_response(res: &HttpResponse) -> Self {
        Self {
            status_code: res.status,
            reason_phrase: res.reason_phrase().to_string(),
            protocol_version: version_label(res.version).to_string(),
            size: res.body.len() as u64,
            timing: TimingSummary::from(res.timing),
            headers: merge_headers(&res.headers),
        }
    }
}

/// Transport timing, in seconds since the epoch (`start`) and milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingSummary {
    pub start: f64,
    pub first_byte_ms: f64,
    pub total_ms: f64,
}

impl From<Timing> for TimingSummary {
    fn from(timing: Timing) -> Self {
        Self {
            start: timing
                .started_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default(),
            first_byte_ms: timing.first_byte.as_secs_f64() * 1000.0,
            total_ms: timing.total.as_secs_f64() * 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionInfo {
    pub class: String,
    pub message: String,
    pub code: Option<String>,
    pub previous_message: Option<String>,
}

/// How a recorded exchange or iteration ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    TransportFailure(ExceptionInfo),
    AssertionFailure(ExceptionInfo),
    UncaughtFailure(ExceptionInfo),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn exception(&self) -> Option<&ExceptionInfo> {
        match self {
            Self::Success => None,
            Self::TransportFailure(info)
            | Self::AssertionFailure(info)
            | Self::UncaughtFailure(info) => Some(info),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::TransportFailure(_) => "transport_failure",
            Self::AssertionFailure(_) => "assertion_failure",
            Self::UncaughtFailure(_) => "uncaught_failure",
        }
    }

    pub(crate) fn from_error(err: &ScenarioError) -> Self {
        match err {
            ScenarioError::Request(e) => Self::TransportFailure(transport_info(&e.source)),
            ScenarioError::Assertion(e) => Self::AssertionFailure(ExceptionInfo {
                class: "AssertionError".to_string(),
                message: e.message.clone(),
                code: None,
                previous_message: None,
            }),
            ScenarioError::Uncaught(e) => Self::UncaughtFailure(ExceptionInfo {
                class: e.class.clone(),
                message: e.message.clone(),
                code: None,
                previous_message: e.previous_message.clone(),
            }),
        }
    }
}

pub(crate) fn transport_info(err: &heavyrain_http::Error) -> ExceptionInfo {
    ExceptionInfo {
        class: "RequestError".to_string(),
        message: err.to_string(),
        code: Some(err.transport_error_kind().to_string()),
        previous_message: err.cause_message(),
    }
}

/// One attempted HTTP exchange. Built once by the profiler and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResult {
    pub request: RequestSummary,
    pub response: Option<ResponseSummary>,
    pub outcome: Outcome,
    pub latency: Duration,
}

impl HttpResult {
    pub(crate) fn succeeded(req: &HttpRequest, res: &HttpResponse) -> Self {
        Self {
            request: RequestSummary::from_request(req),
            response: Some(ResponseSummary::from_response(res)),
            outcome: Outcome::Success,
            latency: res.timing.total,
        }
    }

    pub(crate) fn failed_to_send(
        req: &HttpRequest,
        err: &heavyrain_http::Error,
        elapsed: Duration,
    ) -> Self {
        Self {
            request: RequestSummary::from_request(req),
            response: None,
            outcome: Outcome::TransportFailure(transport_info(err)),
            latency: elapsed,
        }
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(&self.request.method, &self.request.path_tag)
    }
}

impl Serialize for HttpResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ResultDocument::new(Some(&self.request), self.response.as_ref(), &self.outcome)
            .serialize(serializer)
    }
}

/// Snapshot of a [`ScenarioError`] that aborted an iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedException {
    pub outcome: Outcome,
    pub request: Option<RequestSummary>,
    pub response: Option<ResponseSummary>,
    pub body_excerpt: Option<String>,
}

impl RecordedException {
    pub fn from_error(err: &ScenarioError) -> Self {
        let (request, response, body_excerpt) = match err {
            ScenarioError::Request(e) => (
                Some(RequestSummary::from_request(&e.request)),
                e.response.as_ref().map(ResponseSummary::from_response),
                None,
            ),
            ScenarioError::Assertion(e) => (
                Some(RequestSummary::from_request(&e.request)),
                Some(ResponseSummary::from_response(&e.response)),
                Some(excerpt(&e.response.body)),
            ),
            ScenarioError::Uncaught(_) => (None, None, None),
        };
        Self {
            outcome: Outcome::from_error(err),
            request,
            response,
            body_excerpt,
        }
    }

    pub fn class(&self) -> &str {
        self.outcome.exception().map_or("", |e| e.class.as_str())
    }

    pub fn message(&self) -> &str {
        self.outcome.exception().map_or("", |e| e.message.as_str())
    }

    /// Aggregation path of the failing request, if the failure had one.
    pub fn path(&self) -> Option<&str> {
        self.request.as_ref().map(|r| r.path_tag.as_str())
    }
}

impl Serialize for RecordedException {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ResultDocument::new(self.request.as_ref(), self.response.as_ref(), &self.outcome)
            .serialize(serializer)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultDocument<'a> {
    request: Option<&'a RequestSummary>,
    response: Option<&'a ResponseSummary>,
    request_exception: Option<&'a ExceptionInfo>,
    uncaught_exception: Option<&'a ExceptionInfo>,
}

impl<'a> ResultDocument<'a> {
    fn new(
        request: Option<&'a RequestSummary>,
        response: Option<&'a ResponseSummary>,
        outcome: &'a Outcome,
    ) -> Self {
        let (request_exception, uncaught_exception) = match outcome {
            Outcome::Success => (None, None),
            Outcome::TransportFailure(info) => (Some(info), None),
            Outcome::AssertionFailure(info) | Outcome::UncaughtFailure(info) => (None, Some(info)),
        };
        Self {
            request,
            response,
            request_exception,
            uncaught_exception,
        }
    }
}

fn merge_headers(headers: &[(String, String)]) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (k, v) in headers {
        merged
            .entry(k.to_ascii_lowercase())
            .and_modify(|cur| {
                cur.push_str(", ");
                cur.push_str(v);
            })
            .or_insert_with(|| v.clone());
    }
    merged
}

fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.into_owned(),
    }
}
