use std::any::Any;
use std::fmt::Display;

use heavyrain_http::{HttpRequest, HttpResponse};

use crate::request::RequestBuildError;

/// Anything that aborts one scenario iteration.
///
/// Executors catch every variant at the loop boundary and hand it to the profiler; none of
/// them ends a run.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Assertion(#[from] AssertionError),

    #[error(transparent)]
    Uncaught(#[from] UncaughtError),
}

impl ScenarioError {
    /// Free-form failure raised by scenario code.
    pub fn msg(message: impl Display) -> Self {
        Self::Uncaught(UncaughtError::new(message))
    }
}

impl From<RequestBuildError> for ScenarioError {
    fn from(err: RequestBuildError) -> Self {
        Self::Uncaught(UncaughtError::from_error(&err))
    }
}

impl From<serde_json::Error> for ScenarioError {
    fn from(err: serde_json::Error) -> Self {
        Self::Uncaught(UncaughtError::from_error(&err))
    }
}

/// The HTTP call itself could not complete.
#[derive(Debug, thiserror::Error)]
#[error("{} {} failed: {}", .request.method, .request.url, .source)]
pub struct RequestError {
    pub request: HttpRequest,
    pub response: Option<HttpResponse>,
    #[source]
    pub source: heavyrain_http::Error,
    /// Set when the failure already reached the profiler as a result.
    pub recorded: bool,
}

impl RequestError {
    pub fn new(request: HttpRequest, source: heavyrain_http::Error) -> Self {
        Self {
            request,
            response: None,
            source,
            recorded: false,
        }
    }

    /// Marks a failure that went through the profiling middleware.
    pub fn recorded(mut self) -> Self {
        self.recorded = true;
        self
    }
}

/// A response did not satisfy a scenario assertion.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AssertionError {
    pub request: HttpRequest,
    pub response: HttpResponse,
    pub message: String,
}

/// Any other failure raised from scenario code, including panics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{class}: {message}")]
pub struct UncaughtError {
    pub class: String,
    pub message: String,
    pub previous_message: Option<String>,
}

impl UncaughtError {
    pub fn new(message: impl Display) -> Self {
        Self {
            class: "ScenarioError".to_string(),
            message: message.to_string(),
            previous_message: None,
        }
    }

    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        let full = std::any::type_name::<E>();
        let class = full.rsplit("::").next().unwrap_or(full);
        Self {
            class: class.to_string(),
            message: err.to_string(),
            previous_message: err.source().map(ToString::to_string),
        }
    }

    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "scenario panicked".to_string()
        };
        Self {
            class: "Panic".to_string(),
            message,
            previous_message: None,
        }
    }
}
