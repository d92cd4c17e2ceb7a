use std::time::{Duration, SystemTime};

use bytes::Bytes;

use crate::util::find_header;

/// Timing captured by the transport for a single exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Wall clock time the request was handed to the connection pool.
    pub started_at: SystemTime,
    /// Time until the response head arrived.
    pub first_byte: Duration,
    /// Time until the full body was read.
    pub total: Duration,
}

impl Timing {
    #[must_use]
    pub fn new(started_at: SystemTime, first_byte: Duration, total: Duration) -> Self {
        Self {
            started_at,
            first_byte,
            total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub version: http::Version,
    pub body: Bytes,
    /// Response headers (lowercased header names). Multiple values are joined with ", ".
    pub headers: Vec<(String, String)>,
    pub timing: Timing,
}

impl HttpResponse {
    pub fn body_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Canonical reason phrase for the status code, empty when unknown.
    pub fn reason_phrase(&self) -> &'static str {
        http::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub version: http::Version,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            version: http::Version::HTTP_11,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(http::Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: Bytes) -> Self {
        Self {
            body,
            ..Self::new(http::Method::POST, url)
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Sets `name`, replacing any existing value regardless of case.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// URL path component, or the raw URL when it does not parse.
    pub fn path(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => self.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_header_replaces_case_insensitively() {
        let req = HttpRequest::get("http://localhost/a")
            .with_header("Accept", "text/plain")
            .with_header("accept", "application/json");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header("ACCEPT"), Some("application/json"));
    }

    #[test]
    fn path_strips_query() {
        let req = HttpRequest::get("http://localhost:8080/users/1?x=2");
        assert_eq!(req.path(), "/users/1");
    }

    #[test]
    fn reason_phrase_for_unknown_status_is_empty() {
        let res = HttpResponse {
            status: 599,
            version: http::Version::HTTP_11,
            body: Bytes::new(),
            headers: Vec::new(),
            timing: Timing::new(SystemTime::UNIX_EPOCH, Duration::ZERO, Duration::ZERO),
        };
        assert_eq!(res.reason_phrase(), "");
    }
}
