use std::sync::OnceLock;

use heavyrain_http::{HttpRequest, HttpResponse};
use serde_json::Value;

use crate::error::AssertionError;

type Assertion<'a> = Result<&'a AssertableResponse, AssertionError>;

/// A response paired with the request that produced it, plus chainable checks.
///
/// Every `assert_*` returns `Ok(&self)` so checks compose with `?`:
///
/// ```ignore
/// session.get("/json").await?.assert_ok()?.assert_json_has_key("hello")?;
/// ```
#[derive(Debug)]
pub struct AssertableResponse {
    request: HttpRequest,
    response: HttpResponse,
    json: OnceLock<Value>,
}

impl AssertableResponse {
    pub fn new(request: HttpRequest, response: HttpResponse) -> Self {
        Self {
            request,
            response,
            json: OnceLock::new(),
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn response(&self) -> &HttpResponse {
        &self.response
    }

    pub fn status(&self) -> u16 {
        self.response.status
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.response.header(name)
    }

    pub fn text(&self) -> Option<&str> {
        self.response.body_utf8()
    }

    pub fn into_parts(self) -> (HttpRequest, HttpResponse) {
        (self.request, self.response)
    }

    fn check(&self, ok: bool, message: impl FnOnce() -> String) -> Assertion<'_> {
        if ok {
            Ok(self)
        } else {
            Err(self.failure(message()))
        }
    }

    fn failure(&self, message: String) -> AssertionError {
        AssertionError {
            request: self.request.clone(),
            response: self.response.clone(),
            message,
        }
    }

    /// Any status from 200 through 399; redirects count as ok.
    pub fn assert_ok(&self) -> Assertion<'_> {
        let actual = self.status();
        self.check((200..=399).contains(&actual), || {
            format!("response code is 200-399, got {actual}")
        })
    }

    pub fn assert_status_code(&self, expected: u16) -> Assertion<'_> {
        let actual = self.status();
        self.check(actual == expected, || {
            format!("response status code is {expected}, got {actual}")
        })
    }

    /// The status line is a real HTTP status.
    pub fn assert_valid(&self) -> Assertion<'_> {
        let actual = self.status();
        self.check((100..=599).contains(&actual), || {
            format!("response should be valid, got status {actual}")
        })
    }

    pub fn assert_header_has(&self, name: &str) -> Assertion<'_> {
        self.check(self.header(name).is_some(), || format!("header has {name}"))
    }

    pub fn assert_header(&self, name: &str, value: &str) -> Assertion<'_> {
        self.assert_header_has(name)?;
        let actual = self.header(name).unwrap_or_default();
        self.check(actual == value, || {
            format!("header {name} is {value}, got {actual}")
        })
    }

    /// Compares media types case-insensitively, ignoring whitespace around `;`.
    pub fn assert_content_type(&self, expected: &str) -> Assertion<'_> {
        let actual = self.header("content-type").unwrap_or_default();
        self.check(
            normalize_content_type(actual) == normalize_content_type(expected),
            || format!("header Content-Type should be {expected}, actual {actual}"),
        )
    }

    pub fn assert_is_json(&self) -> Assertion<'_> {
        self.assert_media_type("application/json")
    }

    pub fn assert_is_html(&self) -> Assertion<'_> {
        self.assert_media_type("text/html")
    }

    fn assert_media_type(&self, expected: &str) -> Assertion<'_> {
        let actual = self.header("content-type").unwrap_or_default();
        let media = actual.split(';').next().unwrap_or_default().trim();
        self.check(media.eq_ignore_ascii_case(expected), || {
            format!("header Content-Type should be {expected}, actual {actual}")
        })
    }

    pub fn assert_body_has(&self, needle: &str) -> Assertion<'_> {
        let found = self.text().is_some_and(|body| body.contains(needle));
        self.check(found, || format!("failed to find {needle} in body"))
    }

    /// Decoded JSON body. Checks the content type first; parsed once per response.
    pub fn json(&self) -> Result<&Value, AssertionError> {
        if let Some(value) = self.json.get() {
            return Ok(value);
        }
        self.assert_is_json()?;
        if self.response.body.is_empty() {
            return Err(self.failure("failed to decode json: empty body".to_string()));
        }
        let value: Value = serde_json::from_slice(&self.response.body)
            .map_err(|err| self.failure(format!("failed to decode json: {err}")))?;
        Ok(self.json.get_or_init(|| value))
    }

    /// `key` is a top-level member name, or a JSON pointer when it starts with `/`.
    pub fn assert_json_has_key(&self, key: &str) -> Assertion<'_> {
        let found = lookup(self.json()?, key).is_some();
        self.check(found, || format!("undefined JSON key={key}"))
    }

    pub fn assert_json_has_keys(&self, keys: &[&str]) -> Assertion<'_> {
        for key in keys {
            self.assert_json_has_key(key)?;
        }
        Ok(self)
    }

    pub fn assert_json_has(&self, key: &str, expected: &Value) -> Assertion<'_> {
        self.assert_json_has_key(key)?;
        let actual = lookup(self.json()?, key).cloned().unwrap_or(Value::Null);
        self.check(&actual == expected, || {
            format!("invalid JSON key={key} value={actual} expected={expected}")
        })
    }
}

fn lookup<'a>(json: &'a Value, key: &str) -> Option<&'a Value> {
    if key.starts_with('/') {
        json.pointer(key)
    } else {
        json.get(key)
    }
}

fn normalize_content_type(value: &str) -> String {
    value
        .split(';')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(";")
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use bytes::Bytes;
    use heavyrain_http::Timing;
    use std::time::{Duration, SystemTime};

    fn response(status: u16, content_type: &str, body: &str) -> AssertableResponse {
        AssertableResponse::new(
            HttpRequest::get("http://localhost/"),
            HttpResponse {
                status,
                version: http::Version::HTTP_11,
                body: Bytes::from(body.to_string()),
                headers: vec![("content-type".to_string(), content_type.to_string())],
                timing: Timing::new(SystemTime::now(), Duration::ZERO, Duration::ZERO),
            },
        )
    }

    #[test]
    fn assert_ok_accepts_redirects() {
        for status in [200, 299, 300, 399] {
            assert!(response(status, "text/plain", "").assert_ok().is_ok(), "{status}");
        }
        for status in [199, 400, 500] {
            let res = response(status, "text/plain", "");
            let err = res.assert_ok().unwrap_err();
            assert_eq!(
                err.message,
                format!("response code is 200-399, got {status}")
            );
            assert_eq!(err.response.status, status);
        }
    }

    #[test]
    fn json_on_html_fails_before_parsing() {
        let res = response(200, "text/html", "{\"looks\": \"like json\"}");
        let err = res.json().unwrap_err();
        assert!(err.message.contains("Content-Type"), "{}", err.message);
    }

    #[test]
    fn json_parse_failure_is_an_assertion() {
        let res = response(200, "application/json", "{nope");
        assert!(res.json().unwrap_err().message.starts_with("failed to decode json"));

        let res = response(200, "application/json", "");
        assert!(res.json().unwrap_err().message.contains("empty body"));
    }

    #[test]
    fn json_is_memoized() {
        let res = response(200, "application/json;charset=UTF-8", r#"{"a": {"b": 2}}"#);
        let first: *const Value = res.json().unwrap();
        let second: *const Value = res.json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn json_key_checks_chain() {
        let res = response(200, "application/json; charset=utf-8", r#"{"a": {"b": 2}, "c": "d"}"#);
        res.assert_ok()
            .unwrap()
            .assert_is_json()
            .unwrap()
            .assert_json_has_keys(&["a", "c", "/a/b"])
            .unwrap()
            .assert_json_has("/a/b", &serde_json::json!(2))
            .unwrap();

        let err = res.assert_json_has_key("zzz").unwrap_err();
        assert_eq!(err.message, "undefined JSON key=zzz");
        let err = res.assert_json_has("c", &serde_json::json!("e")).unwrap_err();
        assert_eq!(err.message, r#"invalid JSON key=c value="d" expected="e""#);
    }

    #[test]
    fn header_assertions() {
        let res = response(200, "text/html; charset=UTF-8", "<!DOCTYPE html>Hello");
        res.assert_header_has("Content-Type").unwrap();
        res.assert_content_type("text/html;charset=utf-8").unwrap();
        res.assert_is_html().unwrap();
        res.assert_body_has("Hello").unwrap();

        let err = res.assert_header("content-type", "text/plain").unwrap_err();
        assert_eq!(
            err.message,
            "header content-type is text/plain, got text/html; charset=UTF-8"
        );
        assert_eq!(
            res.assert_header_has("x-missing").unwrap_err().message,
            "header has x-missing"
        );
    }

    #[test]
    fn status_code_message() {
        let res = response(404, "text/plain", "");
        assert_eq!(
            res.assert_status_code(200).unwrap_err().message,
            "response status code is 200, got 404"
        );
        res.assert_valid().unwrap();
    }
}
