use std::time::Duration;

use base64::Engine as _;
use bytes::Bytes;
use http::Method;
use url::Url;

use heavyrain_http::HttpRequest;

/// Header carrying the route template a request is aggregated under.
pub const PATH_TAG_HEADER: &str = "Path-Tag";

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestBuildError {
    #[error("path argument `{name}` has no matching placeholder in `{path}`")]
    UndefinedPathArg { name: String, path: String },

    #[error("path `{0}` has placeholders without a value")]
    UnresolvedPathArg(String),

    #[error("cannot build a url from `{0}`")]
    InvalidUrl(String),
}

/// Immutable-style request builder. Every setter consumes and returns the builder, so a
/// shared base can be cloned freely without one request leaking state into the next.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    base_uri: Url,
    method: Method,
    path: String,
    path_args: Vec<(String, String)>,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    path_tag: Option<String>,
    body: Bytes,
    timeout: Option<Duration>,
}

impl RequestBuilder {
    pub fn new(base_uri: Url) -> Self {
        Self {
            base_uri,
            method: Method::GET,
            path: "/".to_string(),
            path_args: Vec::new(),
            query: Vec::new(),
            headers: Vec::new(),
            path_tag: None,
            body: Bytes::new(),
            timeout: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Path relative to the base uri. May contain `{name}` placeholders.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn path_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_args.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Sets a header, replacing an earlier value with the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        headers
            .into_iter()
            .fold(self, |builder, (k, v)| builder.header(k, v))
    }

    /// Overrides the aggregation key. Defaults to the path template.
    pub fn path_tag(mut self, tag: impl Into<String>) -> Self {
        self.path_tag = Some(tag.into());
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    pub fn basic(self, user: &str, password: &str) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
        self.header("Authorization", format!("Basic {encoded}"))
    }

    pub fn accept(self, value: impl Into<String>) -> Self {
        self.header("Accept", value)
    }

    pub fn accept_json(self) -> Self {
        self.accept(JSON_CONTENT_TYPE)
    }

    pub fn content_type(self, value: impl Into<String>) -> Self {
        self.header("Content-Type", value)
    }

    pub fn user_agent(self, value: impl Into<String>) -> Self {
        self.header("User-Agent", value)
    }

    /// Raw body. Content-Type falls back to `text/plain` when none was set.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        if self.has_header("content-type") {
            self
        } else {
            self.content_type(TEXT_CONTENT_TYPE)
        }
    }

    pub fn json(mut self, value: &serde_json::Value) -> Self {
        self.body = Bytes::from(value.to_string());
        self.content_type(JSON_CONTENT_TYPE).accept_json()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    pub fn build(self) -> Result<HttpRequest, RequestBuildError> {
        let template = normalize_path(&self.path);
        let path = substitute_path_args(&template, &self.path_args)?;

        let mut url = self.base_uri.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base_path}{path}"));
        if url.cannot_be_a_base() {
            return Err(RequestBuildError::InvalidUrl(url.to_string()));
        }
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }

        let mut headers = self.headers;
        if !headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(PATH_TAG_HEADER))
        {
            headers.push((
                PATH_TAG_HEADER.to_string(),
                self.path_tag.unwrap_or(template),
            ));
        }

        Ok(HttpRequest {
            method: self.method,
            version: http::Version::HTTP_11,
            url: url.to_string(),
            headers,
            body: self.body,
            timeout: self.timeout,
        })
    }
}

fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

fn substitute_path_args(
    template: &str,
    args: &[(String, String)],
) -> Result<String, RequestBuildError> {
    for (name, _) in args {
        if !template.contains(&format!("{{{name}}}")) {
            return Err(RequestBuildError::UndefinedPathArg {
                name: name.clone(),
                path: template.to_string(),
            });
        }
    }

    // Single pass over the template so substituted values are never rescanned.
    let mut path = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(len) = rest[open..].find('}') else {
            break;
        };
        let name = &rest[open + 1..open + len];
        let Some((_, value)) = args.iter().find(|(n, _)| n == name) else {
            return Err(RequestBuildError::UnresolvedPathArg(template.to_string()));
        };
        path.push_str(&rest[..open]);
        path.push_str(value);
        rest = &rest[open + len + 1..];
    }
    path.push_str(rest);
    Ok(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn base() -> RequestBuilder {
        RequestBuilder::new(Url::parse("http://localhost:8080").unwrap())
    }

    #[test]
    fn path_args_are_substituted_and_tag_keeps_template() {
        let req = base()
            .path("/users/{id}")
            .path_arg("id", "42")
            .build()
            .unwrap();
        assert_eq!(req.url, "http://localhost:8080/users/42");
        assert_eq!(req.header(PATH_TAG_HEADER), Some("/users/{id}"));
    }

    #[test]
    fn unknown_path_arg_fails() {
        let err = base().path("/users").path_arg("id", "1").build().unwrap_err();
        assert_eq!(
            err,
            RequestBuildError::UndefinedPathArg {
                name: "id".to_string(),
                path: "/users".to_string()
            }
        );
    }

    #[test]
    fn missing_path_arg_fails() {
        assert!(matches!(
            base().path("/users/{id}").build(),
            Err(RequestBuildError::UnresolvedPathArg(_))
        ));
    }

    #[test]
    fn path_arg_values_may_contain_braces() {
        let req = base()
            .path("/search/{q}")
            .path_arg("q", "{x}")
            .build()
            .unwrap();
        assert_eq!(req.header(PATH_TAG_HEADER), Some("/search/{q}"));
        assert!(req.url.starts_with("http://localhost:8080/search/"), "{}", req.url);
        assert!(!req.url.ends_with("{q}"));

        let req = base()
            .path("/{a}/{b}")
            .path_arg("a", "{b}")
            .path_arg("b", "2")
            .build()
            .unwrap();
        assert_eq!(req.url, "http://localhost:8080/%7Bb%7D/2");
    }

    #[test]
    fn explicit_path_tag_wins() {
        let req = base().path("/a").path_tag("custom").build().unwrap();
        assert_eq!(req.header(PATH_TAG_HEADER), Some("custom"));
    }

    #[test]
    fn base_path_and_query_are_joined() {
        let req = RequestBuilder::new(Url::parse("http://localhost/api/").unwrap())
            .path("items")
            .query("page", "2")
            .query("q", "a b")
            .build()
            .unwrap();
        assert_eq!(req.url, "http://localhost/api/items?page=2&q=a+b");
    }

    #[test]
    fn json_sets_body_and_content_negotiation() {
        let req = base()
            .method(Method::POST)
            .json(&serde_json::json!({"a": 1}))
            .build()
            .unwrap();
        assert_eq!(req.body.as_ref(), br#"{"a":1}"#);
        assert_eq!(req.header("content-type"), Some(JSON_CONTENT_TYPE));
        assert_eq!(req.header("accept"), Some(JSON_CONTENT_TYPE));
    }

    #[test]
    fn body_defaults_to_text_plain_without_overriding() {
        let req = base().body("hi").build().unwrap();
        assert_eq!(req.header("content-type"), Some(TEXT_CONTENT_TYPE));

        let req = base()
            .content_type("application/xml")
            .body("<a/>")
            .build()
            .unwrap();
        assert_eq!(req.header("content-type"), Some("application/xml"));
    }

    #[test]
    fn auth_helpers() {
        let req = base().basic("user", "pass").build().unwrap();
        assert_eq!(req.header("authorization"), Some("Basic dXNlcjpwYXNz"));

        let req = base().bearer("t0k").build().unwrap();
        assert_eq!(req.header("authorization"), Some("Bearer t0k"));
    }

    #[test]
    fn clones_do_not_share_state() {
        let shared = base().header("x-a", "1");
        let first = shared.clone().header("x-b", "2").build().unwrap();
        let second = shared.build().unwrap();
        assert!(first.header("x-b").is_some());
        assert!(second.header("x-b").is_none());
    }
}
