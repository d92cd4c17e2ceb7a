use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use http::Method;
use serde_json::Value;

use heavyrain_core::{AssertableResponse, AssertionError, ScenarioError, ScenarioFn, Session};

use crate::scenario_yaml::{
    AssertYaml, DetailedAssert, RequestYaml, ScenarioDoc, SimpleAssert, StepYaml,
};

#[derive(Debug, Clone)]
enum Body {
    Text(String),
    Json(Value),
}

#[derive(Debug, Clone)]
enum Check {
    Ok,
    Valid,
    IsJson,
    IsHtml,
    StatusCode(u16),
    Header { name: String, value: String },
    HeaderHas(String),
    ContentType(String),
    BodyHas(String),
    JsonHasKeys(Vec<String>),
    JsonHas { key: String, value: Value },
}

impl Check {
    fn apply(&self, res: &AssertableResponse) -> Result<(), AssertionError> {
        match self {
            Self::Ok => res.assert_ok()?,
            Self::Valid => res.assert_valid()?,
            Self::IsJson => res.assert_is_json()?,
            Self::IsHtml => res.assert_is_html()?,
            Self::StatusCode(code) => res.assert_status_code(*code)?,
            Self::Header { name, value } => res.assert_header(name, value)?,
            Self::HeaderHas(name) => res.assert_header_has(name)?,
            Self::ContentType(ct) => res.assert_content_type(ct)?,
            Self::BodyHas(needle) => res.assert_body_has(needle)?,
            Self::JsonHasKeys(keys) => {
                let keys = keys.iter().map(String::as_str).collect::<Vec<_>>();
                res.assert_json_has_keys(&keys)?
            }
            Self::JsonHas { key, value } => res.assert_json_has(key, value)?,
        };
        Ok(())
    }
}

impl From<AssertYaml> for Check {
    fn from(value: AssertYaml) -> Self {
        match value {
            AssertYaml::Simple(SimpleAssert::Ok) => Self::Ok,
            AssertYaml::Simple(SimpleAssert::Valid) => Self::Valid,
            AssertYaml::Simple(SimpleAssert::IsJson) => Self::IsJson,
            AssertYaml::Simple(SimpleAssert::IsHtml) => Self::IsHtml,
            AssertYaml::Detailed(d) => match d {
                DetailedAssert::StatusCode(code) => Self::StatusCode(code),
                DetailedAssert::Header(h) => Self::Header {
                    name: h.name,
                    value: h.value,
                },
                DetailedAssert::HeaderHas(name) => Self::HeaderHas(name),
                DetailedAssert::ContentType(ct) => Self::ContentType(ct),
                DetailedAssert::BodyHas(needle) => Self::BodyHas(needle),
                DetailedAssert::JsonHasKey(keys) => Self::JsonHasKeys(keys.into_vec()),
                DetailedAssert::JsonHas(j) => Self::JsonHas {
                    key: j.key,
                    value: j.value,
                },
            },
        }
    }
}

#[derive(Debug, Clone)]
struct RequestStep {
    method: Method,
    path: String,
    path_args: Vec<(String, String)>,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    path_tag: Option<String>,
    body: Option<Body>,
    timeout: Option<Duration>,
    checks: Vec<Check>,
}

#[derive(Debug, Clone)]
enum Step {
    Request(RequestStep),
    Wait(Duration),
}

impl Step {
    async fn run(&self, session: &dyn Session) -> Result<(), ScenarioError> {
        match self {
            Self::Wait(d) => {
                session.wait(*d).await;
                Ok(())
            }
            Self::Request(step) => {
                let mut builder = session
                    .with()
                    .method(step.method.clone())
                    .path(step.path.as_str())
                    .headers(step.headers.iter().cloned());
                for (name, value) in &step.path_args {
                    builder = builder.path_arg(name.as_str(), value.as_str());
                }
                for (name, value) in &step.query {
                    builder = builder.query(name.as_str(), value.as_str());
                }
                if let Some(tag) = &step.path_tag {
                    builder = builder.path_tag(tag.as_str());
                }
                if let Some(timeout) = step.timeout {
                    builder = builder.timeout(timeout);
                }
                builder = match &step.body {
                    Some(Body::Text(text)) => builder.body(text.clone()),
                    Some(Body::Json(json)) => builder.json(json),
                    None => builder,
                };

                let res = session.request(builder).await?;
                for check in &step.checks {
                    check.apply(&res)?;
                }
                Ok(())
            }
        }
    }
}

fn parse_method(raw: Option<&str>) -> anyhow::Result<Method> {
    let Some(raw) = raw else {
        return Ok(Method::GET);
    };
    let upper = raw.trim().to_ascii_uppercase();
    Method::from_bytes(upper.as_bytes()).with_context(|| format!("invalid HTTP method `{raw}`"))
}

fn compile_request(request: RequestYaml, asserts: Vec<AssertYaml>) -> anyhow::Result<Step> {
    let body = match (request.body, request.json) {
        (Some(_), Some(_)) => anyhow::bail!("`body` and `json` are mutually exclusive"),
        (Some(text), None) => Some(Body::Text(text)),
        (None, Some(json)) => Some(Body::Json(json)),
        (None, None) => None,
    };

    Ok(Step::Request(RequestStep {
        method: parse_method(request.method.as_deref())?,
        path: request.path,
        path_args: request.path_args.into_iter().collect(),
        query: request.query.into_iter().collect(),
        headers: request.headers.into_iter().collect(),
        path_tag: request.path_tag,
        body,
        timeout: request.timeout.map(|t| t.into_inner()),
        checks: asserts.into_iter().map(Check::from).collect(),
    }))
}

fn compile_step(step: StepYaml) -> anyhow::Result<Step> {
    match (step.request, step.wait) {
        (Some(request), None) => compile_request(request, step.assert),
        (None, Some(wait)) => Ok(Step::Wait(wait.into_inner())),
        _ => anyhow::bail!("expected exactly one of `request` or `wait`"),
    }
}

/// Turns a parsed scenario file into a runnable [`ScenarioFn`].
///
/// Steps run in order; the first failing request or assertion ends the iteration.
pub(crate) fn compile(doc: ScenarioDoc) -> anyhow::Result<ScenarioFn> {
    let steps = doc
        .steps
        .into_iter()
        .enumerate()
        .map(|(idx, step)| compile_step(step).with_context(|| format!("step {}", idx + 1)))
        .collect::<anyhow::Result<Vec<_>>>()?;
    if steps.is_empty() {
        anyhow::bail!("scenario has no steps");
    }
    let steps = Arc::new(steps);

    Ok(heavyrain_core::scenario_fn(move |session| {
        let steps = steps.clone();
        async move {
            for step in steps.iter() {
                step.run(session.as_ref()).await?;
            }
            Ok(())
        }
    }))
}
