use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;

/// A scenario file: run options plus the ordered steps of one iteration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ScenarioDoc {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub options: OptionsYaml,

    pub steps: Vec<StepYaml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct OptionsYaml {
    /// once | sync | concurrent
    pub runner: Option<String>,
    pub users: Option<u64>,
    pub iterations: Option<u64>,
    pub duration: Option<YamlDuration>,
    pub ramp_up: Option<YamlDuration>,

    // Plain seconds; range checks happen when the executor config is built.
    pub timeout: Option<f64>,
    pub wait_after_request: Option<f64>,
    pub wait_after_scenario: Option<f64>,

    pub verify_tls: Option<bool>,
    pub user_agent: Option<String>,

    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct StepYaml {
    #[serde(default)]
    pub request: Option<RequestYaml>,

    #[serde(default)]
    pub assert: Vec<AssertYaml>,

    #[serde(default)]
    pub wait: Option<YamlDuration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RequestYaml {
    #[serde(default)]
    pub method: Option<String>,

    pub path: String,

    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub path_args: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub query: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub path_tag: Option<String>,

    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub json: Option<serde_json::Value>,

    #[serde(default)]
    pub timeout: Option<YamlDuration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum SimpleAssert {
    Ok,
    IsJson,
    IsHtml,
    Valid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct HeaderAssertYaml {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct JsonHasYaml {
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum DetailedAssert {
    StatusCode(u16),
    Header(HeaderAssertYaml),
    HeaderHas(String),
    ContentType(String),
    BodyHas(String),
    JsonHasKey(OneOrMany),
    JsonHas(JsonHasYaml),
}

/// `- ok` or `- statusCode: 201`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum AssertYaml {
    Simple(SimpleAssert),
    Detailed(DetailedAssert),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let secs = u64::try_from(v).map_err(|_| E::custom("duration must not be negative"))?;
                Ok(YamlDuration(Duration::from_secs(secs)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|_| E::custom("duration must be a non-negative, finite number"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&v)
            }
        }

        deserializer.deserialize_any(V)
    }
}

fn deserialize_scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;

    let raw = Option::<BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();

    for (k, v) in raw.unwrap_or_default() {
        let s = match v {
            serde_yaml::Value::Null => continue,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            _ => return Err(D::Error::custom(format!("value of `{k}` must be a scalar"))),
        };
        out.insert(k, s);
    }

    Ok(out)
}

impl ScenarioDoc {
    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        let doc: Self = serde_yaml::from_slice(bytes)?;
        doc.validate()?;
        Ok(doc)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.steps.is_empty() {
            anyhow::bail!("scenario has no steps");
        }
        for (idx, step) in self.steps.iter().enumerate() {
            let n = idx + 1;
            match (&step.request, &step.wait) {
                (Some(_), Some(_)) => {
                    anyhow::bail!("step {n}: `request` and `wait` are mutually exclusive")
                }
                (None, None) => anyhow::bail!("step {n}: expected `request` or `wait`"),
                (None, Some(_)) if !step.assert.is_empty() => {
                    anyhow::bail!("step {n}: `assert` requires a `request`")
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Display name, falling back to the file stem.
    pub fn display_name(&self, path: &Path) -> String {
        self.name
            .clone()
            .or_else(|| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "scenario".to_string())
    }
}

pub async fn load(path: &Path) -> anyhow::Result<ScenarioDoc> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read scenario: {}", path.display()))?;

    ScenarioDoc::parse(&bytes)
        .with_context(|| format!("failed to parse scenario: {}", path.display()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    const FULL: &str = r#"
name: checkout
options:
  runner: concurrent
  users: 4
  iterations: 20
  duration: 30s
  rampUp: 2
  timeout: 1.5
  waitAfterRequest: 0.1
  verifyTls: false
  userAgent: bot/1
  headers:
    X-Env: ci
    X-Build: 42
steps:
  - request:
      path: /users/{id}
      pathArgs: { id: 7 }
      query: { verbose: true }
    assert:
      - ok
      - isJson
      - statusCode: 200
      - jsonHasKey: [id, name]
      - jsonHas: { key: id, value: 7 }
  - wait: 250ms
  - request:
      method: post
      path: /json
      json: { hello: world }
      timeout: 2s
    assert:
      - header: { name: content-type, value: application/json }
      - bodyHas: hello
"#;

    #[test]
    fn parses_full_document() {
        let doc = ScenarioDoc::parse(FULL.as_bytes()).unwrap();
        assert_eq!(doc.name.as_deref(), Some("checkout"));

        let o = &doc.options;
        assert_eq!(o.runner.as_deref(), Some("concurrent"));
        assert_eq!(o.users, Some(4));
        assert_eq!(o.iterations, Some(20));
        assert_eq!(o.duration, Some(YamlDuration(Duration::from_secs(30))));
        assert_eq!(o.ramp_up, Some(YamlDuration(Duration::from_secs(2))));
        assert_eq!(o.timeout, Some(1.5));
        assert_eq!(o.wait_after_request, Some(0.1));
        assert_eq!(o.verify_tls, Some(false));
        assert_eq!(o.headers.get("X-Build").map(String::as_str), Some("42"));

        assert_eq!(doc.steps.len(), 3);
        let first = doc.steps[0].request.as_ref().unwrap();
        assert_eq!(first.path_args.get("id").map(String::as_str), Some("7"));
        assert_eq!(first.query.get("verbose").map(String::as_str), Some("true"));
        assert_eq!(doc.steps[0].assert.len(), 5);
        assert!(matches!(
            doc.steps[0].assert[0],
            AssertYaml::Simple(SimpleAssert::Ok)
        ));
        assert!(matches!(
            &doc.steps[0].assert[3],
            AssertYaml::Detailed(DetailedAssert::JsonHasKey(OneOrMany::Many(keys))) if keys.len() == 2
        ));

        assert_eq!(
            doc.steps[1].wait,
            Some(YamlDuration(Duration::from_millis(250)))
        );

        let third = doc.steps[2].request.as_ref().unwrap();
        assert_eq!(third.method.as_deref(), Some("post"));
        assert!(third.json.is_some());
        assert_eq!(
            third.timeout.map(YamlDuration::into_inner),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn negative_seconds_are_kept_for_config_validation() {
        let doc = ScenarioDoc::parse(
            b"options:\n  timeout: -1\nsteps:\n  - request: { path: / }\n",
        )
        .unwrap();
        assert_eq!(doc.options.timeout, Some(-1.0));
    }

    #[test]
    fn rejects_empty_steps() {
        let err = ScenarioDoc::parse(b"steps: []\n").unwrap_err();
        assert!(err.to_string().contains("no steps"));
    }

    #[test]
    fn rejects_step_with_request_and_wait() {
        let err =
            ScenarioDoc::parse(b"steps:\n  - request: { path: / }\n    wait: 1s\n").unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn rejects_assert_without_request() {
        let err = ScenarioDoc::parse(b"steps:\n  - wait: 1s\n    assert: [ok]\n").unwrap_err();
        assert!(err.to_string().contains("requires a `request`"));
    }

    #[test]
    fn rejects_unknown_assertion() {
        assert!(ScenarioDoc::parse(b"steps:\n  - request: { path: / }\n    assert: [fast]\n").is_err());
    }

    #[test]
    fn rejects_negative_wait() {
        assert!(ScenarioDoc::parse(b"steps:\n  - wait: -2\n").is_err());
    }

    #[test]
    fn display_name_falls_back_to_file_stem() {
        let doc = ScenarioDoc::parse(b"steps:\n  - wait: 0\n").unwrap();
        assert_eq!(doc.display_name(Path::new("/tmp/smoke.yaml")), "smoke");
    }
}
