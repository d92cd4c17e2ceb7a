use std::time::Duration;

use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("`{field}` must be a non-negative number of seconds, got {value}")]
    InvalidDuration { field: &'static str, value: f64 },

    #[error("invalid base uri `{0}`")]
    InvalidBaseUri(String),

    #[error("base uri must use http or https, got `{0}`")]
    UnsupportedScheme(String),

    #[error("invalid default header `{0}`")]
    InvalidHeader(String),
}

/// Settings shared by every virtual user of a run. Validated once, then read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    base_uri: Url,
    timeout: Duration,
    verify_tls: bool,
    wait_after_request: Duration,
    wait_after_scenario: Duration,
    default_headers: Vec<(String, String)>,
    user_agent: String,
}

impl ExecutorConfig {
    pub fn builder(base_uri: impl Into<String>) -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::new(base_uri)
    }

    pub fn base_uri(&self) -> &Url {
        &self.base_uri
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn verify_tls(&self) -> bool {
        self.verify_tls
    }

    pub fn wait_after_request(&self) -> Duration {
        self.wait_after_request
    }

    pub fn wait_after_scenario(&self) -> Duration {
        self.wait_after_scenario
    }

    pub fn default_headers(&self) -> &[(String, String)] {
        &self.default_headers
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfigBuilder {
    base_uri: String,
    timeout: f64,
    verify_tls: bool,
    wait_after_request: f64,
    wait_after_scenario: f64,
    default_headers: Vec<(String, String)>,
    user_agent: Option<String>,
}

impl ExecutorConfigBuilder {
    fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            timeout: DEFAULT_TIMEOUT.as_secs_f64(),
            verify_tls: true,
            wait_after_request: 0.0,
            wait_after_scenario: 0.0,
            default_headers: Vec::new(),
            user_agent: None,
        }
    }

    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.timeout = secs;
        self
    }

    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn wait_after_request_secs(mut self, secs: f64) -> Self {
        self.wait_after_request = secs;
        self
    }

    pub fn wait_after_scenario_secs(mut self, secs: f64) -> Self {
        self.wait_after_scenario = secs;
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn build(self) -> Result<ExecutorConfig, ConfigError> {
        let base_uri = Url::parse(&self.base_uri)
            .map_err(|_| ConfigError::InvalidBaseUri(self.base_uri.clone()))?;
        if base_uri.scheme() != "http" && base_uri.scheme() != "https" {
            return Err(ConfigError::UnsupportedScheme(self.base_uri));
        }
        if base_uri.cannot_be_a_base() || base_uri.host_str().is_none() {
            return Err(ConfigError::InvalidBaseUri(self.base_uri));
        }

        for (name, value) in &self.default_headers {
            if http::header::HeaderName::from_bytes(name.as_bytes()).is_err()
                || http::header::HeaderValue::from_str(value).is_err()
            {
                return Err(ConfigError::InvalidHeader(format!("{name}: {value}")));
            }
        }

        Ok(ExecutorConfig {
            base_uri,
            timeout: secs("timeout", self.timeout)?,
            verify_tls: self.verify_tls,
            wait_after_request: secs("wait_after_request", self.wait_after_request)?,
            wait_after_scenario: secs("wait_after_scenario", self.wait_after_scenario)?,
            default_headers: self.default_headers,
            user_agent: self
                .user_agent
                .unwrap_or_else(|| format!("heavyrain/{}", env!("CARGO_PKG_VERSION"))),
        })
    }
}

fn secs(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidDuration { field, value })
}
