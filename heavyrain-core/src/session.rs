use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use serde_json::Value;

use heavyrain_http::{ClientOptions, HttpClient, HttpRequest, Transport};

use crate::cancel::CancellationToken;
use crate::config::ExecutorConfig;
use crate::error::{RequestError, ScenarioError};
use crate::middleware::{
    DefaultHeaders, Pipeline, ProfilingMiddleware, RequestId, WaitAfterResponse,
};
use crate::profiler::HttpProfiler;
use crate::request::RequestBuilder;
use crate::response::AssertableResponse;

pub type ScenarioFuture = Pin<Box<dyn Future<Output = Result<(), ScenarioError>> + Send>>;

/// A scenario: one simulated user journey, run once per iteration.
pub type ScenarioFn = Arc<dyn Fn(Arc<dyn Session>) -> ScenarioFuture + Send + Sync>;

/// Boxes an async closure into a [`ScenarioFn`].
///
/// ```ignore
/// let scenario = scenario_fn(|s| async move {
///     s.get("/").await?.assert_ok()?;
///     Ok(())
/// });
/// ```
pub fn scenario_fn<F, Fut>(f: F) -> ScenarioFn
where
    F: Fn(Arc<dyn Session>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ScenarioError>> + Send + 'static,
{
    Arc::new(move |session| Box::pin(f(session)))
}

/// What a scenario can do: send requests, wait, and check responses.
#[async_trait]
pub trait Session: Send + Sync {
    /// A fresh request builder rooted at the base uri.
    fn with(&self) -> RequestBuilder;

    async fn send(&self, request: HttpRequest) -> Result<AssertableResponse, ScenarioError>;

    async fn wait(&self, duration: Duration);

    async fn request(&self, builder: RequestBuilder) -> Result<AssertableResponse, ScenarioError> {
        let request = builder.build()?;
        self.send(request).await
    }

    /// Sends the request and fails the iteration unless the status is ok.
    async fn request_with_options(
        &self,
        builder: RequestBuilder,
    ) -> Result<AssertableResponse, ScenarioError> {
        let response = self.request(builder).await?;
        response.assert_ok()?;
        Ok(response)
    }

    async fn get(&self, path: &str) -> Result<AssertableResponse, ScenarioError> {
        self.request(self.with().path(path)).await
    }

    async fn get_json(&self, path: &str) -> Result<AssertableResponse, ScenarioError> {
        self.request(self.with().path(path).accept_json()).await
    }

    async fn post(&self, path: &str, body: Bytes) -> Result<AssertableResponse, ScenarioError> {
        self.request(self.with().method(Method::POST).path(path).body(body))
            .await
    }

    async fn post_json(
        &self,
        path: &str,
        json: &Value,
    ) -> Result<AssertableResponse, ScenarioError> {
        self.request(self.with().method(Method::POST).path(path).json(json))
            .await
    }

    async fn put(&self, path: &str, body: Bytes) -> Result<AssertableResponse, ScenarioError> {
        self.request(self.with().method(Method::PUT).path(path).body(body))
            .await
    }

    async fn put_json(&self, path: &str, json: &Value) -> Result<AssertableResponse, ScenarioError> {
        self.request(self.with().method(Method::PUT).path(path).json(json))
            .await
    }

    async fn patch(&self, path: &str, body: Bytes) -> Result<AssertableResponse, ScenarioError> {
        self.request(self.with().method(Method::PATCH).path(path).body(body))
            .await
    }

    async fn patch_json(
        &self,
        path: &str,
        json: &Value,
    ) -> Result<AssertableResponse, ScenarioError> {
        self.request(self.with().method(Method::PATCH).path(path).json(json))
            .await
    }

    async fn delete(&self, path: &str) -> Result<AssertableResponse, ScenarioError> {
        self.request(self.with().method(Method::DELETE).path(path))
            .await
    }

    async fn delete_json(&self, path: &str) -> Result<AssertableResponse, ScenarioError> {
        self.request(self.with().method(Method::DELETE).path(path).accept_json())
            .await
    }

    async fn wait_secs(&self, secs: u64) {
        self.wait(Duration::from_secs(secs)).await;
    }

    async fn wait_millis(&self, millis: u64) {
        self.wait(Duration::from_millis(millis)).await;
    }
}

/// The session handed to scenarios: a base request plus one worker's middleware pipeline.
/// Waits end early once the run's token is cancelled.
#[derive(Debug, Clone)]
pub struct Client {
    base: RequestBuilder,
    pipeline: Pipeline,
    token: CancellationToken,
}

impl Client {
    pub fn new(base: RequestBuilder, pipeline: Pipeline, token: CancellationToken) -> Self {
        Self {
            base,
            pipeline,
            token,
        }
    }
}

#[async_trait]
impl Session for Client {
    fn with(&self) -> RequestBuilder {
        self.base.clone()
    }

    async fn send(&self, request: HttpRequest) -> Result<AssertableResponse, ScenarioError> {
        match self.pipeline.handle(request.clone()).await {
            Ok(response) => Ok(AssertableResponse::new(request, response)),
            Err(source) => Err(RequestError::new(request, source).recorded().into()),
        }
    }

    async fn wait(&self, duration: Duration) {
        self.token.sleep(duration).await;
    }
}

/// Builds one [`Client`] per virtual user.
///
/// Clients share the profiler and the transport's connection pool; everything else,
/// including the pipeline, belongs to the client.
#[derive(Clone)]
pub struct SessionFactory {
    config: Arc<ExecutorConfig>,
    profiler: Arc<HttpProfiler>,
    transport: Arc<dyn Transport>,
}

impl SessionFactory {
    /// Uses a pooled [`HttpClient`] honouring the config's TLS setting.
    pub fn new(
        config: Arc<ExecutorConfig>,
        profiler: Arc<HttpProfiler>,
    ) -> heavyrain_http::Result<Self> {
        let client = HttpClient::new(ClientOptions {
            verify_tls: config.verify_tls(),
            ..ClientOptions::default()
        })?;
        Ok(Self::with_transport(config, profiler, Arc::new(client)))
    }

    pub fn with_transport(
        config: Arc<ExecutorConfig>,
        profiler: Arc<HttpProfiler>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            profiler,
            transport,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn profiler(&self) -> &Arc<HttpProfiler> {
        &self.profiler
    }

    /// Pipeline order: default headers, request id, profiling, wait-after-response, transport.
    pub fn create(&self, client_id: u64, token: &CancellationToken) -> Client {
        let mut defaults = self.config.default_headers().to_vec();
        defaults.push(("User-Agent".to_string(), self.config.user_agent().to_string()));

        let pipeline = Pipeline::new(self.transport.clone())
            .with(DefaultHeaders::new(defaults))
            .with(RequestId::new(format!("vu{client_id}")))
            .with(ProfilingMiddleware::new(self.profiler.clone()))
            .with(WaitAfterResponse::new(
                self.config.wait_after_request(),
                token.clone(),
            ));

        let mut base = RequestBuilder::new(self.config.base_uri().clone());
        // A zero timeout leaves requests unbounded.
        if !self.config.timeout().is_zero() {
            base = base.timeout(self.config.timeout());
        }

        Client::new(base, pipeline, token.clone())
    }
}

impl fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFactory")
            .field("config", &self.config)
            .field("profiler", &self.profiler)
            .finish_non_exhaustive()
    }
}
