#![forbid(unsafe_code)]

mod cancel;
mod config;
mod error;
mod executor;
mod middleware;
mod profiler;
mod request;
mod response;
mod session;

pub use cancel::CancellationToken;
pub use config::{ConfigError, DEFAULT_TIMEOUT, ExecutorConfig, ExecutorConfigBuilder};
pub use error::{AssertionError, RequestError, ScenarioError, UncaughtError};
pub use executor::{
    ConcurrentExecutor, ExecutionSummary, Executor, ExecutorKind, IterationGate, OnceExecutor, RunPlan,
    RunPlanError, SyncExecutor, build_executor,
};
pub use middleware::{
    DefaultHeaders, Middleware, Next, Pipeline, ProfilingMiddleware, REQUEST_ID_HEADER, RequestId,
    WaitAfterResponse,
};
pub use profiler::{
    AggregatedStats, ExceptionInfo, GroupKey, GroupStats, HttpProfiler, HttpResult, Outcome,
    RecordedException, RequestSummary, ResponseSummary, TimingSummary,
};
pub use request::{PATH_TAG_HEADER, RequestBuildError, RequestBuilder};
pub use response::AssertableResponse;
pub use session::{Client, ScenarioFn, ScenarioFuture, Session, SessionFactory, scenario_fn};

pub use heavyrain_http::{
    ClientOptions, HttpClient, HttpRequest, HttpResponse, HttpTransportErrorKind, Timing,
    Transport,
};
