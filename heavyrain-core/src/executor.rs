use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt as _;

use crate::cancel::CancellationToken;
use crate::error::{ScenarioError, UncaughtError};
use crate::profiler::HttpProfiler;
use crate::session::{ScenarioFn, Session, SessionFactory};

mod concurrent;
mod gate;
mod once;
mod sync;
mod worker;

pub use concurrent::ConcurrentExecutor;
pub use gate::IterationGate;
pub use once::OnceExecutor;
pub use sync::SyncExecutor;

/// Runs a scenario under some strategy until it is done or the token is cancelled.
///
/// `execute` never fails: every scenario error ends up in the profiler.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, token: &CancellationToken) -> ExecutionSummary;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub iterations: u64,
    pub failed_iterations: u64,
}

impl ExecutionSummary {
    fn merge(self, other: Self) -> Self {
        Self {
            iterations: self.iterations + other.iterations,
            failed_iterations: self.failed_iterations + other.failed_iterations,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::VariantNames,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ExecutorKind {
    /// One pass, for smoke-testing a scenario.
    #[default]
    Once,
    /// One worker looping until stopped.
    #[strum(to_string = "sync", serialize = "repeat")]
    Sync,
    /// `users` workers looping in parallel.
    #[strum(to_string = "concurrent", serialize = "async")]
    Concurrent,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunPlanError {
    #[error("`users` must be a positive integer")]
    InvalidUsers,

    #[error("`iterations` must be a positive integer")]
    InvalidIterations,
}

/// How a run is scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub kind: ExecutorKind,
    pub users: u64,
    /// Total iterations across all workers.
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
    /// Spread worker start times over this window (concurrent only).
    pub ramp_up: Option<Duration>,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            kind: ExecutorKind::Once,
            users: 1,
            iterations: None,
            duration: None,
            ramp_up: None,
        }
    }
}

impl RunPlan {
    pub fn validate(&self) -> Result<(), RunPlanError> {
        if self.users == 0 {
            return Err(RunPlanError::InvalidUsers);
        }
        if self.iterations == Some(0) {
            return Err(RunPlanError::InvalidIterations);
        }
        if self.users > 1 && self.kind != ExecutorKind::Concurrent {
            tracing::warn!(
                users = self.users,
                runner = %self.kind,
                "`users` only applies to the concurrent runner; running a single user"
            );
        }
        Ok(())
    }
}

pub fn build_executor(
    plan: &RunPlan,
    scenario: ScenarioFn,
    factory: SessionFactory,
) -> Result<Box<dyn Executor>, RunPlanError> {
    plan.validate()?;
    Ok(match plan.kind {
        ExecutorKind::Once => Box::new(OnceExecutor::new(scenario, factory)),
        ExecutorKind::Sync => Box::new(SyncExecutor::new(
            scenario,
            factory,
            plan.iterations,
            plan.duration,
        )),
        ExecutorKind::Concurrent => Box::new(
            ConcurrentExecutor::new(scenario, factory, plan.users)
                .with_limits(plan.iterations, plan.duration)
                .with_ramp_up(plan.ramp_up),
        ),
    })
}

/// Runs one iteration and records whatever went wrong. Returns true on success.
pub(crate) async fn run_iteration(
    scenario: &ScenarioFn,
    session: Arc<dyn Session>,
    profiler: &HttpProfiler,
) -> bool {
    let outcome = AssertUnwindSafe(async move { scenario(session).await })
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(())) => true,
        // Profiled transport failures are already in the results.
        Ok(Err(ScenarioError::Request(err))) if err.recorded => false,
        Ok(Err(err)) => {
            profiler.record_exception(&err);
            false
        }
        Err(payload) => {
            let err = ScenarioError::Uncaught(UncaughtError::from_panic(payload.as_ref()));
            tracing::warn!(error = %err, "scenario panicked");
            profiler.record_exception(&err);
            false
        }
    }
}


#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::config::ExecutorConfig;
    use crate::error::RequestError;
    use crate::middleware::testing::StubTransport;
    use crate::session::scenario_fn;
    use heavyrain_http::HttpRequest;
    use std::str::FromStr;

    #[test]
    fn kind_parses_names_and_aliases() {
        assert_eq!(ExecutorKind::from_str("once").unwrap(), ExecutorKind::Once);
        assert_eq!(ExecutorKind::from_str("sync").unwrap(), ExecutorKind::Sync);
        assert_eq!(ExecutorKind::from_str("repeat").unwrap(), ExecutorKind::Sync);
        assert_eq!(
            ExecutorKind::from_str("async").unwrap(),
            ExecutorKind::Concurrent
        );
        assert_eq!(
            ExecutorKind::from_str("Concurrent").unwrap(),
            ExecutorKind::Concurrent
        );
        assert!(ExecutorKind::from_str("parallel").is_err());
        assert_eq!(ExecutorKind::Sync.to_string(), "sync");
        assert_eq!(ExecutorKind::Concurrent.to_string(), "concurrent");
    }

    #[test]
    fn plan_validation() {
        assert_eq!(
            RunPlan {
                users: 0,
                ..RunPlan::default()
            }
            .validate(),
            Err(RunPlanError::InvalidUsers)
        );
        assert_eq!(
            RunPlan {
                iterations: Some(0),
                ..RunPlan::default()
            }
            .validate(),
            Err(RunPlanError::InvalidIterations)
        );
        assert!(RunPlan::default().validate().is_ok());
    }

    #[tokio::test]
    async fn panics_are_recorded_as_uncaught() {
        let (factory, _) = testing::factory(0.0);
        let scenario = scenario_fn(|_s| async move {
            if true {
                panic!("scenario bug");
            }
            Ok(())
        });

        let ok = run_iteration(
            &scenario,
            Arc::new(factory.create(1, &CancellationToken::new())),
            factory.profiler(),
        )
        .await;

        assert!(!ok);
        let exceptions = factory.profiler().exceptions();
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].class(), "Panic");
        assert_eq!(exceptions[0].message(), "scenario bug");
    }

    #[tokio::test]
    async fn transport_failures_are_recorded_once() {
        let transport = Arc::new(StubTransport::failing());
        let config = ExecutorConfig::builder("http://localhost").build().unwrap();
        let factory = SessionFactory::with_transport(
            Arc::new(config),
            Arc::new(HttpProfiler::new()),
            transport,
        );
        let scenario = scenario_fn(|s| async move {
            s.get("/").await?;
            Ok(())
        });

        let ok = run_iteration(
            &scenario,
            Arc::new(factory.create(1, &CancellationToken::new())),
            factory.profiler(),
        )
        .await;

        assert!(!ok);
        assert_eq!(factory.profiler().result_count(), 1);
        assert!(factory.profiler().exceptions().is_empty());
    }

    #[tokio::test]
    async fn unprofiled_request_errors_reach_the_exception_sink() {
        let (factory, _) = testing::factory(0.0);
        let scenario = scenario_fn(|_s| async move {
            Err(RequestError::new(
                HttpRequest::get("http://localhost/a"),
                heavyrain_http::Error::InvalidUrl("x".to_string()),
            )
            .into())
        });

        let ok = run_iteration(
            &scenario,
            Arc::new(factory.create(1, &CancellationToken::new())),
            factory.profiler(),
        )
        .await;

        assert!(!ok);
        assert_eq!(factory.profiler().exceptions().len(), 1);
    }

    #[tokio::test]
    async fn build_executor_picks_strategy() {
        let (factory, transport) = testing::factory(0.0);
        let scenario = scenario_fn(|s| async move {
            s.get("/").await?;
            Ok(())
        });
        let plan = RunPlan {
            kind: ExecutorKind::Concurrent,
            users: 2,
            iterations: Some(6),
            ..RunPlan::default()
        };

        let executor = build_executor(&plan, scenario, factory).unwrap();
        let summary = executor.execute(&CancellationToken::new()).await;

        assert_eq!(summary.iterations, 6);
        assert_eq!(transport.calls(), 6);
    }
}
