use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cancel::CancellationToken;
use crate::error::{ScenarioError, UncaughtError};
use crate::session::{ScenarioFn, SessionFactory};

use super::worker::Worker;
use super::{ExecutionSummary, Executor, IterationGate};

/// `users` independent virtual users, each with its own client, sharing one profiler.
#[derive(Clone)]
pub struct ConcurrentExecutor {
    scenario: ScenarioFn,
    factory: SessionFactory,
    users: u64,
    iterations: Option<u64>,
    duration: Option<Duration>,
    ramp_up: Option<Duration>,
}

impl ConcurrentExecutor {
    pub fn new(scenario: ScenarioFn, factory: SessionFactory, users: u64) -> Self {
        Self {
            scenario,
            factory,
            users: users.max(1),
            iterations: None,
            duration: None,
            ramp_up: None,
        }
    }

    #[must_use]
    pub fn with_limits(mut self, iterations: Option<u64>, duration: Option<Duration>) -> Self {
        self.iterations = iterations;
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn with_ramp_up(mut self, ramp_up: Option<Duration>) -> Self {
        self.ramp_up = ramp_up;
        self
    }

    /// Start offset of worker `index` (0-based): an even spread over the ramp-up window.
    fn start_delay(&self, index: u64) -> Duration {
        match self.ramp_up {
            Some(ramp_up) if self.users > 1 => {
                let nanos = ramp_up.as_nanos() * u128::from(index) / u128::from(self.users);
                Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
            }
            _ => Duration::ZERO,
        }
    }
}

#[async_trait]
impl Executor for ConcurrentExecutor {
    async fn execute(&self, token: &CancellationToken) -> ExecutionSummary {
        tracing::info!(
            users = self.users,
            iterations = ?self.iterations,
            duration = ?self.duration,
            ramp_up = ?self.ramp_up,
            "starting virtual users"
        );
        let gate = Arc::new(IterationGate::new(self.iterations, self.duration));
        gate.start();

        let mut handles = Vec::with_capacity(usize::try_from(self.users).unwrap_or(0));
        for index in 0..self.users {
            let vu = index + 1;
            let delay = self.start_delay(index);
            let worker = Worker {
                id: vu,
                session: Arc::new(self.factory.create(vu, token)),
                scenario: self.scenario.clone(),
                profiler: self.factory.profiler().clone(),
                gate: gate.clone(),
                wait_after_scenario: self.factory.config().wait_after_scenario(),
            };
            let token = token.clone();
            handles.push((
                vu,
                tokio::spawn(async move {
                    token.sleep(delay).await;
                    worker.run(&token).await
                }),
            ));
        }

        let mut summary = ExecutionSummary::default();
        for (vu, handle) in handles {
            match handle.await {
                Ok(worker_summary) => summary = summary.merge(worker_summary),
                Err(err) => {
                    tracing::error!(vu, error = %err, "virtual user task failed");
                    self.factory
                        .profiler()
                        .record_exception(&ScenarioError::Uncaught(UncaughtError::new(
                            format!("virtual user {vu} stopped: {err}"),
                        )));
                }
            }
        }

        tracing::info!(
            iterations = summary.iterations,
            failed = summary.failed_iterations,
            "virtual users finished"
        );
        summary
    }
}
