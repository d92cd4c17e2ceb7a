use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cancel::CancellationToken;
use crate::session::{ScenarioFn, SessionFactory};

use super::worker::Worker;
use super::{ExecutionSummary, Executor, IterationGate};

/// A single virtual user repeating the scenario until cancelled or out of budget.
#[derive(Clone)]
pub struct SyncExecutor {
    scenario: ScenarioFn,
    factory: SessionFactory,
    iterations: Option<u64>,
    duration: Option<Duration>,
}

impl SyncExecutor {
    pub fn new(
        scenario: ScenarioFn,
        factory: SessionFactory,
        iterations: Option<u64>,
        duration: Option<Duration>,
    ) -> Self {
        Self {
            scenario,
            factory,
            iterations,
            duration,
        }
    }
}

#[async_trait]
impl Executor for SyncExecutor {
    async fn execute(&self, token: &CancellationToken) -> ExecutionSummary {
        tracing::info!(
            iterations = ?self.iterations,
            duration = ?self.duration,
            "running scenario in a loop"
        );
        let gate = Arc::new(IterationGate::new(self.iterations, self.duration));
        gate.start();

        Worker {
            id: 1,
            session: Arc::new(self.factory.create(1, token)),
            scenario: self.scenario.clone(),
            profiler: self.factory.profiler().clone(),
            gate,
            wait_after_scenario: self.factory.config().wait_after_scenario(),
        }
        .run(token)
        .await
    }
}
