use std::sync::Arc;

use async_trait::async_trait;

use crate::cancel::CancellationToken;
use crate::session::{ScenarioFn, SessionFactory};

use super::{ExecutionSummary, Executor, run_iteration};

/// Runs the scenario exactly once, whatever the token says.
#[derive(Clone)]
pub struct OnceExecutor {
    scenario: ScenarioFn,
    factory: SessionFactory,
}

impl OnceExecutor {
    pub fn new(scenario: ScenarioFn, factory: SessionFactory) -> Self {
        Self { scenario, factory }
    }
}

#[async_trait]
impl Executor for OnceExecutor {
    async fn execute(&self, token: &CancellationToken) -> ExecutionSummary {
        tracing::info!("running scenario once");
        let session = Arc::new(self.factory.create(1, token));
        let ok = run_iteration(&self.scenario, session, self.factory.profiler()).await;
        ExecutionSummary {
            iterations: 1,
            failed_iterations: u64::from(!ok),
        }
    }
}
