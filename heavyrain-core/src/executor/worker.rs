use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::profiler::HttpProfiler;
use crate::session::{ScenarioFn, Session};

use super::{ExecutionSummary, IterationGate, run_iteration};

/// One virtual user's loop: check the token, claim an iteration, run it, wait, repeat.
pub(super) struct Worker {
    pub(super) id: u64,
    pub(super) session: Arc<dyn Session>,
    pub(super) scenario: ScenarioFn,
    pub(super) profiler: Arc<HttpProfiler>,
    pub(super) gate: Arc<IterationGate>,
    pub(super) wait_after_scenario: Duration,
}

impl Worker {
    pub(super) async fn run(self, token: &CancellationToken) -> ExecutionSummary {
        tracing::debug!(vu = self.id, "virtual user started");
        let mut summary = ExecutionSummary::default();

        loop {
            if token.is_cancelled() || !self.gate.next() {
                break;
            }

            let ok = run_iteration(&self.scenario, self.session.clone(), &self.profiler).await;
            summary.iterations += 1;
            if !ok {
                summary.failed_iterations += 1;
            }

            let wait = match self.gate.remaining() {
                Some(left) => self.wait_after_scenario.min(left),
                None => self.wait_after_scenario,
            };
            token.sleep(wait).await;
        }

        tracing::debug!(
            vu = self.id,
            iterations = summary.iterations,
            failed = summary.failed_iterations,
            "virtual user stopped"
        );
        summary
    }
}
