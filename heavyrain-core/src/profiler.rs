use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use heavyrain_http::{HttpRequest, HttpResponse};

use crate::error::ScenarioError;

mod result;
mod stats;

pub use result::{
    ExceptionInfo, HttpResult, Outcome, RecordedException, RequestSummary, ResponseSummary,
    TimingSummary,
};
pub use stats::{AggregatedStats, GroupKey, GroupStats};

/// Collects every HTTP exchange and every failed iteration of a run.
///
/// One instance is shared by all virtual users. Appends take a short lock and never block
/// on I/O; the read side is meant for reporting once the executors have returned.
#[derive(Debug, Default)]
pub struct HttpProfiler {
    results: Mutex<Vec<Arc<HttpResult>>>,
    exceptions: Mutex<Vec<RecordedException>>,
}

impl HttpProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, request: &HttpRequest, response: &HttpResponse) -> Arc<HttpResult> {
        self.push(HttpResult::succeeded(request, response))
    }

    /// Records an exchange that never produced a response.
    pub fn record_failure(
        &self,
        request: &HttpRequest,
        err: &heavyrain_http::Error,
        elapsed: Duration,
    ) -> Arc<HttpResult> {
        self.push(HttpResult::failed_to_send(request, err, elapsed))
    }

    pub fn record_exception(&self, err: &ScenarioError) {
        tracing::debug!(error = %err, "scenario iteration failed");
        let recorded = RecordedException::from_error(err);
        self.exceptions.lock().push(recorded);
    }

    fn push(&self, result: HttpResult) -> Arc<HttpResult> {
        let result = Arc::new(result);
        self.results.lock().push(result.clone());
        result
    }

    /// Results grouped by method and path tag, in key order.
    pub fn results(&self) -> BTreeMap<GroupKey, Vec<Arc<HttpResult>>> {
        let mut grouped: BTreeMap<GroupKey, Vec<Arc<HttpResult>>> = BTreeMap::new();
        for result in self.results.lock().iter() {
            grouped
                .entry(result.group_key())
                .or_default()
                .push(result.clone());
        }
        grouped
    }

    /// Results in recording order.
    pub fn all_results(&self) -> Vec<Arc<HttpResult>> {
        self.results.lock().clone()
    }

    pub fn aggregate(&self) -> Vec<GroupStats> {
        self.results()
            .into_iter()
            .map(|(key, results)| {
                let failures = results.iter().filter(|r| !r.outcome.is_success()).count();
                let samples = results.iter().map(|r| r.latency).collect();
                GroupStats {
                    key,
                    stats: AggregatedStats::from_samples(samples),
                    failures: failures as u64,
                }
            })
            .collect()
    }

    pub fn exceptions(&self) -> Vec<RecordedException> {
        self.exceptions.lock().clone()
    }

    pub fn result_count(&self) -> usize {
        self.results.lock().len()
    }

    pub fn exception_count(&self) -> usize {
        self.exceptions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::error::UncaughtError;
    use crate::request::PATH_TAG_HEADER;
    use bytes::Bytes;
    use heavyrain_http::Timing;
    use std::time::SystemTime;

    fn response(total_ms: u64) -> HttpResponse {
        HttpResponse {
            status: 200,
            version: http::Version::HTTP_11,
            body: Bytes::new(),
            headers: Vec::new(),
            timing: Timing::new(
                SystemTime::now(),
                Duration::ZERO,
                Duration::from_millis(total_ms),
            ),
        }
    }

    #[test]
    fn path_tag_groups_parameterized_routes() {
        let profiler = HttpProfiler::new();
        for id in [1, 2] {
            let req = HttpRequest::get(format!("http://localhost/users/{id}"))
                .with_header(PATH_TAG_HEADER, "/users/{id}");
            profiler.record(&req, &response(10));
        }

        let grouped = profiler.results();
        assert_eq!(grouped.len(), 1);
        let (key, results) = grouped.iter().next().unwrap();
        assert_eq!(key.to_string(), "GET-/users/{id}");
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn literal_paths_fragment_without_tag() {
        let profiler = HttpProfiler::new();
        profiler.record(&HttpRequest::get("http://localhost/users/1"), &response(1));
        profiler.record(&HttpRequest::get("http://localhost/users/2"), &response(1));
        assert_eq!(profiler.results().len(), 2);
    }

    #[test]
    fn aggregate_counts_failures_per_group() {
        let profiler = HttpProfiler::new();
        let req = HttpRequest::get("http://localhost/a");
        for ms in [10, 20, 30] {
            profiler.record(&req, &response(ms));
        }
        profiler.record_failure(
            &req,
            &heavyrain_http::Error::Timeout(Duration::from_millis(40)),
            Duration::from_millis(40),
        );

        let groups = profiler.aggregate();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].stats.count, 4);
        assert_eq!(groups[0].stats.median, Duration::from_millis(30));
        assert_eq!(groups[0].stats.mean, Duration::from_millis(25));
        assert_eq!(groups[0].failures, 1);
    }

    #[test]
    fn concurrent_appends_are_not_lost() {
        let profiler = Arc::new(HttpProfiler::new());
        let mut handles = Vec::new();
        for t in 0..8 {
            let profiler = profiler.clone();
            handles.push(std::thread::spawn(move || {
                let req = HttpRequest::get(format!("http://localhost/t{t}"));
                for _ in 0..250 {
                    profiler.record(&req, &response(1));
                    profiler.record_exception(&ScenarioError::Uncaught(UncaughtError::new("x")));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(profiler.result_count(), 2000);
        assert_eq!(profiler.exception_count(), 2000);
        let total: u64 = profiler.aggregate().iter().map(|g| g.stats.count).sum();
        assert_eq!(total, 2000);
    }
}
