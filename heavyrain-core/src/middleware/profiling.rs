use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use heavyrain_http::{HttpRequest, HttpResponse, Result};

use super::{Middleware, Next};
use crate::profiler::HttpProfiler;

/// Records every exchange that passes through it.
///
/// Latency comes from the transport's own timing, so sleeps in inner layers never inflate
/// the numbers. Errors are recorded and then returned unchanged.
#[derive(Debug, Clone)]
pub struct ProfilingMiddleware {
    profiler: Arc<HttpProfiler>,
}

impl ProfilingMiddleware {
    pub fn new(profiler: Arc<HttpProfiler>) -> Self {
        Self { profiler }
    }
}

#[async_trait]
impl Middleware for ProfilingMiddleware {
    async fn handle(&self, request: HttpRequest, next: Next<'_>) -> Result<HttpResponse> {
        let started = Instant::now();
        match next.run(request.clone()).await {
            Ok(response) => {
                self.profiler.record(&request, &response);
                Ok(response)
            }
            Err(err) => {
                self.profiler
                    .record_failure(&request, &err, started.elapsed());
                Err(err)
            }
        }
    }
}
