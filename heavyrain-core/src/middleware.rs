use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use heavyrain_http::{HttpRequest, HttpResponse, Result, Transport};

mod default_headers;
mod profiling;
mod request_id;
mod wait;

pub use default_headers::DefaultHeaders;
pub use profiling::ProfilingMiddleware;
pub use request_id::{REQUEST_ID_HEADER, RequestId};
pub use wait::WaitAfterResponse;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A wrapper around one request/response exchange.
///
/// Implementations forward with `next.run(request)`; anything before that call runs on the
/// way in, anything after it on the way out. Not calling `next` short-circuits the chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: HttpRequest, next: Next<'_>) -> Result<HttpResponse>;
}

/// The rest of the chain after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub fn run(self, request: HttpRequest) -> BoxFuture<'a, Result<HttpResponse>> {
        match self.middlewares.split_first() {
            Some((current, rest)) => current.handle(
                request,
                Next {
                    middlewares: rest,
                    terminal: self.terminal,
                },
            ),
            None => self.terminal.send(request),
        }
    }
}

/// Ordered middlewares around a terminal transport. The first middleware added is the
/// outermost one.
#[derive(Clone)]
pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
    terminal: Arc<dyn Transport>,
}

impl Pipeline {
    pub fn new(terminal: Arc<dyn Transport>) -> Self {
        Self {
            middlewares: Vec::new(),
            terminal,
        }
    }

    #[must_use]
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub async fn handle(&self, request: HttpRequest) -> Result<HttpResponse> {
        Next {
            middlewares: &self.middlewares,
            terminal: self.terminal.as_ref(),
        }
        .run(request)
        .await
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("middlewares", &self.middlewares.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for Pipeline {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.handle(request).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;

    use heavyrain_http::{Error, HttpRequest, HttpResponse, Result, Timing, Transport};

    /// Canned transport: answers every request with `status` and remembers what it saw.
    #[derive(Debug, Default)]
    pub(crate) struct StubTransport {
        pub status: u16,
        pub content_type: &'static str,
        pub body: &'static str,
        pub latency: Duration,
        pub fail: bool,
        pub seen: Mutex<Vec<HttpRequest>>,
        pub calls: AtomicUsize,
    }

    impl StubTransport {
        pub(crate) fn ok() -> Self {
            Self {
                status: 200,
                content_type: "application/json",
                body: r#"{"hello":"world."}"#,
                ..Self::default()
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(request.clone());
            if self.fail {
                return Err(Error::Timeout(Duration::from_millis(1)));
            }
            Ok(HttpResponse {
                status: self.status,
                version: http::Version::HTTP_11,
                body: Bytes::from_static(self.body.as_bytes()),
                headers: vec![("content-type".to_string(), self.content_type.to_string())],
                timing: Timing::new(SystemTime::now(), self.latency, self.latency),
            })
        }
    }
}
