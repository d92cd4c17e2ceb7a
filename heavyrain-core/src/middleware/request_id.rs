use async_trait::async_trait;

use heavyrain_http::{HttpRequest, HttpResponse, Result};

use super::{Middleware, Next};

pub const REQUEST_ID_HEADER: &str = "Heavyrain-Request-Id";

/// Stamps each request with `<client id>-<uuid>` so it can be found in server logs.
#[derive(Debug, Clone)]
pub struct RequestId {
    client_id: String,
}

impl RequestId {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }
}

#[async_trait]
impl Middleware for RequestId {
    async fn handle(&self, request: HttpRequest, next: Next<'_>) -> Result<HttpResponse> {
        let id = format!("{}-{}", self.client_id, uuid::Uuid::new_v4().simple());
        next.run(request.with_header(REQUEST_ID_HEADER, id)).await
    }
}
