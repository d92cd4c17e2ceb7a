use std::time::Duration;

use async_trait::async_trait;

use heavyrain_http::{HttpRequest, HttpResponse, Result};

use super::{Middleware, Next};
use crate::cancel::CancellationToken;

/// Throttles a virtual user by sleeping after each successful response. Cancelling the
/// token ends the sleep early.
#[derive(Debug, Clone)]
pub struct WaitAfterResponse {
    wait: Duration,
    token: CancellationToken,
}

impl WaitAfterResponse {
    pub fn new(wait: Duration, token: CancellationToken) -> Self {
        Self { wait, token }
    }
}

#[async_trait]
impl Middleware for WaitAfterResponse {
    async fn handle(&self, request: HttpRequest, next: Next<'_>) -> Result<HttpResponse> {
        let response = next.run(request).await?;
        self.token.sleep(self.wait).await;
        Ok(response)
    }
}
