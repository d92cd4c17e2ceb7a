use async_trait::async_trait;

use heavyrain_http::{HttpRequest, HttpResponse, Result};

use super::{Middleware, Next};

/// Adds configured headers the request does not already carry.
#[derive(Debug, Clone, Default)]
pub struct DefaultHeaders {
    headers: Vec<(String, String)>,
}

impl DefaultHeaders {
    pub fn new(headers: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            headers: headers.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Middleware for DefaultHeaders {
    async fn handle(&self, mut request: HttpRequest, next: Next<'_>) -> Result<HttpResponse> {
        for (name, value) in &self.headers {
            if request.header(name).is_none() {
                request.headers.push((name.clone(), value.clone()));
            }
        }
        next.run(request).await
    }
}
