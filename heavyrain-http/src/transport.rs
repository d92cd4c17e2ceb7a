use async_trait::async_trait;

use crate::{HttpClient, HttpRequest, HttpResponse, Result};

/// Something that can carry one request to a server and bring the response back.
///
/// The engine only talks to this trait, so tests and alternative clients can stand in
/// for [`HttpClient`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.request(request).await
    }
}
