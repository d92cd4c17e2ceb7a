use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::collections::BTreeMap;
use std::time::{Duration, Instant, SystemTime};

use super::tls::insecure_client_config;
use super::util::{has_header, host_header_value};
use super::{Error, HttpRequest, HttpResponse, Result, Timing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub connect_timeout: Option<Duration>,
    /// When false, any server certificate is accepted.
    pub verify_tls: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        // The OS-level TCP connect timeout can be tens of seconds, which makes runs against an
        // unreachable host look hung.
        Self {
            connect_timeout: Some(Duration::from_secs(3)),
            verify_tls: true,
        }
    }
}

/// Pooled HTTP/1.1 client over plain TCP or rustls. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HttpClient {
    pub fn new(options: ClientOptions) -> Result<Self> {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(options.connect_timeout);

        let builder = if options.verify_tls {
            HttpsConnectorBuilder::new().with_webpki_roots()
        } else {
            tracing::debug!("tls certificate verification disabled");
            HttpsConnectorBuilder::new().with_tls_config(insecure_client_config()?)
        };
        let https_connector = builder
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Ok(Self { inner })
    }

    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let timeout = req.timeout;
        let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::UnsupportedScheme(req.url));
        }

        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

        let mut builder = Request::builder()
            .method(req.method)
            .version(req.version)
            .uri(uri);

        if !has_header(&req.headers, "host")
            && let Some(host) = host_header_value(&parsed)
        {
            builder = builder.header(http::header::HOST, host);
        }
        if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
            builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
        }

        for (k, v) in req.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(&v)?;
            builder = builder.header(name, value);
        }

        let req: Request<Full<Bytes>> = builder.body(Full::new(req.body))?;

        let started_at = SystemTime::now();
        let started = Instant::now();
        let exchange = async {
            let res = self.inner.request(req).await?;
            let first_byte = started.elapsed();
            let (parts, body) = res.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok::<_, Error>((parts, body, first_byte))
        };

        let (parts, body, first_byte) = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, exchange).await {
                Ok(res) => res?,
                Err(_) => return Err(Error::Timeout(timeout)),
            },
            None => exchange.await?,
        };
        let total = started.elapsed();

        // Lowercase keys; multiple values for one header are joined with ", ".
        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in parts.headers.iter() {
            let key = name.as_str().to_ascii_lowercase();
            let v = String::from_utf8_lossy(value.as_bytes()).to_string();
            merged
                .entry(key)
                .and_modify(|cur| {
                    if !cur.is_empty() {
                        cur.push_str(", ");
                    }
                    cur.push_str(&v);
                })
                .or_insert(v);
        }

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            version: parts.version,
            body,
            headers: merged.into_iter().collect(),
            timing: Timing::new(started_at, first_byte, total),
        })
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }
}
