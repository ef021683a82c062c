//! HTTP client for talking to BMCs
//!
//! The client is a hyper connection pool behind a [`ModifierTransport`] that
//! repairs incomplete service roots. Connections are opened through a
//! [`Dialer`], either directly or via an SSH SOCKS5 tunnel. There is no retry
//! logic at this layer.

mod connector;
mod modifier;
mod patch;

pub use connector::DialerConnector;
pub use modifier::{ModifierTransport, RoundTrip};
pub use patch::{patch_missing_sessions_link, SERVICE_ROOT_PATH};

use crate::error::Result;
use crate::transport::{build_tls_config, Dialer, DirectDialer};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client as PoolClient;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;

/// Response body type
pub type Body = BoxBody<Bytes, hyper::Error>;

/// Request body type
pub type RequestBody = Full<Bytes>;

/// Transport performing the actual network exchange
#[derive(Debug, Clone)]
pub struct HyperTransport {
    client: PoolClient<HttpsConnector<DialerConnector>, RequestBody>,
    insecure: bool,
}

impl HyperTransport {
    /// Build a transport dialing through `dialer`
    ///
    /// Certificate verification is skipped only if `insecure` is set.
    pub fn new(insecure: bool, dialer: Arc<dyn Dialer>) -> Result<Self> {
        let tls = build_tls_config(insecure)?;
        let https = HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .wrap_connector(DialerConnector::new(dialer));

        Ok(HyperTransport {
            client: PoolClient::builder(TokioExecutor::new()).build(https),
            insecure,
        })
    }

    /// Whether server certificates are accepted without verification
    pub fn insecure_skip_verify(&self) -> bool {
        self.insecure
    }
}

#[async_trait]
impl RoundTrip for HyperTransport {
    async fn round_trip(&self, req: Request<RequestBody>) -> Result<Response<Body>> {
        let resp = self.client.request(req).await?;
        Ok(resp.map(BodyExt::boxed))
    }
}

/// HTTP client handed to the BMC client
///
/// Cheap to clone and safe to share between tasks.
#[derive(Debug, Clone)]
pub struct HttpClient {
    transport: ModifierTransport<HyperTransport>,
}

impl HttpClient {
    /// The patching transport
    pub fn transport(&self) -> &ModifierTransport<HyperTransport> {
        &self.transport
    }

    /// Whether server certificates are accepted without verification
    pub fn insecure_skip_verify(&self) -> bool {
        self.transport.inner().insecure_skip_verify()
    }

    /// Send a request
    pub async fn request(&self, req: Request<RequestBody>) -> Result<Response<Body>> {
        self.transport.round_trip(req).await
    }

    /// Send a request and collect the whole response body
    pub async fn request_bytes(&self, req: Request<RequestBody>) -> Result<Response<Bytes>> {
        let (parts, body) = self.request(req).await?.into_parts();
        let body = body.collect().await?.to_bytes();
        Ok(Response::from_parts(parts, body))
    }
}

/// Create the HTTP client used for BMC requests
///
/// With no `dialer`, connections are made directly.
pub fn new_http_client(insecure: bool, dialer: Option<Arc<dyn Dialer>>) -> Result<HttpClient> {
    let dialer = dialer.unwrap_or_else(|| Arc::new(DirectDialer::default()));
    let transport = HyperTransport::new(insecure, dialer)?;

    Ok(HttpClient {
        transport: ModifierTransport::new(transport),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BmctlError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpStream;

    #[derive(Debug, Default)]
    struct CountingDialer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Dialer for CountingDialer {
        async fn dial(&self, addr: &str) -> Result<TcpStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BmctlError::InvalidAddress(addr.to_string()))
        }
    }

    fn get(uri: &str) -> Request<RequestBody> {
        Request::get(uri).body(Full::new(Bytes::new())).unwrap()
    }

    #[tokio::test]
    async fn test_new_http_client_insecure() {
        let client = new_http_client(true, None).unwrap();
        assert!(client.insecure_skip_verify());
    }

    #[tokio::test]
    async fn test_new_http_client_secure_by_default() {
        let client = new_http_client(false, None).unwrap();
        assert!(!client.insecure_skip_verify());
    }

    #[tokio::test]
    async fn test_new_http_client_uses_dialer() {
        let dialer = Arc::new(CountingDialer::default());
        let client = new_http_client(true, Some(dialer.clone() as Arc<dyn Dialer>)).unwrap();

        let err = client
            .request(get("http://bmc.internal:8080/redfish/v1/"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bmc.internal:8080"), "{}", err);
        assert_eq!(dialer.calls.load(Ordering::SeqCst), 1);
    }
}
