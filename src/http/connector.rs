//! Connector that opens HTTP connections through a [`Dialer`]

use crate::error::{BmctlError, Result};
use crate::transport::Dialer;
use http::Uri;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::TcpStream;
use tower::Service;

/// `tower::Service<Uri>` that dials the request's authority
///
/// TLS is layered on top by the HTTPS connector wrapping this one.
#[derive(Debug, Clone)]
pub struct DialerConnector {
    dialer: Arc<dyn Dialer>,
}

impl DialerConnector {
    /// Create a connector over `dialer`
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        DialerConnector { dialer }
    }

    /// The dialer connections are opened with
    pub fn dialer(&self) -> &Arc<dyn Dialer> {
        &self.dialer
    }
}

impl Service<Uri> for DialerConnector {
    type Response = TokioIo<TcpStream>;
    type Error = BmctlError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let dialer = self.dialer.clone();
        Box::pin(async move {
            let addr = authority_addr(&uri)?;
            let stream = dialer.dial(&addr).await?;
            Ok(TokioIo::new(stream))
        })
    }
}

/// `host:port` for `uri`, with the scheme's default port filled in
fn authority_addr(uri: &Uri) -> Result<String> {
    let host = uri
        .host()
        .ok_or_else(|| BmctlError::InvalidAddress(format!("no host in URI {}", uri)))?;

    let port = match (uri.port_u16(), uri.scheme_str()) {
        (Some(port), _) => port,
        (None, Some("https")) => 443,
        (None, Some("http")) => 80,
        (None, _) => {
            return Err(BmctlError::InvalidAddress(format!(
                "no port in URI {}",
                uri
            )))
        }
    };

    Ok(format!("{}:{}", host, port))
}
