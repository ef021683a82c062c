//! Response-modifying transport

use super::patch::{patch_missing_sessions_link, SERVICE_ROOT_PATH};
use super::{Body, RequestBody};
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{Method, Request, Response};
use http_body_util::{BodyExt, Full};
use std::borrow::Cow;
use tracing::debug;

/// Sends one HTTP request and returns its response
#[async_trait]
pub trait RoundTrip: Send + Sync {
    /// Perform the exchange
    async fn round_trip(&self, req: Request<RequestBody>) -> Result<Response<Body>>;
}

/// Transport that fixes up the service root returned by the wrapped transport
///
/// Only successful `GET` requests for exactly [`SERVICE_ROOT_PATH`] are
/// inspected. If the body cannot be patched the response is passed on as
/// received; patching never fails a request.
#[derive(Debug, Clone)]
pub struct ModifierTransport<T> {
    inner: T,
}

impl<T: RoundTrip> ModifierTransport<T> {
    /// Wrap `inner`
    pub fn new(inner: T) -> Self {
        ModifierTransport { inner }
    }

    /// The wrapped transport
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: RoundTrip> RoundTrip for ModifierTransport<T> {
    async fn round_trip(&self, req: Request<RequestBody>) -> Result<Response<Body>> {
        let inspect = req.method() == Method::GET && req.uri().path() == SERVICE_ROOT_PATH;

        let resp = self.inner.round_trip(req).await?;
        if !inspect || !resp.status().is_success() {
            return Ok(resp);
        }

        let (mut parts, body) = resp.into_parts();
        let original = body.collect().await?.to_bytes();

        let patched = match patch_missing_sessions_link(&original) {
            Ok(Cow::Owned(patched)) => Some(Bytes::from(patched)),
            Ok(Cow::Borrowed(_)) => None,
            Err(e) => {
                debug!("Not patching service root: {}", e);
                None
            }
        };
        let body = match patched {
            Some(patched) => {
                debug!("Added missing Links.Sessions to service root");
                parts.headers.remove(TRANSFER_ENCODING);
                parts
                    .headers
                    .insert(CONTENT_LENGTH, HeaderValue::from(patched.len()));
                patched
            }
            None => original,
        };

        Ok(Response::from_parts(parts, full(body)))
    }
}

/// Box a complete in-memory body
fn full(bytes: Bytes) -> Body {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use serde_json::Value;
    use std::sync::Mutex;

    const MISSING_SESSIONS: &str =
        r#"{"SessionService": {"@odata.id": "/redfish/v1/SessionService"}}"#;

    /// Replies with a fixed response and counts calls
    #[derive(Debug)]
    struct Canned {
        status: StatusCode,
        body: &'static str,
        calls: Mutex<Vec<String>>,
    }

    impl Canned {
        fn new(status: StatusCode, body: &'static str) -> Self {
            Canned {
                status,
                body,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RoundTrip for Canned {
        async fn round_trip(&self, req: Request<RequestBody>) -> Result<Response<Body>> {
            self.calls.lock().unwrap().push(req.uri().to_string());
            Ok(Response::builder()
                .status(self.status)
                .header(CONTENT_LENGTH, self.body.len())
                .body(full(Bytes::from_static(self.body.as_bytes())))
                .unwrap())
        }
    }

    fn request(method: Method, uri: &str) -> Request<RequestBody> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn send(
        transport: &ModifierTransport<Canned>,
        method: Method,
        uri: &str,
    ) -> (Response<()>, Bytes) {
        let resp = transport.round_trip(request(method, uri)).await.unwrap();
        let (parts, body) = resp.into_parts();
        let body = body.collect().await.unwrap().to_bytes();
        (Response::from_parts(parts, ()), body)
    }

    #[tokio::test]
    async fn test_patches_service_root() {
        let transport = ModifierTransport::new(Canned::new(StatusCode::OK, MISSING_SESSIONS));
        let (resp, body) = send(&transport, Method::GET, "https://bmc/redfish/v1/").await;

        let root: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            root["Links"]["Sessions"]["@odata.id"],
            "/redfish/v1/SessionService/Sessions"
        );
        assert_eq!(
            resp.headers()[CONTENT_LENGTH],
            body.len().to_string().as_str()
        );
        assert_eq!(transport.inner().calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_paths_untouched() {
        let transport = ModifierTransport::new(Canned::new(StatusCode::OK, MISSING_SESSIONS));

        for uri in ["https://bmc/redfish/v1", "https://bmc/redfish/v1/Systems"] {
            let (_, body) = send(&transport, Method::GET, uri).await;
            assert_eq!(body.as_ref(), MISSING_SESSIONS.as_bytes(), "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_query_does_not_affect_match() {
        let transport = ModifierTransport::new(Canned::new(StatusCode::OK, MISSING_SESSIONS));
        let (_, body) = send(&transport, Method::GET, "https://bmc/redfish/v1/?only").await;

        let root: Value = serde_json::from_slice(&body).unwrap();
        assert!(root["Links"]["Sessions"].is_object());
    }

    #[tokio::test]
    async fn test_non_get_untouched() {
        let transport = ModifierTransport::new(Canned::new(StatusCode::OK, MISSING_SESSIONS));
        let (_, body) = send(&transport, Method::POST, "https://bmc/redfish/v1/").await;
        assert_eq!(body.as_ref(), MISSING_SESSIONS.as_bytes());
    }

    #[tokio::test]
    async fn test_error_status_untouched() {
        let transport = ModifierTransport::new(Canned::new(
            StatusCode::SERVICE_UNAVAILABLE,
            MISSING_SESSIONS,
        ));
        let (resp, body) = send(&transport, Method::GET, "https://bmc/redfish/v1/").await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.as_ref(), MISSING_SESSIONS.as_bytes());
    }

    #[tokio::test]
    async fn test_invalid_json_passed_through() {
        let transport = ModifierTransport::new(Canned::new(StatusCode::OK, "{invalid json}"));
        let (resp, body) = send(&transport, Method::GET, "https://bmc/redfish/v1/").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body.as_ref(), b"{invalid json}");
        assert_eq!(resp.headers()[CONTENT_LENGTH], "14");
    }
}
