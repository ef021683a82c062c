//! Test utilities and mocks for bmctl
//!
//! This module provides a mock Redfish BMC (plain HTTP or TLS with a
//! self-signed certificate) and a minimal SOCKS5 server.

#![allow(dead_code)]

use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use url::Url;

/// Service root with a session service but no `Links.Sessions`
pub const SERVICE_ROOT_MISSING_SESSIONS: &str = r#"{
    "@odata.id": "/redfish/v1/",
    "Name": "Root Service",
    "RedfishVersion": "1.6.0",
    "AccountService": {"@odata.id": "/redfish/v1/AccountService"},
    "SessionService": {"@odata.id": "/redfish/v1/SessionService"}
}"#;

/// Complete service root
pub const SERVICE_ROOT: &str = r#"{
    "@odata.id": "/redfish/v1/",
    "Name": "Root Service",
    "RedfishVersion": "1.11.0",
    "SessionService": {"@odata.id": "/redfish/v1/SessionService"},
    "Links": {"Sessions": {"@odata.id": "/redfish/v1/SessionService/Sessions"}}
}"#;

pub const SESSIONS_PATH: &str = "/redfish/v1/SessionService/Sessions";
pub const SESSION_PATH: &str = "/redfish/v1/SessionService/Sessions/1";
pub const SESSION_TOKEN: &str = "token-1";
pub const USER: &str = "admin";
pub const PASSWORD: &str = "secret";

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// A local port nothing listens on
pub async fn unused_addr() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr
}

/// Mock Redfish BMC
///
/// Serves the configured service root, accepts `admin`/`secret` session
/// logins and session deletion. Every request is recorded as
/// `"<METHOD> <path>"`.
pub struct MockBmc {
    pub addr: SocketAddr,
    tls: bool,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockBmc {
    /// Start a plain HTTP BMC
    pub async fn start(service_root: &str) -> Self {
        Self::spawn(service_root, None).await
    }

    /// Start an HTTPS BMC with a self-signed certificate for `localhost`
    pub async fn start_tls(service_root: &str) -> Self {
        Self::spawn(service_root, Some(self_signed_acceptor())).await
    }

    async fn spawn(service_root: &str, acceptor: Option<TlsAcceptor>) -> Self {
        let (listener, addr) = create_test_listener().await;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let tls = acceptor.is_some();

        let root = Arc::new(service_root.to_string());
        let log = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let root = root.clone();
                let log = log.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    match acceptor {
                        Some(acceptor) => {
                            // A client rejecting the certificate ends the handshake
                            if let Ok(stream) = acceptor.accept(stream).await {
                                serve(stream, root, log).await;
                            }
                        }
                        None => serve(stream, root, log).await,
                    }
                });
            }
        });

        MockBmc {
            addr,
            tls,
            requests,
        }
    }

    /// Endpoint URL using `localhost` as host name
    pub fn url(&self) -> Url {
        let scheme = if self.tls { "https" } else { "http" };
        Url::parse(&format!("{}://localhost:{}", scheme, self.addr.port())).unwrap()
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve<S>(stream: S, root: Arc<String>, log: Arc<Mutex<Vec<String>>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req| handle(req, root.clone(), log.clone()));
    let _ = hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await;
}

async fn handle(
    req: Request<Incoming>,
    root: Arc<String>,
    log: Arc<Mutex<Vec<String>>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    log.lock().unwrap().push(format!("{} {}", method, path));

    let json = |status: StatusCode, body: String| {
        Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "application/json;charset=utf-8")
            .body(Full::new(Bytes::from(body)))
            .unwrap()
    };
    let empty = |status: StatusCode| {
        Response::builder()
            .status(status)
            .body(Full::new(Bytes::new()))
            .unwrap()
    };

    let resp = match (method.as_str(), path.as_str()) {
        ("GET", "/redfish/v1/") => json(StatusCode::OK, root.to_string()),
        ("POST", SESSIONS_PATH) => {
            let body = req.into_body().collect().await.unwrap().to_bytes();
            let creds: Value = serde_json::from_slice(&body).unwrap_or_default();
            if creds["UserName"] == USER && creds["Password"] == PASSWORD {
                let mut resp = json(
                    StatusCode::CREATED,
                    format!(r#"{{"@odata.id": "{}"}}"#, SESSION_PATH),
                );
                resp.headers_mut()
                    .insert("X-Auth-Token", SESSION_TOKEN.parse().unwrap());
                resp.headers_mut()
                    .insert(LOCATION, SESSION_PATH.parse().unwrap());
                resp
            } else {
                empty(StatusCode::UNAUTHORIZED)
            }
        }
        ("DELETE", SESSION_PATH) => {
            let token = req.headers().get("X-Auth-Token");
            if token.is_some_and(|t| t == SESSION_TOKEN) {
                empty(StatusCode::NO_CONTENT)
            } else {
                empty(StatusCode::UNAUTHORIZED)
            }
        }
        _ => empty(StatusCode::NOT_FOUND),
    };

    Ok(resp)
}

fn self_signed_acceptor() -> TlsAcceptor {
    let key_pair = rcgen::KeyPair::generate().unwrap();
    let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
        .unwrap()
        .self_signed(&key_pair)
        .unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .unwrap();

    TlsAcceptor::from(Arc::new(config))
}

/// Minimal SOCKS5 server without authentication
///
/// Connects to the requested target itself and relays bytes. Every target is
/// recorded as requested, so domain names show up unresolved.
pub struct Socks5Server {
    pub addr: SocketAddr,
    targets: Arc<Mutex<Vec<String>>>,
}

impl Socks5Server {
    pub async fn start() -> Self {
        let (listener, addr) = create_test_listener().await;
        let targets = Arc::new(Mutex::new(Vec::new()));

        let log = targets.clone();
        tokio::spawn(async move {
            while let Ok((conn, _)) = listener.accept().await {
                let log = log.clone();
                tokio::spawn(async move {
                    let _ = relay(conn, log).await;
                });
            }
        });

        Socks5Server { addr, targets }
    }

    /// Targets requested so far
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

async fn relay(mut conn: TcpStream, log: Arc<Mutex<Vec<String>>>) -> std::io::Result<()> {
    let mut greeting = [0u8; 2];
    conn.read_exact(&mut greeting).await?;
    let mut methods = vec![0u8; greeting[1] as usize];
    conn.read_exact(&mut methods).await?;
    conn.write_all(&[0x05, 0x00]).await?;

    let mut header = [0u8; 4];
    conn.read_exact(&mut header).await?;
    let host = match header[3] {
        0x01 => {
            let mut ip = [0u8; 4];
            conn.read_exact(&mut ip).await?;
            std::net::Ipv4Addr::from(ip).to_string()
        }
        0x03 => {
            let mut len = [0u8; 1];
            conn.read_exact(&mut len).await?;
            let mut name = vec![0u8; len[0] as usize];
            conn.read_exact(&mut name).await?;
            String::from_utf8_lossy(&name).into_owned()
        }
        0x04 => {
            let mut ip = [0u8; 16];
            conn.read_exact(&mut ip).await?;
            format!("[{}]", std::net::Ipv6Addr::from(ip))
        }
        _ => return Ok(()),
    };
    let mut port = [0u8; 2];
    conn.read_exact(&mut port).await?;
    let target = format!("{}:{}", host, u16::from_be_bytes(port));
    log.lock().unwrap().push(target.clone());

    let mut upstream = match TcpStream::connect(&target).await {
        Ok(upstream) => upstream,
        Err(_) => {
            // Host unreachable
            conn.write_all(&[0x05, 0x04, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
                .await?;
            return Ok(());
        }
    };
    conn.write_all(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0, 0])
        .await?;

    tokio::io::copy_bidirectional(&mut conn, &mut upstream).await?;
    Ok(())
}
