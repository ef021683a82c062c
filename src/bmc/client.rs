use super::ServiceRoot;
use crate::config::{ClientConfig, TunnelOptions};
use crate::http::{new_http_client, HttpClient, RequestBody, SERVICE_ROOT_PATH};
use crate::logging::{Context, Logger};
use crate::ssh::{new_proxy_dialer_with_options, ProxyCloser};
use crate::transport::Dialer;
use anyhow::{anyhow, bail, Context as _, Result};
use bytes::Bytes;
use http::header::{HeaderValue, ACCEPT, CONTENT_TYPE, LOCATION};
use http::Request;
use http_body_util::Full;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Instrument, Span};
use url::Url;

/// Header carrying the session token
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Upper bound for the logout request when closing
const LOGOUT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct SessionRequest<'a> {
    #[serde(rename = "UserName")]
    user_name: &'a str,
    #[serde(rename = "Password")]
    password: &'a str,
}

/// An authenticated Redfish session
#[derive(Debug, Clone)]
struct Session {
    token: HeaderValue,
    /// Resource to delete on logout
    location: Option<Url>,
}

/// Connection to a single BMC
///
/// Owns the SSH tunnel, if one was needed. Call [`close`](Self::close) to log
/// out and tear the tunnel down.
#[derive(Debug)]
pub struct Client {
    http: HttpClient,
    service_root: ServiceRoot,
    session: Option<Session>,
    proxy: Option<ProxyCloser>,
    logger: Logger,
    span: Span,
}

impl Client {
    /// Connect to the BMC described by `config`
    pub async fn connect(ctx: &Context, config: &ClientConfig) -> Result<Self> {
        Self::connect_with_options(ctx, config, &TunnelOptions::default()).await
    }

    /// [`connect`](Self::connect) with explicit tunnel options
    ///
    /// Starts the SSH tunnel if `config.ssh_proxy` is set, fetches the service
    /// root and logs in when a user is given. If anything fails after the
    /// tunnel came up, the tunnel is closed before the error is returned.
    pub async fn connect_with_options(
        ctx: &Context,
        config: &ClientConfig,
        tunnel: &TunnelOptions,
    ) -> Result<Self> {
        config.validate().map_err(|e| anyhow!(e))?;

        let (dialer, proxy) = match new_proxy_dialer_with_options(ctx, &config.ssh_proxy, tunnel)
            .await
            .context("failed to create SSH proxy dialer")?
        {
            Some((dialer, closer)) => (Some(Arc::new(dialer) as Arc<dyn Dialer>), Some(closer)),
            None => (None, None),
        };

        let (http, service_root, session) = match establish(ctx, config, dialer).await {
            Ok(established) => established,
            Err(err) => {
                if let Some(proxy) = proxy {
                    proxy.close().await;
                }
                return Err(err);
            }
        };

        let logger = ctx.logger().clone();
        let span = logger.in_scope(|| {
            tracing::info_span!(
                "bmc",
                bmc_client = %format!("{}@{}", config.user, config.endpoint)
            )
        });

        let client = Client {
            http,
            service_root,
            session,
            proxy,
            logger,
            span,
        };
        client.log(|| debug!("BMC connected"));

        Ok(client)
    }

    /// The service root fetched while connecting
    pub fn service_root(&self) -> &ServiceRoot {
        &self.service_root
    }

    /// The HTTP client requests are sent with
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Whether traffic goes through an SSH tunnel
    pub fn is_tunneled(&self) -> bool {
        self.proxy.is_some()
    }

    /// Whether a session was established
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Boot the machine from `image` via BMC virtual media
    pub async fn boot(&self, ctx: &Context, image: &str) -> Result<()> {
        if ctx.is_done() {
            bail!("boot from {} not started: context ended", image);
        }

        self.log(|| {
            info!(
                image = %image,
                "Redfish version {}",
                self.service_root.redfish_version
            )
        });

        Ok(())
    }

    /// Log out and stop the tunnel
    ///
    /// Logout failures are logged and otherwise ignored.
    pub async fn close(mut self) {
        if let Some(session) = self.session.take() {
            self.logout(session).await;
        }

        self.log(|| debug!("BMC disconnected"));

        if let Some(proxy) = self.proxy.take() {
            proxy.close().await;
        }
    }

    async fn logout(&self, session: Session) {
        let Some(location) = session.location else {
            self.log(|| debug!("Session has no location, skipping logout"));
            return;
        };

        let req = match Request::delete(location.as_str())
            .header(AUTH_TOKEN_HEADER, session.token)
            .body(RequestBody::new(Bytes::new()))
        {
            Ok(req) => req,
            Err(e) => {
                self.log(|| debug!("Failed to build logout request: {}", e));
                return;
            }
        };

        let request = self
            .logger
            .bind(self.http.request_bytes(req).instrument(self.span.clone()));
        match tokio::time::timeout(LOGOUT_TIMEOUT, request).await {
            Ok(Ok(resp)) if resp.status().is_success() => self.log(|| debug!("Logged out")),
            Ok(Ok(resp)) => self.log(|| debug!("Logout returned {}", resp.status())),
            Ok(Err(e)) => self.log(|| debug!("Logout failed: {}", e)),
            Err(_) => self.log(|| debug!("Logout timed out")),
        }
    }

    fn log<T>(&self, f: impl FnOnce() -> T) -> T {
        self.logger.in_scope(|| self.span.in_scope(f))
    }
}

/// Build the HTTP client, fetch the service root and log in
async fn establish(
    ctx: &Context,
    config: &ClientConfig,
    dialer: Option<Arc<dyn Dialer>>,
) -> Result<(HttpClient, ServiceRoot, Option<Session>)> {
    let logger = ctx.logger();
    let http = logger
        .in_scope(|| new_http_client(config.insecure, dialer))
        .context("failed to create HTTP client")?;

    let handshake = logger.bind(async {
        let service_root = fetch_service_root(&http, &config.endpoint).await?;
        let session = if config.user.is_empty() {
            None
        } else {
            Some(create_session(&http, &config.endpoint, &service_root, config).await?)
        };
        Ok::<_, anyhow::Error>((service_root, session))
    });

    let result = tokio::select! {
        result = handshake => result,
        reason = ctx.done() => Err(anyhow!(reason)),
    };
    let (service_root, session) =
        result.with_context(|| format!("failed to connect to BMC {}", config.endpoint))?;

    Ok((http, service_root, session))
}

async fn fetch_service_root(http: &HttpClient, endpoint: &Url) -> Result<ServiceRoot> {
    let url = endpoint.join(SERVICE_ROOT_PATH)?;
    let req = Request::get(url.as_str())
        .header(ACCEPT, "application/json")
        .body(Full::new(Bytes::new()))?;

    let resp = http.request_bytes(req).await?;
    if !resp.status().is_success() {
        bail!("GET {} returned {}", url, resp.status());
    }

    serde_json::from_slice(resp.body()).context("invalid service root")
}

async fn create_session(
    http: &HttpClient,
    endpoint: &Url,
    service_root: &ServiceRoot,
    config: &ClientConfig,
) -> Result<Session> {
    let path = service_root
        .sessions_path()
        .ok_or_else(|| anyhow!("BMC does not advertise a session collection"))?;
    let url = endpoint.join(path)?;

    let body = serde_json::to_vec(&SessionRequest {
        user_name: &config.user,
        password: &config.password,
    })?;
    let req = Request::post(url.as_str())
        .header(ACCEPT, "application/json")
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))?;

    let resp = http.request_bytes(req).await?;
    if !resp.status().is_success() {
        bail!("session login as {} failed: {}", config.user, resp.status());
    }

    let token = resp
        .headers()
        .get(AUTH_TOKEN_HEADER)
        .cloned()
        .ok_or_else(|| anyhow!("session login response has no {} header", AUTH_TOKEN_HEADER))?;
    let location = resp
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| endpoint.join(value).ok());

    Ok(Session { token, location })
}
