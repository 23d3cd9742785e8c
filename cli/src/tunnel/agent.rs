//! Client for the local tunnel agent
//!
//! The agent is a long-running local daemon holding WireGuard sessions per
//! organization. It exposes a small HTTP API for establishing tunnels and
//! brokering exec, HTTP and live-log traffic through them.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use platform_api::{AppLogEntry, Organization};
use reqwest::{header, Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info};
use url::Url;
use uuid::Uuid;

use crate::errors::CliError;
use crate::logstream::push::LiveLogSource;
use crate::logstream::{LogEntry, LogOptions};
use crate::tunnel::{Dialer, ExecOutput, TunnelAgent, TunnelRequest, TunnelResponse};

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Serialize)]
struct EstablishRequest<'a> {
    org_slug: &'a str,
}

#[derive(Debug, Deserialize)]
struct EstablishResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExecRequest<'a> {
    addr: &'a str,
    command: &'a str,
}

struct AgentInner {
    client: Client,
    base_url: String,
    access_token: Option<SecretString>,
}

impl AgentInner {
    /// POST to the agent, tagged with a request id the agent echoes in its
    /// own logs
    fn post(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let request_id = Uuid::new_v4();
        debug!("POST {} (agent request {})", url, request_id);
        self.authorize(self.client.post(&url))
            .header(REQUEST_ID_HEADER, request_id.to_string())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            ),
            None => request,
        }
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CliError> {
        let response = request.send().await.map_err(|e| {
            CliError::TunnelError(format!("agent unreachable at {}: {}", self.base_url, e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Agent request failed: {} - {}", status, body);
            return Err(CliError::TunnelError(format!("{}: {}", status, body)));
        }

        Ok(response.json().await?)
    }
}

/// Client for the local tunnel agent
#[derive(Clone)]
pub struct AgentClient {
    inner: Arc<AgentInner>,
}

impl AgentClient {
    /// Create a new agent client
    pub fn new(base_url: &str, access_token: Option<SecretString>) -> Result<Self, CliError> {
        let client = Client::builder()
            .user_agent(format!("deckhand/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(AgentInner {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                access_token,
            }),
        })
    }

    /// Live log source for apps in `org`
    pub fn live_logs(&self, org: &Organization) -> AgentLiveLogs {
        AgentLiveLogs {
            inner: self.inner.clone(),
            org_slug: org.slug.clone(),
        }
    }
}

#[async_trait]
impl TunnelAgent for AgentClient {
    async fn establish(&self, org: &Organization) -> Result<Box<dyn Dialer>, CliError> {
        info!("Establishing tunnel for organization {}", org.slug);

        let request = self.inner.post("/v1/tunnels").json(&EstablishRequest {
            org_slug: &org.slug,
        });
        let response: EstablishResponse = self.inner.call(request).await?;

        if !response.ok {
            return Err(CliError::TunnelError(format!(
                "can't build tunnel for {}: {}",
                org.slug,
                response.error.unwrap_or_else(|| "unknown error".to_string())
            )));
        }

        Ok(Box::new(AgentDialer {
            inner: self.inner.clone(),
            org_slug: org.slug.clone(),
        }))
    }
}

/// Dialer brokered by the local agent
pub struct AgentDialer {
    inner: Arc<AgentInner>,
    org_slug: String,
}

#[async_trait]
impl Dialer for AgentDialer {
    fn organization(&self) -> &str {
        &self.org_slug
    }

    async fn exec(&self, addr: &str, command: &str) -> Result<ExecOutput, CliError> {
        let request = self
            .inner
            .post(&format!("/v1/tunnels/{}/exec", self.org_slug))
            .json(&ExecRequest { addr, command });
        self.inner.call(request).await
    }

    async fn round_trip(&self, request: TunnelRequest) -> Result<TunnelResponse, CliError> {
        let builder = self
            .inner
            .post(&format!("/v1/tunnels/{}/http", self.org_slug))
            .json(&request);
        self.inner.call(builder).await
    }

    async fn close(&self) -> Result<(), CliError> {
        let url = format!("{}/v1/tunnels/{}", self.inner.base_url, self.org_slug);
        debug!("DELETE {} (agent)", url);
        let response = self
            .inner
            .authorize(self.inner.client.delete(&url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CliError::TunnelError(format!(
                "failed to close tunnel for {}: {}",
                self.org_slug,
                response.status()
            )));
        }
        Ok(())
    }
}

/// Live log subscription through the agent
pub struct AgentLiveLogs {
    inner: Arc<AgentInner>,
    org_slug: String,
}

impl AgentLiveLogs {
    fn subscription_url(&self, opts: &LogOptions) -> Result<Url, CliError> {
        let mut url = Url::parse(&self.inner.base_url)?;

        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            _ => return Err(CliError::ConfigError("Invalid agent URL scheme".to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|_| CliError::ConfigError("Failed to set scheme".to_string()))?;

        url.set_path(&format!(
            "{}/v1/tunnels/{}/logs",
            url.path().trim_end_matches('/'),
            self.org_slug
        ));

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("app", &opts.app_name);
            if let Some(region) = &opts.region {
                query.append_pair("region", region);
            }
            if let Some(instance) = &opts.instance {
                query.append_pair("instance", instance);
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl LiveLogSource for AgentLiveLogs {
    async fn subscribe(
        &self,
        opts: &LogOptions,
    ) -> Result<BoxStream<'static, Result<LogEntry, CliError>>, CliError> {
        let url = self.subscription_url(opts)?;
        debug!("Subscribing to live logs: {}", url);

        let (ws_stream, _) = connect_async(url.as_str()).await?;

        let stream = ws_stream
            .take_while(|msg| futures::future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<AppLogEntry>(&text) {
                        Ok(entry) => Some(Ok(LogEntry::from(entry))),
                        Err(e) => {
                            debug!("Skipping malformed live log message: {}", e);
                            None
                        }
                    },
                    Ok(_) => None,
                    Err(e) => Some(Err(CliError::from(e))),
                }
            });

        Ok(stream.boxed())
    }
}
