//! Explicitly constructed command context
//!
//! Holds the collaborators every command needs. Built once in `main` and
//! passed down; nothing here is global.

use std::sync::Arc;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use crate::app::options::CliOptions;
use crate::errors::CliError;
use crate::http::api::ControlPlane;
use crate::http::client::HttpClient;
use crate::recipes::operation::Progress;
use crate::recipes::session::{RecipeSession, SessionOptions};
use crate::storage::settings::Settings;
use crate::tunnel::agent::AgentClient;

pub struct CliContext {
    pub settings: Settings,
    pub options: CliOptions,
    client: Arc<dyn ControlPlane>,
    agent: AgentClient,
    cancel: CancellationToken,
}

impl CliContext {
    pub fn new(
        settings: Settings,
        options: CliOptions,
        cancel: CancellationToken,
    ) -> Result<Self, CliError> {
        let token = settings.api.access_token.clone();
        let client = HttpClient::new(&options.api_url, token.clone())?;
        let agent = AgentClient::new(&options.agent_url, token)?;

        Ok(Self {
            settings,
            options,
            client: Arc::new(client),
            agent,
            cancel,
        })
    }

    /// Context over an arbitrary control plane
    pub fn with_client(
        settings: Settings,
        options: CliOptions,
        client: Arc<dyn ControlPlane>,
        cancel: CancellationToken,
    ) -> Result<Self, CliError> {
        let agent = AgentClient::new(&options.agent_url, settings.api.access_token.clone())?;
        Ok(Self {
            settings,
            options,
            client,
            agent,
            cancel,
        })
    }

    pub fn client(&self) -> Arc<dyn ControlPlane> {
        self.client.clone()
    }

    pub fn agent(&self) -> &AgentClient {
        &self.agent
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn access_token(&self) -> Result<SecretString, CliError> {
        self.settings.api.access_token.clone().ok_or_else(|| {
            CliError::NotAuthenticated(
                "no access token; set DECKHAND_ACCESS_TOKEN or api.access_token".to_string(),
            )
        })
    }

    /// Organization slug from the argument or the configured default
    pub fn org_slug(&self, explicit: Option<&str>) -> Result<String, CliError> {
        explicit
            .map(str::to_string)
            .or_else(|| self.settings.api.default_org.clone())
            .ok_or_else(|| {
                CliError::ConfigError("no organization given and no default_org set".to_string())
            })
    }

    /// Open a recipe session for `app_name`
    pub async fn open_session(
        &self,
        app_name: &str,
        progress: Arc<dyn Progress>,
    ) -> Result<RecipeSession, CliError> {
        let auth_token = self.access_token()?;
        let app = self.client.get_app(app_name).await?;

        RecipeSession::open(
            app,
            self.client.clone(),
            &self.agent,
            SessionOptions {
                tunnel_timeout: self.options.tunnel_timeout,
                auth_token,
            },
            progress,
            self.cancel.child_token(),
        )
        .await
    }
}
