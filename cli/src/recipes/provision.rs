//! Postgres cluster provisioning

use std::collections::BTreeMap;
use std::sync::Arc;

use platform_api::{
    App, CreateAppInput, LaunchMachineInput, Machine, MachineConfig, MachineMount, MachineState,
    Organization, RestartPolicyKind,
};
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::CliError;
use crate::http::api::ControlPlane;
use crate::recipes::machines::{wait_for_machine_state, WaitOptions};
use crate::recipes::operation::Progress;
use crate::utils::generate_secure_token;

pub const DEFAULT_POSTGRES_IMAGE: &str = "flyio/postgres:14";
pub const POSTGRES_MACHINE_SIZE: &str = "shared-cpu-1x";
pub const POSTGRES_DATA_PATH: &str = "/data";
const APP_RUNTIME: &str = "FIRECRACKER";
const PASSWORD_LENGTH: usize = 15;
const VOLUME_SUFFIX_LENGTH: usize = 5;

#[derive(Debug, Clone)]
pub struct PostgresProvisionConfig {
    pub app_name: String,
    pub organization: Organization,
    pub region: String,
    pub count: u32,
    pub image_ref: String,
    pub volume_size_gb: u32,
    pub password: Option<SecretString>,
    pub consul_url: Option<String>,
    pub etcd_url: Option<String>,
}

impl PostgresProvisionConfig {
    pub fn new(app_name: impl Into<String>, organization: Organization, region: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            organization,
            region: region.into(),
            count: 2,
            image_ref: DEFAULT_POSTGRES_IMAGE.to_string(),
            volume_size_gb: 10,
            password: None,
            consul_url: None,
            etcd_url: None,
        }
    }

    pub fn validate(&self) -> Result<(), CliError> {
        if self.app_name.trim().is_empty() {
            return Err(CliError::ValidationError("app name is required".to_string()));
        }
        if self.region.trim().is_empty() {
            return Err(CliError::ValidationError("region is required".to_string()));
        }
        if self.count == 0 {
            return Err(CliError::ValidationError("count must be at least 1".to_string()));
        }
        if self.volume_size_gb == 0 {
            return Err(CliError::ValidationError("volume size must be at least 1 GB".to_string()));
        }
        if self.consul_url.is_some() && self.etcd_url.is_some() {
            return Err(CliError::ValidationError(
                "consul url and etcd url are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ProvisionOutcome {
    pub app: App,
    pub machines: Vec<Machine>,
    pub connection_string: SecretString,
}

pub struct PostgresProvision {
    config: PostgresProvisionConfig,
    client: Arc<dyn ControlPlane>,
    progress: Arc<dyn Progress>,
    wait: WaitOptions,
}

impl PostgresProvision {
    pub fn new(
        config: PostgresProvisionConfig,
        client: Arc<dyn ControlPlane>,
        progress: Arc<dyn Progress>,
        wait: WaitOptions,
    ) -> Self {
        Self {
            config,
            client,
            progress,
            wait,
        }
    }

    /// Create the app, set its secrets and launch the machines one by one
    pub async fn start(&self, cancel: &CancellationToken) -> Result<ProvisionOutcome, CliError> {
        self.config.validate()?;

        self.progress.note("Creating app...");
        let app = self
            .client
            .create_app(&CreateAppInput {
                organization_id: self.config.organization.id.clone(),
                name: self.config.app_name.clone(),
                preferred_region: Some(self.config.region.clone()),
                runtime: APP_RUNTIME.to_string(),
            })
            .await?;

        self.progress.note("Setting secrets...");
        let secrets = self.secrets();
        self.client.set_secrets(&app.name, &secrets).await?;
        info!("Set {} secret(s) on {}", secrets.len(), app.name);

        let mut machines = Vec::with_capacity(self.config.count as usize);
        for i in 0..self.config.count {
            self.progress.note(&format!(
                "Provisioning {} of {} machines",
                i + 1,
                self.config.count
            ));

            let input = LaunchMachineInput {
                app_id: app.id.clone(),
                region: self.config.region.clone(),
                config: self.machine_config(),
            };
            let launched = self.client.launch_machine(&app.name, &input).await?;

            let started = wait_for_machine_state(
                self.client.as_ref(),
                &app.name,
                &launched.id,
                MachineState::Started,
                &self.wait,
                cancel,
            )
            .await?;
            machines.push(started);
        }

        let password = secrets
            .get("OPERATOR_PASSWORD")
            .cloned()
            .unwrap_or_default();
        let connection_string = SecretString::from(format!(
            "postgres://postgres:{}@{}.internal:5432",
            password, app.name
        ));

        Ok(ProvisionOutcome {
            app,
            machines,
            connection_string,
        })
    }

    fn secrets(&self) -> BTreeMap<String, String> {
        let mut secrets = BTreeMap::new();
        secrets.insert("FLY_APP_NAME".to_string(), self.config.app_name.clone());
        secrets.insert("FLY_REGION".to_string(), self.config.region.clone());
        secrets.insert("SU_PASSWORD".to_string(), generate_secure_token(PASSWORD_LENGTH));
        secrets.insert("REPL_PASSWORD".to_string(), generate_secure_token(PASSWORD_LENGTH));

        let operator_password = match &self.config.password {
            Some(password) => password.expose_secret().to_string(),
            None => generate_secure_token(PASSWORD_LENGTH),
        };
        secrets.insert("OPERATOR_PASSWORD".to_string(), operator_password);

        if let Some(url) = &self.config.consul_url {
            secrets.insert("CONSUL_URL".to_string(), url.clone());
        }
        if let Some(url) = &self.config.etcd_url {
            secrets.insert("ETCD_URL".to_string(), url.clone());
        }
        secrets
    }

    fn machine_config(&self) -> MachineConfig {
        MachineConfig::new(&self.config.image_ref)
            .with_size(POSTGRES_MACHINE_SIZE)
            .with_env("PRIMARY_REGION", &self.config.region)
            .with_restart(RestartPolicyKind::No)
            .with_mount(MachineMount {
                volume: format!("pg_data_{}", generate_secure_token(VOLUME_SUFFIX_LENGTH)),
                path: POSTGRES_DATA_PATH.to_string(),
                size_gb: self.config.volume_size_gb,
                encrypted: false,
            })
    }
}
