//! Control-plane operations consumed by recipes, log streams and the monitor

use std::collections::BTreeMap;

use async_trait::async_trait;
use platform_api::{
    AllocationStatus, App, AppDeploymentStatus, AppLogsPage, CreateAppInput, LaunchMachineInput,
    Machine, MachineState, Organization, Release,
};
use serde::Serialize;

use crate::errors::CliError;
use crate::http::client::HttpClient;

/// Filters for one page of app logs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

/// Control-plane client trait for testability
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn get_app(&self, app_name: &str) -> Result<App, CliError>;

    async fn get_organization(&self, slug: &str) -> Result<Organization, CliError>;

    async fn create_app(&self, input: &CreateAppInput) -> Result<App, CliError>;

    async fn set_secrets(
        &self,
        app_name: &str,
        secrets: &BTreeMap<String, String>,
    ) -> Result<Release, CliError>;

    async fn list_machines(
        &self,
        app_name: &str,
        state: Option<MachineState>,
    ) -> Result<Vec<Machine>, CliError>;

    async fn get_machine(&self, app_name: &str, machine_id: &str) -> Result<Machine, CliError>;

    async fn launch_machine(
        &self,
        app_name: &str,
        input: &LaunchMachineInput,
    ) -> Result<Machine, CliError>;

    async fn stop_machine(&self, app_name: &str, machine_id: &str) -> Result<(), CliError>;

    async fn destroy_machine(&self, app_name: &str, machine_id: &str) -> Result<(), CliError>;

    async fn get_app_logs(&self, app_name: &str, query: &LogQuery)
        -> Result<AppLogsPage, CliError>;

    async fn get_deployment_status(
        &self,
        app_name: &str,
        include_completed: bool,
    ) -> Result<AppDeploymentStatus, CliError>;

    async fn get_allocation_status(
        &self,
        app_name: &str,
        allocation_id: &str,
        log_limit: u32,
    ) -> Result<AllocationStatus, CliError>;
}

#[async_trait]
impl ControlPlane for HttpClient {
    async fn get_app(&self, app_name: &str) -> Result<App, CliError> {
        HttpClient::get_app(self, app_name).await
    }

    async fn get_organization(&self, slug: &str) -> Result<Organization, CliError> {
        HttpClient::get_organization(self, slug).await
    }

    async fn create_app(&self, input: &CreateAppInput) -> Result<App, CliError> {
        HttpClient::create_app(self, input).await
    }

    async fn set_secrets(
        &self,
        app_name: &str,
        secrets: &BTreeMap<String, String>,
    ) -> Result<Release, CliError> {
        HttpClient::set_secrets(self, app_name, secrets).await
    }

    async fn list_machines(
        &self,
        app_name: &str,
        state: Option<MachineState>,
    ) -> Result<Vec<Machine>, CliError> {
        HttpClient::list_machines(self, app_name, state).await
    }

    async fn get_machine(&self, app_name: &str, machine_id: &str) -> Result<Machine, CliError> {
        HttpClient::get_machine(self, app_name, machine_id).await
    }

    async fn launch_machine(
        &self,
        app_name: &str,
        input: &LaunchMachineInput,
    ) -> Result<Machine, CliError> {
        HttpClient::launch_machine(self, app_name, input).await
    }

    async fn stop_machine(&self, app_name: &str, machine_id: &str) -> Result<(), CliError> {
        HttpClient::stop_machine(self, app_name, machine_id).await
    }

    async fn destroy_machine(&self, app_name: &str, machine_id: &str) -> Result<(), CliError> {
        HttpClient::destroy_machine(self, app_name, machine_id).await
    }

    async fn get_app_logs(
        &self,
        app_name: &str,
        query: &LogQuery,
    ) -> Result<AppLogsPage, CliError> {
        HttpClient::get_app_logs(self, app_name, query).await
    }

    async fn get_deployment_status(
        &self,
        app_name: &str,
        include_completed: bool,
    ) -> Result<AppDeploymentStatus, CliError> {
        HttpClient::get_deployment_status(self, app_name, include_completed).await
    }

    async fn get_allocation_status(
        &self,
        app_name: &str,
        allocation_id: &str,
        log_limit: u32,
    ) -> Result<AllocationStatus, CliError> {
        HttpClient::get_allocation_status(self, app_name, allocation_id, log_limit).await
    }
}
