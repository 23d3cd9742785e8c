//! Machines API client

use platform_api::{LaunchMachineInput, Machine, MachineState};

use crate::errors::CliError;
use crate::http::client::HttpClient;

impl HttpClient {
    /// List machines for an app, optionally filtered by state
    pub async fn list_machines(
        &self,
        app_name: &str,
        state: Option<MachineState>,
    ) -> Result<Vec<Machine>, CliError> {
        let path = format!("/apps/{}/machines", app_name);
        match state {
            Some(state) => self.get_with_query(&path, &[("state", state.as_str())]).await,
            None => self.get(&path).await,
        }
    }

    /// Get a single machine
    pub async fn get_machine(&self, app_name: &str, machine_id: &str) -> Result<Machine, CliError> {
        self.get(&format!("/apps/{}/machines/{}", app_name, machine_id))
            .await
    }

    /// Launch a machine
    pub async fn launch_machine(
        &self,
        app_name: &str,
        input: &LaunchMachineInput,
    ) -> Result<Machine, CliError> {
        input.config.validate().map_err(CliError::ValidationError)?;
        self.post(&format!("/apps/{}/machines", app_name), input)
            .await
    }

    /// Stop a machine
    pub async fn stop_machine(&self, app_name: &str, machine_id: &str) -> Result<(), CliError> {
        self.post_empty(&format!("/apps/{}/machines/{}/stop", app_name, machine_id))
            .await
    }

    /// Destroy a machine
    pub async fn destroy_machine(&self, app_name: &str, machine_id: &str) -> Result<(), CliError> {
        self.delete(&format!("/apps/{}/machines/{}", app_name, machine_id))
            .await
    }
}
