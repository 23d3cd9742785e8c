//! Deployment API client

use platform_api::{AllocationStatus, AppDeploymentStatus};

use crate::errors::CliError;
use crate::http::client::HttpClient;

impl HttpClient {
    /// Get the latest deployment and its allocations
    pub async fn get_deployment_status(
        &self,
        app_name: &str,
        include_completed: bool,
    ) -> Result<AppDeploymentStatus, CliError> {
        let path = format!("/apps/{}/deployment", app_name);
        self.get_with_query(&path, &[("include_completed", include_completed)])
            .await
    }

    /// Get one allocation with recent events and logs
    pub async fn get_allocation_status(
        &self,
        app_name: &str,
        allocation_id: &str,
        log_limit: u32,
    ) -> Result<AllocationStatus, CliError> {
        let path = format!("/apps/{}/allocations/{}", app_name, allocation_id);
        self.get_with_query(&path, &[("log_limit", log_limit)]).await
    }
}
