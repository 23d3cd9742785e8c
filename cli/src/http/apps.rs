//! Apps API client

use std::collections::BTreeMap;

use platform_api::{App, CreateAppInput, Organization, Release, SetSecretsInput};

use crate::errors::CliError;
use crate::http::client::HttpClient;

impl HttpClient {
    /// Get an app by name
    pub async fn get_app(&self, app_name: &str) -> Result<App, CliError> {
        self.get(&format!("/apps/{}", app_name)).await
    }

    /// Get an organization by slug
    pub async fn get_organization(&self, slug: &str) -> Result<Organization, CliError> {
        self.get(&format!("/orgs/{}", slug)).await
    }

    /// Create an app
    pub async fn create_app(&self, input: &CreateAppInput) -> Result<App, CliError> {
        self.post("/apps", input).await
    }

    /// Set app secrets, producing a new release
    pub async fn set_secrets(
        &self,
        app_name: &str,
        secrets: &BTreeMap<String, String>,
    ) -> Result<Release, CliError> {
        let body = SetSecretsInput {
            secrets: secrets.clone(),
        };
        self.post(&format!("/apps/{}/secrets", app_name), &body).await
    }
}
