//! Logs API client

use platform_api::AppLogsPage;

use crate::errors::CliError;
use crate::http::api::LogQuery;
use crate::http::client::HttpClient;

impl HttpClient {
    /// Fetch one page of app logs
    pub async fn get_app_logs(
        &self,
        app_name: &str,
        query: &LogQuery,
    ) -> Result<AppLogsPage, CliError> {
        self.get_with_query(&format!("/apps/{}/logs", app_name), query)
            .await
    }
}
